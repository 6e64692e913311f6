//! Adaptive target recommendation
//!
//! Decides per activity whether tomorrow's difficulty target should move up,
//! move down, or stay, based on a short window of recent history:
//! - adherence: share of days where the chosen label's fraction met or
//!   exceeded the target label's fraction
//! - trailing success / failure streaks counted from the newest day back
//! - user state from the mean of recent composite scores
//! - per-activity cooldowns gating consecutive moves
//!
//! Every call is computed fresh from the supplied history; nothing is retained.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::ScoringError;
use crate::normalizer::LabelNormalizer;
use crate::types::{
    Action, AdaptationHistory, AdaptationPlan, AdaptationPolicy, DailyEntry, Recommendation,
    Rubric, UserState, WindowStats,
};

/// Adherence floor applied to up-moves while thriving
pub const THRIVING_MIN_ADHERENCE: f64 = 0.90;

/// Streak floor applied to up-moves while thriving
pub const THRIVING_MIN_STREAK: usize = 4;

/// Largest number of levels a single recommendation moves
const MAX_STEP: usize = 1;

/// Adaptation engine bound to a rubric and a policy
#[derive(Debug, Clone, Copy)]
pub struct AdaptationEngine<'a> {
    rubric: &'a Rubric,
    policy: &'a AdaptationPolicy,
}

impl<'a> AdaptationEngine<'a> {
    pub fn new(rubric: &'a Rubric, policy: &'a AdaptationPolicy) -> Self {
        Self { rubric, policy }
    }

    /// Ordered levels for an activity, easiest first.
    ///
    /// Uses the policy's explicit order when present, otherwise the rubric
    /// labels sorted by fraction.
    pub fn levels_for(&self, activity: &str) -> Result<Vec<String>, ScoringError> {
        if let Some(order) = self.policy.levels_order.get(activity) {
            if !order.is_empty() {
                return Ok(order.clone());
            }
        }
        Ok(self.rubric.activity(activity)?.labels_by_fraction())
    }

    /// Classify the user from the mean of the last `short_days` scores
    pub fn classify_user_state(&self, recent_daily_scores: Option<&[f64]>) -> UserState {
        let scores = match recent_daily_scores {
            Some(scores) if !scores.is_empty() => scores,
            _ => return UserState::OnTrack,
        };

        let short_days = self.policy.adaptation.windows.short_days.max(1);
        let window = &scores[scores.len().saturating_sub(short_days)..];
        let mean = window.iter().sum::<f64>() / window.len() as f64;

        let state = &self.policy.adaptation.state;
        if mean < state.struggling_lt {
            UserState::Struggling
        } else if mean > state.thriving_gt {
            UserState::Thriving
        } else {
            UserState::OnTrack
        }
    }

    /// Adherence and trailing streaks over the last `short_days` days.
    ///
    /// `chosen` and `targets` are parallel, oldest first. `None` labels
    /// resolve to the activity's easiest level.
    pub fn window_stats(
        &self,
        activity: &str,
        chosen: &[Option<&str>],
        targets: &[Option<&str>],
    ) -> Result<WindowStats, ScoringError> {
        let n = self
            .policy
            .adaptation
            .windows
            .short_days
            .min(chosen.len())
            .min(targets.len());
        if n == 0 {
            return Ok(WindowStats::default());
        }

        let normalizer = LabelNormalizer::new(self.rubric);
        let hits = chosen[chosen.len() - n..]
            .iter()
            .zip(&targets[targets.len() - n..])
            .map(|(chosen, target)| {
                Ok(normalizer.fraction(activity, *chosen)?
                    >= normalizer.fraction(activity, *target)?)
            })
            .collect::<Result<Vec<bool>, ScoringError>>()?;

        let met = hits.iter().filter(|hit| **hit).count();
        let (streak, fail_streak) = match hits.last() {
            Some(&last) => {
                let run = hits.iter().rev().take_while(|hit| **hit == last).count();
                if last {
                    (run, 0)
                } else {
                    (0, run)
                }
            }
            None => (0, 0),
        };

        Ok(WindowStats {
            days: n,
            adherence: met as f64 / n as f64,
            streak,
            fail_streak,
        })
    }

    /// Recommend next targets for every rubric activity
    pub fn recommend_next_targets(
        &self,
        history: &AdaptationHistory,
    ) -> Result<BTreeMap<String, Recommendation>, ScoringError> {
        Ok(self.plan(history)?.recommendations)
    }

    /// Recommend next targets and report the user state used to decide them
    pub fn plan(&self, history: &AdaptationHistory) -> Result<AdaptationPlan, ScoringError> {
        let user_state = self.classify_user_state(history.recent_daily_scores.as_deref());

        // Without a usable target history every day is measured against itself
        let targets: &[DailyEntry] = match &history.targets {
            Some(targets) if targets.len() == history.entries.len() => targets.as_slice(),
            Some(targets) => {
                warn!(
                    entries = history.entries.len(),
                    targets = targets.len(),
                    "target history length mismatch, measuring adherence against chosen labels"
                );
                history.entries.as_slice()
            }
            None => history.entries.as_slice(),
        };

        let mut recommendations = BTreeMap::new();
        for activity in self.rubric.activity_names() {
            let recommendation = self.recommend_activity(activity, history, targets, user_state)?;
            debug!(
                activity,
                state = %user_state,
                action = %recommendation.action,
                next = %recommendation.next_target,
                "recommendation"
            );
            recommendations.insert(activity.to_string(), recommendation);
        }

        Ok(AdaptationPlan {
            user_state,
            recommendations,
        })
    }

    fn recommend_activity(
        &self,
        activity: &str,
        history: &AdaptationHistory,
        targets: &[DailyEntry],
        user_state: UserState,
    ) -> Result<Recommendation, ScoringError> {
        let settings = &self.policy.adaptation;
        let thresholds = &settings.thresholds;
        let cadence = &settings.cadence;

        let levels = self.levels_for(activity)?;
        let easiest = levels.first().cloned().unwrap_or_default();

        let current_target = targets
            .last()
            .and_then(|t| t.get(activity))
            .filter(|label| !label.is_empty())
            .cloned()
            .unwrap_or(easiest);
        let current_idx = self.level_index(activity, &levels, &current_target)?;

        let chosen = labels_for(&history.entries, activity);
        let target_labels = labels_for(targets, activity);
        let stats = self.window_stats(activity, &chosen, &target_labels)?;

        let can_up = cooldown_elapsed(
            history.days_since_up.as_ref(),
            activity,
            cadence.min_days_between_up,
        );
        let can_down = cooldown_elapsed(
            history.days_since_down.as_ref(),
            activity,
            cadence.min_days_between_down,
        );

        let mut action = Action::Keep;
        let mut step = 0;
        let mut reason = format!(
            "adh={:.2}, streak={}, fail_streak={}",
            stats.adherence, stats.streak, stats.fail_streak
        );

        // An empty window carries no evidence in either direction
        let has_window = stats.days > 0;
        let wants_down = stats.adherence < thresholds.down_max_short_adherence
            || stats.fail_streak >= thresholds.down_min_fail_streak;
        if has_window && can_down && wants_down {
            action = Action::Down;
            step = thresholds.down_max_step.min(MAX_STEP);
            // Essentials only change the wording; the easing rule is the same
            let essential = settings
                .essentials_when_struggling
                .iter()
                .any(|name| name == activity);
            if user_state == UserState::Struggling && !essential {
                reason.push_str(" | struggling: easing");
            } else {
                reason.push_str(" | easing low adherence");
            }
        }

        if has_window && action == Action::Keep && can_up {
            if user_state == UserState::Thriving {
                let min_adherence = thresholds.up_min_short_adherence.max(THRIVING_MIN_ADHERENCE);
                let min_streak = thresholds.up_min_streak.max(THRIVING_MIN_STREAK);
                if stats.adherence >= min_adherence && stats.streak >= min_streak {
                    action = Action::Up;
                    step = thresholds.up_max_step.min(MAX_STEP);
                    reason.push_str(" | thriving: gentle push");
                }
            } else if stats.adherence >= thresholds.up_min_short_adherence
                && stats.streak >= thresholds.up_min_streak
            {
                action = Action::Up;
                step = thresholds.up_max_step.min(MAX_STEP);
                reason.push_str(" | consistent: small progress");
            }
        }

        let last_idx = levels.len().saturating_sub(1);
        let next_idx = match action {
            Action::Up => (current_idx + step).min(last_idx),
            Action::Down => current_idx.saturating_sub(step),
            Action::Keep => current_idx,
        };

        Ok(Recommendation {
            current_target,
            next_target: levels.get(next_idx).cloned().unwrap_or_default(),
            action,
            reason,
            window: stats,
        })
    }

    /// Position of a target in the level order.
    ///
    /// A target that is not itself a level is matched by its canonical form,
    /// so an alias such as `"gym"` keeps its place at `intense` instead of
    /// dropping to the first level. Only targets that resolve to no level at
    /// all map to 0.
    fn level_index(
        &self,
        activity: &str,
        levels: &[String],
        target: &str,
    ) -> Result<usize, ScoringError> {
        if let Some(idx) = levels.iter().position(|level| level == target) {
            return Ok(idx);
        }
        let canonical = LabelNormalizer::new(self.rubric).resolve_category(activity, Some(target))?;
        Ok(levels
            .iter()
            .position(|level| *level == canonical)
            .unwrap_or(0))
    }
}

/// Recommend next targets for every rubric activity
pub fn recommend_next_targets(
    rubric: &Rubric,
    policy: &AdaptationPolicy,
    history: &AdaptationHistory,
) -> Result<BTreeMap<String, Recommendation>, ScoringError> {
    AdaptationEngine::new(rubric, policy).recommend_next_targets(history)
}

fn labels_for<'h>(days: &'h [DailyEntry], activity: &str) -> Vec<Option<&'h str>> {
    days.iter()
        .map(|day| day.get(activity).map(String::as_str))
        .collect()
}

/// Absent counters mean the cooldown is satisfied
fn cooldown_elapsed(counters: Option<&BTreeMap<String, u32>>, activity: &str, min_days: u32) -> bool {
    counters
        .and_then(|counters| counters.get(activity))
        .map_or(true, |days| *days >= min_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityRubric, Thresholds};
    use pretty_assertions::assert_eq;

    fn make_rubric() -> Rubric {
        let exercise = ActivityRubric {
            labels: BTreeMap::from([
                ("none".to_string(), 0.0),
                ("light".to_string(), 0.3),
                ("moderate".to_string(), 0.6),
                ("intense".to_string(), 1.0),
            ]),
            aliases: BTreeMap::from([("gym".to_string(), "intense".to_string())]),
            ..Default::default()
        };
        let diet = ActivityRubric {
            labels: BTreeMap::from([
                ("junk".to_string(), 0.0),
                ("moderate".to_string(), 0.5),
                ("clean".to_string(), 1.0),
            ]),
            ..Default::default()
        };
        Rubric {
            activities: BTreeMap::from([
                ("exercise".to_string(), exercise),
                ("diet".to_string(), diet),
            ]),
            ..Default::default()
        }
    }

    fn make_policy() -> AdaptationPolicy {
        let mut policy = AdaptationPolicy::default();
        policy.levels_order.insert(
            "exercise".to_string(),
            vec!["none", "light", "moderate", "intense"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        policy
    }

    fn days(activity: &str, labels: &[&str]) -> Vec<DailyEntry> {
        labels
            .iter()
            .map(|label| DailyEntry::from([(activity.to_string(), label.to_string())]))
            .collect()
    }

    #[test]
    fn test_levels_fallback_sorted_by_fraction() {
        let rubric = make_rubric();
        let policy = make_policy();
        let engine = AdaptationEngine::new(&rubric, &policy);

        assert_eq!(engine.levels_for("diet").unwrap(), vec!["junk", "moderate", "clean"]);
        assert_eq!(
            engine.levels_for("exercise").unwrap(),
            vec!["none", "light", "moderate", "intense"]
        );
        assert!(engine.levels_for("sleep").is_err());
    }

    #[test]
    fn test_consistent_adherence_moves_up() {
        let rubric = make_rubric();
        let policy = make_policy();
        let history = AdaptationHistory {
            entries: days("exercise", &["moderate", "moderate", "intense"]),
            targets: Some(days("exercise", &["moderate", "moderate", "moderate"])),
            ..Default::default()
        };

        let recs = recommend_next_targets(&rubric, &policy, &history).unwrap();
        let exercise = &recs["exercise"];

        assert_eq!(exercise.window.adherence, 1.0);
        assert_eq!(exercise.window.streak, 3);
        assert_eq!(exercise.window.fail_streak, 0);
        assert_eq!(exercise.action, Action::Up);
        assert_eq!(exercise.current_target, "moderate");
        assert_eq!(exercise.next_target, "intense");
        assert_eq!(
            exercise.reason,
            "adh=1.00, streak=3, fail_streak=0 | consistent: small progress"
        );
    }

    #[test]
    fn test_empty_history_keeps_easiest() {
        let rubric = make_rubric();
        let policy = make_policy();
        let recs = recommend_next_targets(&rubric, &policy, &AdaptationHistory::default()).unwrap();

        for rec in recs.values() {
            assert_eq!(rec.window, WindowStats::default());
            assert_eq!(rec.action, Action::Keep);
            assert_eq!(rec.next_target, rec.current_target);
        }
        assert_eq!(recs["exercise"].current_target, "none");
        assert_eq!(recs["diet"].current_target, "junk");
    }

    #[test]
    fn test_fail_streak_moves_down() {
        let rubric = make_rubric();
        let policy = make_policy();
        let history = AdaptationHistory {
            entries: days("exercise", &["moderate", "light", "none"]),
            targets: Some(days("exercise", &["moderate", "moderate", "moderate"])),
            ..Default::default()
        };

        let recs = recommend_next_targets(&rubric, &policy, &history).unwrap();
        let exercise = &recs["exercise"];

        assert_eq!(exercise.window.fail_streak, 2);
        assert_eq!(exercise.window.streak, 0);
        assert_eq!(exercise.action, Action::Down);
        assert_eq!(exercise.next_target, "light");
        assert!(exercise.reason.ends_with("| easing low adherence"));
    }

    #[test]
    fn test_down_blocked_by_cooldown() {
        let rubric = make_rubric();
        let mut policy = make_policy();
        policy.adaptation.cadence.min_days_between_down = 3;
        let history = AdaptationHistory {
            entries: days("exercise", &["none", "none", "none"]),
            targets: Some(days("exercise", &["moderate", "moderate", "moderate"])),
            days_since_down: Some(BTreeMap::from([("exercise".to_string(), 1)])),
            ..Default::default()
        };

        let recs = recommend_next_targets(&rubric, &policy, &history).unwrap();
        assert_eq!(recs["exercise"].action, Action::Keep);
        assert_eq!(recs["exercise"].next_target, "moderate");
    }

    #[test]
    fn test_up_blocked_by_cooldown() {
        let rubric = make_rubric();
        let policy = make_policy();
        let history = AdaptationHistory {
            entries: days("exercise", &["moderate", "moderate", "moderate"]),
            targets: Some(days("exercise", &["light", "light", "light"])),
            days_since_up: Some(BTreeMap::from([("exercise".to_string(), 1)])),
            ..Default::default()
        };

        let recs = recommend_next_targets(&rubric, &policy, &history).unwrap();
        assert_eq!(recs["exercise"].action, Action::Keep);
        assert_eq!(recs["exercise"].next_target, "light");
    }

    #[test]
    fn test_thriving_requires_longer_streak() {
        let rubric = make_rubric();
        let policy = make_policy();
        let mut history = AdaptationHistory {
            entries: days("exercise", &["light", "light", "light"]),
            targets: Some(days("exercise", &["light", "light", "light"])),
            recent_daily_scores: Some(vec![90.0, 95.0, 92.0]),
            ..Default::default()
        };

        let engine = AdaptationEngine::new(&rubric, &policy);
        let plan = engine.plan(&history).unwrap();
        assert_eq!(plan.user_state, UserState::Thriving);
        // A 3-day window can never reach the thriving streak floor of 4
        assert_eq!(plan.recommendations["exercise"].action, Action::Keep);

        let mut wider = make_policy();
        wider.adaptation.windows.short_days = 5;
        history.entries = days("exercise", &["light"; 5]);
        history.targets = Some(days("exercise", &["light"; 5]));
        let plan = AdaptationEngine::new(&rubric, &wider).plan(&history).unwrap();
        let exercise = &plan.recommendations["exercise"];
        assert_eq!(exercise.action, Action::Up);
        assert_eq!(exercise.next_target, "moderate");
        assert!(exercise.reason.ends_with("| thriving: gentle push"));
    }

    #[test]
    fn test_user_state_classification() {
        let rubric = make_rubric();
        let policy = make_policy();
        let engine = AdaptationEngine::new(&rubric, &policy);

        assert_eq!(engine.classify_user_state(None), UserState::OnTrack);
        assert_eq!(engine.classify_user_state(Some(&[][..])), UserState::OnTrack);
        assert_eq!(engine.classify_user_state(Some(&[30.0, 40.0][..])), UserState::Struggling);
        assert_eq!(engine.classify_user_state(Some(&[50.0, 80.0][..])), UserState::OnTrack);
        // Only the last three scores count
        assert_eq!(
            engine.classify_user_state(Some(&[0.0, 0.0, 90.0, 85.0, 95.0][..])),
            UserState::Thriving
        );
    }

    #[test]
    fn test_struggling_reason_respects_essentials() {
        let rubric = make_rubric();
        let mut policy = make_policy();
        policy.adaptation.essentials_when_struggling = vec!["diet".to_string()];

        let mut entries = days("exercise", &["none", "none", "none"]);
        let mut targets = days("exercise", &["light", "light", "light"]);
        for (entry, target) in entries.iter_mut().zip(targets.iter_mut()) {
            entry.insert("diet".to_string(), "junk".to_string());
            target.insert("diet".to_string(), "moderate".to_string());
        }
        let history = AdaptationHistory {
            entries,
            targets: Some(targets),
            recent_daily_scores: Some(vec![20.0, 25.0, 30.0]),
            ..Default::default()
        };

        let recs = recommend_next_targets(&rubric, &policy, &history).unwrap();

        // Same outcome either way, only the wording differs
        assert_eq!(recs["exercise"].action, Action::Down);
        assert_eq!(recs["diet"].action, Action::Down);
        assert!(recs["exercise"].reason.ends_with("| struggling: easing"));
        assert!(recs["diet"].reason.ends_with("| easing low adherence"));
        assert_eq!(recs["exercise"].next_target, "none");
        assert_eq!(recs["diet"].next_target, "junk");
    }

    #[test]
    fn test_mismatched_targets_measure_against_self() {
        let rubric = make_rubric();
        let policy = make_policy();
        let history = AdaptationHistory {
            entries: days("exercise", &["light", "light", "light"]),
            targets: Some(days("exercise", &["intense"])),
            ..Default::default()
        };

        let recs = recommend_next_targets(&rubric, &policy, &history).unwrap();
        let exercise = &recs["exercise"];

        assert_eq!(exercise.window.adherence, 1.0);
        assert_eq!(exercise.current_target, "light");
        assert_eq!(exercise.action, Action::Up);
        assert_eq!(exercise.next_target, "moderate");
    }

    #[test]
    fn test_top_level_is_ceiling() {
        let rubric = make_rubric();
        let policy = make_policy();
        let history = AdaptationHistory {
            entries: days("exercise", &["intense", "intense", "intense"]),
            targets: Some(days("exercise", &["intense", "intense", "gym"])),
            ..Default::default()
        };

        let recs = recommend_next_targets(&rubric, &policy, &history).unwrap();
        let exercise = &recs["exercise"];

        assert_eq!(exercise.action, Action::Up);
        assert_eq!(exercise.current_target, "gym");
        assert_eq!(exercise.next_target, "intense");
    }

    #[test]
    fn test_keep_on_alias_target_holds_its_level() {
        let rubric = make_rubric();
        let policy = make_policy();
        let history = AdaptationHistory {
            entries: days("exercise", &["moderate", "moderate", "moderate"]),
            targets: Some(days("exercise", &["gym", "gym", "gym"])),
            ..Default::default()
        };

        let recs = recommend_next_targets(&rubric, &policy, &history).unwrap();
        let exercise = &recs["exercise"];

        // Eased from the alias's own level, not from the first level
        assert_eq!(exercise.window.fail_streak, 3);
        assert_eq!(exercise.action, Action::Down);
        assert_eq!(exercise.next_target, "moderate");

        let no_down = AdaptationHistory {
            days_since_down: Some(BTreeMap::from([("exercise".to_string(), 0)])),
            ..history
        };
        let recs = recommend_next_targets(&rubric, &policy, &no_down).unwrap();
        assert_eq!(recs["exercise"].action, Action::Keep);
        assert_eq!(recs["exercise"].next_target, "intense");
    }

    #[test]
    fn test_thriving_requires_higher_adherence() {
        let rubric = make_rubric();
        let mut policy = make_policy();
        policy.adaptation.windows.short_days = 5;
        let history = AdaptationHistory {
            entries: days("exercise", &["none", "light", "light", "light", "light"]),
            targets: Some(days("exercise", &["light"; 5])),
            recent_daily_scores: Some(vec![90.0, 95.0, 92.0]),
            ..Default::default()
        };

        let engine = AdaptationEngine::new(&rubric, &policy);
        let plan = engine.plan(&history).unwrap();
        let exercise = &plan.recommendations["exercise"];
        assert_eq!(plan.user_state, UserState::Thriving);
        assert_eq!(exercise.window.adherence, 0.8);
        assert_eq!(exercise.window.streak, 4);
        assert_eq!(exercise.action, Action::Keep);
        assert_eq!(exercise.next_target, "light");

        let on_track = AdaptationHistory {
            recent_daily_scores: None,
            ..history
        };
        let plan = engine.plan(&on_track).unwrap();
        let exercise = &plan.recommendations["exercise"];
        assert_eq!(plan.user_state, UserState::OnTrack);
        assert_eq!(exercise.action, Action::Up);
        assert_eq!(exercise.next_target, "moderate");
        assert!(exercise.reason.ends_with("| consistent: small progress"));
    }

    #[test]
    fn test_low_adherence_alone_moves_down() {
        let rubric = make_rubric();
        let policy = make_policy();
        let history = AdaptationHistory {
            entries: days("exercise", &["none", "none", "moderate"]),
            targets: Some(days("exercise", &["moderate", "moderate", "moderate"])),
            ..Default::default()
        };

        let recs = recommend_next_targets(&rubric, &policy, &history).unwrap();
        let exercise = &recs["exercise"];

        assert_eq!(exercise.window.streak, 1);
        assert_eq!(exercise.window.fail_streak, 0);
        assert!(exercise.window.adherence < 0.4);
        assert_eq!(exercise.action, Action::Down);
        assert_eq!(exercise.next_target, "light");
        assert!(exercise.reason.ends_with("| easing low adherence"));
    }

    #[test]
    fn test_zero_max_step_does_not_move() {
        let rubric = make_rubric();
        let mut policy = make_policy();
        policy.adaptation.thresholds = Thresholds {
            up_max_step: 0,
            ..Thresholds::default()
        };
        let history = AdaptationHistory {
            entries: days("exercise", &["moderate", "moderate"]),
            targets: Some(days("exercise", &["light", "light"])),
            ..Default::default()
        };

        let recs = recommend_next_targets(&rubric, &policy, &history).unwrap();
        assert_eq!(recs["exercise"].action, Action::Up);
        assert_eq!(recs["exercise"].next_target, "light");
    }

    #[test]
    fn test_window_stats_streaks_are_exclusive() {
        let rubric = make_rubric();
        let mut policy = make_policy();
        policy.adaptation.windows.short_days = 5;
        let engine = AdaptationEngine::new(&rubric, &policy);

        let chosen = [Some("none"), Some("light"), Some("light"), Some("none"), Some("none")];
        let targets = [Some("light"); 5];
        let stats = engine.window_stats("exercise", &chosen, &targets).unwrap();

        assert_eq!(stats.days, 5);
        assert!((stats.adherence - 0.4).abs() < 1e-9);
        assert_eq!(stats.streak, 0);
        assert_eq!(stats.fail_streak, 2);
    }

    #[test]
    fn test_window_shorter_than_policy() {
        let rubric = make_rubric();
        let policy = make_policy();
        let engine = AdaptationEngine::new(&rubric, &policy);

        let stats = engine
            .window_stats("exercise", &[Some("moderate")], &[Some("light")])
            .unwrap();

        assert_eq!(stats.days, 1);
        assert_eq!(stats.adherence, 1.0);
        assert_eq!(stats.streak, 1);
    }
}
