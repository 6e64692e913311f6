//! Core types for Habit Flux
//!
//! This module defines the data that flows through scoring and adaptation:
//! the rubric and adaptation policy, daily entries and history windows, and
//! the daily score, program summary and recommendation outputs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ScoringError;

/// Raw labels logged for one day, keyed by activity name
pub type DailyEntry = BTreeMap<String, String>;

/// Target labels for one day, keyed by activity name
pub type TargetRecord = BTreeMap<String, String>;

// ============================================================================
// Rubric
// ============================================================================

/// Flat bonus/penalty applied to the composite score from a single daily flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BonusRule {
    /// Name of the tracked event (e.g. "no_junk_eating")
    pub name: String,
    /// Delta applied when the bad event did not happen
    pub good_delta: f64,
    /// Delta applied when the bad event happened
    pub bad_delta: f64,
    /// Lower bound of the final daily score
    pub clamp_min: f64,
    /// Upper bound of the final daily score
    pub clamp_max: f64,
}

impl Default for BonusRule {
    fn default() -> Self {
        Self {
            name: "no_junk_eating".to_string(),
            good_delta: 5.0,
            bad_delta: -5.0,
            clamp_min: 0.0,
            clamp_max: 100.0,
        }
    }
}

/// Scoring definition of a single activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityRubric {
    /// Canonical label -> fraction in [0, 1]
    pub labels: BTreeMap<String, f64>,
    /// Canonical label -> multiplier applied to the fraction (default 1.0)
    #[serde(default)]
    pub label_weights: BTreeMap<String, f64>,
    /// Raw label -> canonical label
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl ActivityRubric {
    /// Labels sorted ascending by fraction, ties broken by label name
    pub fn labels_by_fraction(&self) -> Vec<String> {
        let mut labels: Vec<(&String, f64)> = self.labels.iter().map(|(k, v)| (k, *v)).collect();
        // BTreeMap iteration is already name-ordered, so a stable sort keeps ties by name
        labels.sort_by(|a, b| a.1.total_cmp(&b.1));
        labels.into_iter().map(|(k, _)| k.clone()).collect()
    }

    /// The lowest-fraction label
    pub fn easiest_label(&self) -> Option<String> {
        self.labels_by_fraction().into_iter().next()
    }
}

/// Complete scoring rubric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    #[serde(default)]
    pub bonus: BonusRule,
    #[serde(default)]
    pub activities: BTreeMap<String, ActivityRubric>,
    /// Per-activity weights for the composite mean
    #[serde(default)]
    pub weights_activities: BTreeMap<String, f64>,
}

impl Rubric {
    /// Look up an activity definition
    pub fn activity(&self, name: &str) -> Result<&ActivityRubric, ScoringError> {
        self.activities
            .get(name)
            .ok_or_else(|| ScoringError::UnknownActivity(name.to_string()))
    }

    /// Activity names in stable order
    pub fn activity_names(&self) -> impl Iterator<Item = &str> {
        self.activities.keys().map(String::as_str)
    }

    /// Check the invariants the scoring core relies on
    pub fn validate(&self) -> Result<(), ScoringError> {
        for (name, activity) in &self.activities {
            if activity.labels.is_empty() {
                return Err(ScoringError::Configuration(format!(
                    "Activity '{name}' must define 'labels'"
                )));
            }
            for (label, fraction) in &activity.labels {
                if !(0.0..=1.0).contains(fraction) {
                    return Err(ScoringError::Configuration(format!(
                        "Activity '{name}' label '{label}' has fraction {fraction} outside [0, 1]"
                    )));
                }
            }
        }
        for (name, weight) in &self.weights_activities {
            if *weight < 0.0 {
                return Err(ScoringError::Configuration(format!(
                    "Activity weight for '{name}' must not be negative, got {weight}"
                )));
            }
        }
        if self.bonus.clamp_min > self.bonus.clamp_max {
            return Err(ScoringError::Configuration(format!(
                "Bonus clamp_min {} exceeds clamp_max {}",
                self.bonus.clamp_min, self.bonus.clamp_max
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Adaptation policy
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    /// Number of most recent days used for adherence and user state
    pub short_days: usize,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self { short_days: 3 }
    }
}

/// Adherence and streak thresholds for moving a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub up_min_short_adherence: f64,
    pub up_min_streak: usize,
    pub up_max_step: usize,
    pub down_max_short_adherence: f64,
    pub down_min_fail_streak: usize,
    pub down_max_step: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            up_min_short_adherence: 0.80,
            up_min_streak: 2,
            up_max_step: 1,
            down_max_short_adherence: 0.40,
            down_min_fail_streak: 2,
            down_max_step: 1,
        }
    }
}

/// Minimum days between consecutive moves in the same direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cadence {
    pub min_days_between_up: u32,
    pub min_days_between_down: u32,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            min_days_between_up: 2,
            min_days_between_down: 1,
        }
    }
}

/// Score thresholds used to classify the user state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateThresholds {
    pub struggling_lt: f64,
    pub thriving_gt: f64,
}

impl Default for StateThresholds {
    fn default() -> Self {
        Self {
            struggling_lt: 50.0,
            thriving_gt: 80.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationSettings {
    pub windows: WindowSettings,
    pub thresholds: Thresholds,
    pub cadence: Cadence,
    pub state: StateThresholds,
    /// Activities flagged as essential while the user is struggling
    pub essentials_when_struggling: Vec<String>,
}

/// Adaptation policy: decision thresholds plus optional level orderings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationPolicy {
    /// Activity -> labels ordered easiest to hardest
    pub levels_order: BTreeMap<String, Vec<String>>,
    pub adaptation: AdaptationSettings,
}

impl AdaptationPolicy {
    /// Check the policy against itself and the rubric it will be used with
    pub fn validate(&self, rubric: &Rubric) -> Result<(), ScoringError> {
        if self.adaptation.windows.short_days == 0 {
            return Err(ScoringError::Configuration(
                "windows.short_days must be at least 1".to_string(),
            ));
        }
        let state = &self.adaptation.state;
        if state.struggling_lt > state.thriving_gt {
            return Err(ScoringError::Configuration(format!(
                "state.struggling_lt {} exceeds state.thriving_gt {}",
                state.struggling_lt, state.thriving_gt
            )));
        }
        for (activity, levels) in &self.levels_order {
            let definition = rubric.activity(activity).map_err(|_| {
                ScoringError::Configuration(format!(
                    "levels_order references unknown activity '{activity}'"
                ))
            })?;
            if levels.is_empty() {
                return Err(ScoringError::Configuration(format!(
                    "levels_order for '{activity}' is empty"
                )));
            }
            if let Some(unknown) = levels.iter().find(|l| !definition.labels.contains_key(*l)) {
                return Err(ScoringError::Configuration(format!(
                    "levels_order for '{activity}' references unknown label '{unknown}'"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// One logged day as read from input files or streams
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    /// Calendar date of the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Activity -> raw label
    #[serde(default)]
    pub entries: DailyEntry,
    /// Whether the bonus rule's bad event happened
    #[serde(default)]
    pub bad_event: bool,
    /// Targets that were in effect on this day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<TargetRecord>,
}

/// History supplied to the adaptation engine, oldest day first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptationHistory {
    #[serde(default, alias = "last_k_entries")]
    pub entries: Vec<DailyEntry>,
    #[serde(default, alias = "last_k_targets")]
    pub targets: Option<Vec<TargetRecord>>,
    #[serde(default)]
    pub recent_daily_scores: Option<Vec<f64>>,
    /// Activity -> days since the last up-move
    #[serde(default)]
    pub days_since_up: Option<BTreeMap<String, u32>>,
    /// Activity -> days since the last down-move
    #[serde(default)]
    pub days_since_down: Option<BTreeMap<String, u32>>,
}

// ============================================================================
// Outputs
// ============================================================================

/// Score for a single day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyScore {
    /// Activity -> effective value scaled to 0-100
    pub activity_scores: BTreeMap<String, f64>,
    /// Weighted mean of effective values scaled to 0-100, before the bonus
    pub base_core_score: f64,
    pub bonus_delta: f64,
    /// Base score plus bonus delta, clamped to the bonus rule bounds
    pub final_daily_score: f64,
}

/// Aggregate over a sequence of days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub program_overall_score: f64,
    pub days_counted: usize,
    pub avg_daily_score: f64,
    /// Activity -> mean effective value scaled to 0-100
    pub activity_overall: BTreeMap<String, f64>,
}

/// Coarse classification of recent composite scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    Struggling,
    #[default]
    OnTrack,
    Thriving,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Struggling => "struggling",
            UserState::OnTrack => "on_track",
            UserState::Thriving => "thriving",
        }
    }
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target adjustment decided for an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Up,
    Down,
    Keep,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::Keep => "keep",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adherence statistics over the short window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowStats {
    /// Number of days actually evaluated
    pub days: usize,
    /// Share of evaluated days where the chosen label met the target, in [0, 1]
    pub adherence: f64,
    /// Trailing run of met days
    pub streak: usize,
    /// Trailing run of missed days
    pub fail_streak: usize,
}

/// Next-target recommendation for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub current_target: String,
    pub next_target: String,
    pub action: Action,
    /// Human-readable trace of the numbers and the rule that fired
    pub reason: String,
    pub window: WindowStats,
}

/// Recommendations for every activity plus the user state they were decided under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationPlan {
    pub user_state: UserState,
    pub recommendations: BTreeMap<String, Recommendation>,
}

/// Outcome of ingesting one logged day into a processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayResult {
    pub score: DailyScore,
    pub plan: AdaptationPlan,
}
