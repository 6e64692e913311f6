//! Daily score computation
//!
//! Turns a day's raw labels into a bounded composite score:
//! - each label resolves to a fraction and a weight multiplier
//! - effective value = clamp(fraction × multiplier, 0, 1)
//! - composite = weighted mean of effective values × 100, plus the bonus delta,
//!   clamped to the bonus rule bounds
//!
//! Multi-day sequences are aggregated into a program summary.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::ScoringError;
use crate::normalizer::LabelNormalizer;
use crate::types::{DailyEntry, DailyScore, ProgramSummary, Rubric};

/// Score computer bound to a rubric
#[derive(Debug, Clone, Copy)]
pub struct ScoreComputer<'a> {
    rubric: &'a Rubric,
}

/// Daily score together with the unrounded effective values behind it
#[derive(Debug, Clone)]
struct ScoredDay {
    score: DailyScore,
    effective: BTreeMap<String, f64>,
}

impl<'a> ScoreComputer<'a> {
    pub fn new(rubric: &'a Rubric) -> Self {
        Self { rubric }
    }

    /// Score a single day
    pub fn compute_daily_score(
        &self,
        entries: &DailyEntry,
        bad_event: bool,
    ) -> Result<DailyScore, ScoringError> {
        Ok(self.score_day(entries, bad_event)?.score)
    }

    /// Score every day of a program and aggregate the results
    pub fn compute_program_summary(
        &self,
        daily_entries: &[DailyEntry],
        bad_event_flags: &[bool],
    ) -> Result<ProgramSummary, ScoringError> {
        if daily_entries.len() != bad_event_flags.len() {
            return Err(ScoringError::LengthMismatch {
                entries: daily_entries.len(),
                flags: bad_event_flags.len(),
            });
        }

        let mut daily_scores = Vec::with_capacity(daily_entries.len());
        let mut accum: BTreeMap<String, Vec<f64>> = self
            .rubric
            .activity_names()
            .map(|name| (name.to_string(), Vec::with_capacity(daily_entries.len())))
            .collect();

        for (entries, bad_event) in daily_entries.iter().zip(bad_event_flags) {
            let day = self.score_day(entries, *bad_event)?;
            daily_scores.push(day.score.final_daily_score);
            for (activity, value) in day.effective {
                if let Some(values) = accum.get_mut(&activity) {
                    values.push(value);
                }
            }
        }

        let program_overall = mean(&daily_scores).map(round2).unwrap_or(0.0);
        let activity_overall = accum
            .into_iter()
            .map(|(activity, values)| {
                let overall = round2(mean(&values).unwrap_or(0.0) * 100.0);
                (activity, overall)
            })
            .collect();

        Ok(ProgramSummary {
            program_overall_score: program_overall,
            days_counted: daily_scores.len(),
            avg_daily_score: program_overall,
            activity_overall,
        })
    }

    fn score_day(&self, entries: &DailyEntry, bad_event: bool) -> Result<ScoredDay, ScoringError> {
        let normalizer = LabelNormalizer::new(self.rubric);
        let mut effective = BTreeMap::new();
        let mut activity_scores = BTreeMap::new();

        for activity in self.rubric.activity_names() {
            let resolved = normalizer.resolve(activity, entries.get(activity).map(String::as_str))?;
            let value = (resolved.fraction * resolved.weight).clamp(0.0, 1.0);
            activity_scores.insert(activity.to_string(), round2(value * 100.0));
            effective.insert(activity.to_string(), value);
        }

        let core_mean = weighted_mean(&effective, &self.rubric.weights_activities);
        let base_core_score = core_mean * 100.0;

        let bonus = &self.rubric.bonus;
        let bonus_delta = if bad_event {
            bonus.bad_delta
        } else {
            bonus.good_delta
        };
        // Rounded before clamping so the reported score never leaves the bounds
        let final_daily_score = clamp(
            round2(base_core_score + bonus_delta),
            bonus.clamp_min,
            bonus.clamp_max,
        );

        debug!(
            base = base_core_score,
            delta = bonus_delta,
            score = final_daily_score,
            "scored day"
        );

        Ok(ScoredDay {
            score: DailyScore {
                activity_scores,
                base_core_score: round2(base_core_score),
                bonus_delta,
                final_daily_score,
            },
            effective,
        })
    }
}

/// Score a single day against a rubric
pub fn compute_daily_score(
    rubric: &Rubric,
    entries: &DailyEntry,
    bad_event: bool,
) -> Result<DailyScore, ScoringError> {
    ScoreComputer::new(rubric).compute_daily_score(entries, bad_event)
}

/// Aggregate a sequence of days against a rubric
pub fn compute_program_summary(
    rubric: &Rubric,
    daily_entries: &[DailyEntry],
    bad_event_flags: &[bool],
) -> Result<ProgramSummary, ScoringError> {
    ScoreComputer::new(rubric).compute_program_summary(daily_entries, bad_event_flags)
}

/// Clamp that tolerates inverted bounds by preferring the lower one
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    lo.max(hi.min(value))
}

/// Weighted mean of values; unweighted when no weights are configured.
///
/// Activities without a configured weight count with weight 1.0. A non-positive
/// total weight also falls back to the unweighted mean.
pub fn weighted_mean(values: &BTreeMap<String, f64>, weights: &BTreeMap<String, f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let unweighted = || values.values().sum::<f64>() / values.len() as f64;
    if weights.is_empty() {
        return unweighted();
    }

    let (num, den) = values.iter().fold((0.0, 0.0), |(num, den), (key, value)| {
        let weight = weights.get(key).copied().unwrap_or(1.0);
        (num + value * weight, den + weight)
    });

    if den > 0.0 {
        num / den
    } else {
        unweighted()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
