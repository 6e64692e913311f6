//! Pipeline orchestration
//!
//! This module provides the public API for Habit Flux. It wires the score
//! computer and the adaptation engine to a rubric and policy, and offers
//! JSON-in/JSON-out helpers for bindings and the CLI.

use tracing::info;

use crate::adapt::AdaptationEngine;
use crate::config::{policy_from_str, rubric_from_str, ConfigFormat, HabitConfig};
use crate::encoder::{ReportEncoder, ReportKind};
use crate::error::ScoringError;
use crate::history::HistoryWindow;
use crate::score::ScoreComputer;
use crate::types::{
    AdaptationHistory, AdaptationPlan, AdaptationPolicy, DailyEntry, DailyScore, DayRecord,
    DayResult, ProgramSummary, Rubric,
};

/// Score one day from JSON.
///
/// # Arguments
/// * `rubric_json` - Rubric document
/// * `day_json` - A day record: `{"date": "...", "entries": {...}, "bad_event": false}`
///
/// # Returns
/// A daily score report envelope
pub fn score_day_json(rubric_json: &str, day_json: &str) -> Result<String, ScoringError> {
    let rubric = rubric_from_str(rubric_json, ConfigFormat::Json)?;
    let day: DayRecord = serde_json::from_str(day_json)?;
    let score = ScoreComputer::new(&rubric).compute_daily_score(&day.entries, day.bad_event)?;
    ReportEncoder::new().encode_to_json(ReportKind::DailyScore, day.date, score)
}

/// Summarize a JSON array of day records into a program summary report
pub fn program_summary_json(rubric_json: &str, days_json: &str) -> Result<String, ScoringError> {
    let rubric = rubric_from_str(rubric_json, ConfigFormat::Json)?;
    let days: Vec<DayRecord> = serde_json::from_str(days_json)?;
    let summary = summarize_records(&rubric, &days)?;
    ReportEncoder::new().encode_to_json(ReportKind::ProgramSummary, None, summary)
}

/// Recommend next targets from a JSON adaptation history
pub fn recommend_json(
    rubric_json: &str,
    policy_json: &str,
    history_json: &str,
) -> Result<String, ScoringError> {
    let rubric = rubric_from_str(rubric_json, ConfigFormat::Json)?;
    let policy = policy_from_str(policy_json, ConfigFormat::Json, &rubric)?;
    let history: AdaptationHistory = serde_json::from_str(history_json)?;
    let plan = AdaptationEngine::new(&rubric, &policy).plan(&history)?;
    ReportEncoder::new().encode_to_json(ReportKind::Recommendations, None, plan)
}

fn summarize_records(rubric: &Rubric, days: &[DayRecord]) -> Result<ProgramSummary, ScoringError> {
    let entries: Vec<DailyEntry> = days.iter().map(|d| d.entries.clone()).collect();
    let flags: Vec<bool> = days.iter().map(|d| d.bad_event).collect();
    ScoreComputer::new(rubric).compute_program_summary(&entries, &flags)
}

/// Stateful processor for day-by-day ingestion with persistent history.
///
/// Use this when targets should follow the user across calls: each ingested
/// day is scored, appended to the history window, and the resulting
/// recommendations become the next day's targets.
pub struct HabitProcessor {
    rubric: Rubric,
    policy: AdaptationPolicy,
    history: HistoryWindow,
    encoder: ReportEncoder,
}

impl HabitProcessor {
    /// Create a processor, validating the rubric and policy
    pub fn new(rubric: Rubric, policy: AdaptationPolicy) -> Result<Self, ScoringError> {
        Self::with_history_window(rubric, policy, crate::history::DEFAULT_HISTORY_WINDOW)
    }

    /// Create a processor with a specific history window size
    pub fn with_history_window(
        rubric: Rubric,
        policy: AdaptationPolicy,
        window_days: usize,
    ) -> Result<Self, ScoringError> {
        rubric.validate()?;
        policy.validate(&rubric)?;
        Ok(Self {
            rubric,
            policy,
            history: HistoryWindow::new(window_days),
            encoder: ReportEncoder::new(),
        })
    }

    /// Create a processor from loaded configuration
    pub fn from_config(config: HabitConfig) -> Result<Self, ScoringError> {
        Self::new(config.rubric, config.policy)
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    pub fn policy(&self) -> &AdaptationPolicy {
        &self.policy
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    pub fn encoder(&self) -> &ReportEncoder {
        &self.encoder
    }

    /// Load history state from JSON
    pub fn load_history(&mut self, json: &str) -> Result<(), ScoringError> {
        self.history = HistoryWindow::from_json(json)?;
        Ok(())
    }

    /// Save history state to JSON
    pub fn save_history(&self) -> Result<String, ScoringError> {
        Ok(self.history.to_json()?)
    }

    /// Score a single day without touching the history
    pub fn score_day(&self, entries: &DailyEntry, bad_event: bool) -> Result<DailyScore, ScoringError> {
        ScoreComputer::new(&self.rubric).compute_daily_score(entries, bad_event)
    }

    /// Summarize a sequence of day records
    pub fn summarize(&self, days: &[DayRecord]) -> Result<ProgramSummary, ScoringError> {
        summarize_records(&self.rubric, days)
    }

    /// Recommend next targets from caller-supplied history
    pub fn recommend(&self, history: &AdaptationHistory) -> Result<AdaptationPlan, ScoringError> {
        AdaptationEngine::new(&self.rubric, &self.policy).plan(history)
    }

    /// Score a day, record it, and adopt the resulting recommendations
    pub fn ingest_day(&mut self, day: &DayRecord) -> Result<DayResult, ScoringError> {
        let score = self.score_day(&day.entries, day.bad_event)?;
        self.history
            .push_day(day.entries.clone(), day.targets.clone(), score.final_daily_score);

        let plan = self.recommend(&self.history.to_history())?;
        self.history.apply(&plan.recommendations);

        info!(
            date = ?day.date,
            score = score.final_daily_score,
            state = %plan.user_state,
            "ingested day"
        );

        Ok(DayResult { score, plan })
    }

    /// Ingest a JSON day record and return a day result report
    pub fn ingest_day_json(&mut self, day_json: &str) -> Result<String, ScoringError> {
        let day: DayRecord = serde_json::from_str(day_json)?;
        let result = self.ingest_day(&day)?;
        self.encoder
            .encode_to_json(ReportKind::DayResult, day.date, result)
    }
}
