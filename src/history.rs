//! Rolling history management
//!
//! This module keeps the last N days of entries, targets and composite scores
//! together with per-activity cooldown counters, so orchestrators can feed the
//! adaptation engine consistent snapshots across calls. The engine itself
//! never reads or mutates this store.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::types::{Action, AdaptationHistory, DailyEntry, Recommendation, TargetRecord};

/// Default history window in days
pub const DEFAULT_HISTORY_WINDOW: usize = 14;

/// History store for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryWindow {
    /// Logged labels, oldest first
    entries: VecDeque<DailyEntry>,
    /// Targets in effect on each logged day
    targets: VecDeque<TargetRecord>,
    /// Final daily scores
    scores: VecDeque<f64>,
    /// Targets to apply to the next logged day
    current_targets: TargetRecord,
    /// Activity -> days since last up-move
    days_since_up: BTreeMap<String, u32>,
    /// Activity -> days since last down-move
    days_since_down: BTreeMap<String, u32>,
    /// Maximum window size
    window_size: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl HistoryWindow {
    /// Create an empty history with the given window size (at least one day)
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            entries: VecDeque::with_capacity(window_size),
            targets: VecDeque::with_capacity(window_size),
            scores: VecDeque::with_capacity(window_size),
            current_targets: TargetRecord::new(),
            days_since_up: BTreeMap::new(),
            days_since_down: BTreeMap::new(),
            window_size,
        }
    }

    /// Record a logged day.
    ///
    /// `targets` overrides the targets in effect that day; when absent the
    /// targets from the last applied recommendations are used. Every cooldown
    /// counter ages by one day.
    pub fn push_day(&mut self, entry: DailyEntry, targets: Option<TargetRecord>, score: f64) {
        let targets = targets.unwrap_or_else(|| self.current_targets.clone());

        self.entries.push_back(entry);
        self.targets.push_back(targets);
        self.scores.push_back(score);
        while self.entries.len() > self.window_size {
            self.entries.pop_front();
            self.targets.pop_front();
            self.scores.pop_front();
        }

        for days in self
            .days_since_up
            .values_mut()
            .chain(self.days_since_down.values_mut())
        {
            *days = days.saturating_add(1);
        }
    }

    /// Adopt recommended targets and reset cooldowns of activities that moved
    pub fn apply<'r>(&mut self, recommendations: impl IntoIterator<Item = (&'r String, &'r Recommendation)>) {
        for (activity, rec) in recommendations {
            match rec.action {
                Action::Up => {
                    self.days_since_up.insert(activity.clone(), 0);
                }
                Action::Down => {
                    self.days_since_down.insert(activity.clone(), 0);
                }
                Action::Keep => {}
            }
            self.current_targets
                .insert(activity.clone(), rec.next_target.clone());
        }
    }

    /// Snapshot for the adaptation engine
    pub fn to_history(&self) -> AdaptationHistory {
        AdaptationHistory {
            entries: self.entries.iter().cloned().collect(),
            targets: Some(self.targets.iter().cloned().collect()),
            recent_daily_scores: Some(self.scores.iter().copied().collect()),
            days_since_up: Some(self.days_since_up.clone()),
            days_since_down: Some(self.days_since_down.clone()),
        }
    }

    /// Targets the next logged day will be measured against
    pub fn current_targets(&self) -> &TargetRecord {
        &self.current_targets
    }

    /// Number of days currently held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Load history from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize history to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
