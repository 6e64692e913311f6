//! Report encoding
//!
//! This module wraps scoring and adaptation results in a versioned envelope
//! carrying producer metadata, so downstream consumers can trace which build
//! and which process instance computed a result.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScoringError;
use crate::{HABIT_FLUX_VERSION, PRODUCER_NAME};

/// Current report envelope version
pub const REPORT_VERSION: &str = "1.0.0";

/// What a report body contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    DailyScore,
    ProgramSummary,
    Recommendations,
    DayResult,
}

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Versioned report envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report<T> {
    pub report_version: String,
    pub kind: ReportKind,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub body: T,
}

/// Report encoder for producing envelopes
#[derive(Debug, Clone)]
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Wrap a result in a report envelope
    pub fn encode<T: Serialize>(&self, kind: ReportKind, date: Option<NaiveDate>, body: T) -> Report<T> {
        Report {
            report_version: REPORT_VERSION.to_string(),
            kind,
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: HABIT_FLUX_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            date,
            body,
        }
    }

    /// Encode to a compact JSON string
    pub fn encode_to_json<T: Serialize>(
        &self,
        kind: ReportKind,
        date: Option<NaiveDate>,
        body: T,
    ) -> Result<String, ScoringError> {
        Ok(serde_json::to_string(&self.encode(kind, date, body))?)
    }
}
