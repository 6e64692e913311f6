//! Habit Flux - Rubric-based daily habit scoring with adaptive difficulty targets
//!
//! Habit Flux turns a user's daily logged labels into a bounded 0-100 score and
//! recommends whether each activity's difficulty target should move up, move
//! down, or stay, based on recent adherence.
//!
//! ## Modules
//!
//! - **Score Computer** ([`score`]): weighted composite daily score with bonus
//!   and clamping, plus multi-day program summaries
//! - **Adaptation Engine** ([`adapt`]): windowed adherence, streaks, user state
//!   and cooldown-gated target moves
//! - **Normalizer** ([`normalizer`]): raw label to canonical label resolution
//!
//! Both decision components are pure functions of the rubric, policy and
//! history passed in; [`pipeline::HabitProcessor`] and [`history`] carry state
//! across calls for orchestrators that need it.

pub mod adapt;
pub mod config;
pub mod encoder;
pub mod error;
pub mod history;
pub mod normalizer;
pub mod pipeline;
pub mod score;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use adapt::{recommend_next_targets, AdaptationEngine};
pub use config::{ConfigPaths, HabitConfig};
pub use error::ScoringError;
pub use history::HistoryWindow;
pub use normalizer::LabelNormalizer;
pub use pipeline::{program_summary_json, recommend_json, score_day_json, HabitProcessor};
pub use score::{compute_daily_score, compute_program_summary, ScoreComputer};
pub use types::{
    Action, AdaptationHistory, AdaptationPlan, AdaptationPolicy, DailyEntry, DailyScore,
    DayRecord, ProgramSummary, Recommendation, Rubric, TargetRecord, UserState,
};

/// Library version embedded in all reports
pub const HABIT_FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "habit-flux";
