//! Configuration loading
//!
//! Reads the scoring rubric and the adaptation policy from YAML or JSON files
//! and validates them before anything is scored. Environment variables are
//! only consulted by [`ConfigPaths::from_env`]; the scoring and adaptation
//! functions always receive the loaded structures explicitly.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ScoringError;
use crate::types::{AdaptationPolicy, Rubric};

/// Environment variable overriding the rubric path
pub const SCORING_CONFIG_ENV: &str = "HABIT_SCORING_CONFIG";

/// Environment variable overriding the adaptation policy path
pub const ADAPTATION_CONFIG_ENV: &str = "HABIT_ADAPTATION_CONFIG";

pub const DEFAULT_SCORING_PATH: &str = "config/scoring.yaml";
pub const DEFAULT_ADAPTATION_PATH: &str = "config/adaptation.yaml";

/// Locations of the two configuration files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub scoring: PathBuf,
    pub adaptation: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            scoring: PathBuf::from(DEFAULT_SCORING_PATH),
            adaptation: PathBuf::from(DEFAULT_ADAPTATION_PATH),
        }
    }
}

impl ConfigPaths {
    /// Resolve paths: explicit argument, then environment, then the defaults
    pub fn from_env(scoring: Option<PathBuf>, adaptation: Option<PathBuf>) -> Self {
        let defaults = Self::default();
        Self {
            scoring: scoring
                .or_else(|| env::var_os(SCORING_CONFIG_ENV).map(PathBuf::from))
                .unwrap_or(defaults.scoring),
            adaptation: adaptation
                .or_else(|| env::var_os(ADAPTATION_CONFIG_ENV).map(PathBuf::from))
                .unwrap_or(defaults.adaptation),
        }
    }
}

/// Rubric and policy loaded together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HabitConfig {
    pub rubric: Rubric,
    pub policy: AdaptationPolicy,
}

impl HabitConfig {
    /// Load and validate both files
    pub fn load(paths: &ConfigPaths) -> Result<Self, ScoringError> {
        let rubric = load_rubric(&paths.scoring)?;
        let policy = load_policy(&paths.adaptation, &rubric)?;
        Ok(Self { rubric, policy })
    }
}

/// Load and validate a rubric file
pub fn load_rubric(path: &Path) -> Result<Rubric, ScoringError> {
    let rubric: Rubric = parse_document(path, &fs::read_to_string(path)?)?;
    rubric.validate()?;
    debug!(
        path = %path.display(),
        activities = rubric.activities.len(),
        "loaded rubric"
    );
    Ok(rubric)
}

/// Load and validate a policy file; a missing file yields the default policy
pub fn load_policy(path: &Path, rubric: &Rubric) -> Result<AdaptationPolicy, ScoringError> {
    let policy = if path.exists() {
        parse_document(path, &fs::read_to_string(path)?)?
    } else {
        warn!(path = %path.display(), "adaptation policy not found, using defaults");
        AdaptationPolicy::default()
    };
    policy.validate(rubric)?;
    Ok(policy)
}

/// Parse a rubric from a string in the given format
pub fn rubric_from_str(content: &str, format: ConfigFormat) -> Result<Rubric, ScoringError> {
    let rubric: Rubric = parse_str(content, format)?;
    rubric.validate()?;
    Ok(rubric)
}

/// Parse a policy from a string in the given format
pub fn policy_from_str(
    content: &str,
    format: ConfigFormat,
    rubric: &Rubric,
) -> Result<AdaptationPolicy, ScoringError> {
    let policy: AdaptationPolicy = parse_str(content, format)?;
    policy.validate(rubric)?;
    Ok(policy)
}

/// Serialization format of a configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// `.json` files are JSON, everything else is YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

fn parse_document<T>(path: &Path, content: &str) -> Result<T, ScoringError>
where
    T: DeserializeOwned + Default,
{
    parse_str(content, ConfigFormat::from_path(path))
}

fn parse_str<T>(content: &str, format: ConfigFormat) -> Result<T, ScoringError>
where
    T: DeserializeOwned + Default,
{
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    match format {
        ConfigFormat::Json => Ok(serde_json::from_str(content)?),
        ConfigFormat::Yaml => Ok(serde_yaml::from_str(content)?),
    }
}
