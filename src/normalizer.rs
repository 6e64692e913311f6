//! Label normalization
//!
//! Maps a raw user-entered label to a canonical rubric label and exposes the
//! canonical label's fraction and weight multiplier.
//!
//! Resolution order for a raw label:
//! 1. missing or empty: the activity's easiest label
//! 2. exact canonical label
//! 3. exact alias key
//! 4. case-insensitive canonical label (raw value trimmed)
//! 5. case-insensitive alias key (raw value trimmed)
//! 6. passthrough of the raw value unchanged

use tracing::warn;

use crate::error::ScoringError;
use crate::types::{ActivityRubric, Rubric};

/// Fraction reported for a label the rubric does not know
pub const UNKNOWN_LABEL_FRACTION: f64 = 0.0;

/// Multiplier reported for a label without a configured weight
pub const DEFAULT_LABEL_WEIGHT: f64 = 1.0;

/// A raw label resolved against the rubric
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLabel {
    pub canonical: String,
    pub fraction: f64,
    pub weight: f64,
}

/// Normalizer for rubric labels
#[derive(Debug, Clone, Copy)]
pub struct LabelNormalizer<'a> {
    rubric: &'a Rubric,
}

impl<'a> LabelNormalizer<'a> {
    pub fn new(rubric: &'a Rubric) -> Self {
        Self { rubric }
    }

    /// Resolve a raw label to its canonical form
    pub fn resolve_category(
        &self,
        activity: &str,
        raw_label: Option<&str>,
    ) -> Result<String, ScoringError> {
        let definition = self.rubric.activity(activity)?;
        Ok(resolve_in(definition, raw_label))
    }

    /// Fraction in [0, 1] for a raw label
    pub fn fraction(&self, activity: &str, raw_label: Option<&str>) -> Result<f64, ScoringError> {
        Ok(self.resolve(activity, raw_label)?.fraction)
    }

    /// Weight multiplier for a raw label
    pub fn weight(&self, activity: &str, raw_label: Option<&str>) -> Result<f64, ScoringError> {
        Ok(self.resolve(activity, raw_label)?.weight)
    }

    /// Resolve once and return canonical label, fraction and weight together
    pub fn resolve(
        &self,
        activity: &str,
        raw_label: Option<&str>,
    ) -> Result<ResolvedLabel, ScoringError> {
        let definition = self.rubric.activity(activity)?;
        let canonical = resolve_in(definition, raw_label);

        let fraction = match definition.labels.get(&canonical) {
            Some(fraction) => *fraction,
            None => {
                warn!(activity, label = %canonical, "label not in rubric, scoring as zero");
                UNKNOWN_LABEL_FRACTION
            }
        };
        let weight = definition
            .label_weights
            .get(&canonical)
            .copied()
            .unwrap_or(DEFAULT_LABEL_WEIGHT);

        Ok(ResolvedLabel {
            canonical,
            fraction,
            weight,
        })
    }
}

fn resolve_in(definition: &ActivityRubric, raw_label: Option<&str>) -> String {
    let raw = match raw_label {
        Some(raw) if !raw.is_empty() => raw,
        _ => return definition.easiest_label().unwrap_or_default(),
    };

    if definition.labels.contains_key(raw) {
        return raw.to_string();
    }
    if let Some(canonical) = definition.aliases.get(raw) {
        return canonical.clone();
    }

    let folded = raw.trim().to_lowercase();
    if let Some(label) = definition
        .labels
        .keys()
        .find(|label| label.to_lowercase() == folded)
    {
        return label.clone();
    }
    if let Some(canonical) = definition
        .aliases
        .iter()
        .find_map(|(alias, canonical)| (alias.to_lowercase() == folded).then_some(canonical))
    {
        return canonical.clone();
    }

    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn make_rubric() -> Rubric {
        let diet = ActivityRubric {
            labels: BTreeMap::from([
                ("junk".to_string(), 0.0),
                ("moderate".to_string(), 0.5),
                ("Clean".to_string(), 1.0),
            ]),
            label_weights: BTreeMap::from([("moderate".to_string(), 1.2)]),
            aliases: BTreeMap::from([
                ("fast food".to_string(), "junk".to_string()),
                ("Salad".to_string(), "Clean".to_string()),
            ]),
        };
        Rubric {
            activities: BTreeMap::from([("diet".to_string(), diet)]),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolution_order() {
        let rubric = make_rubric();
        let normalizer = LabelNormalizer::new(&rubric);
        let resolve = |raw: Option<&str>| normalizer.resolve_category("diet", raw).unwrap();

        assert_eq!(resolve(Some("moderate")), "moderate");
        assert_eq!(resolve(Some("fast food")), "junk");
        assert_eq!(resolve(Some("  clean ")), "Clean");
        assert_eq!(resolve(Some("SALAD")), "Clean");
        assert_eq!(resolve(Some("pizza")), "pizza");
    }

    #[test]
    fn test_missing_label_defaults_to_easiest() {
        let rubric = make_rubric();
        let normalizer = LabelNormalizer::new(&rubric);

        assert_eq!(normalizer.resolve_category("diet", None).unwrap(), "junk");
        assert_eq!(normalizer.resolve_category("diet", Some("")).unwrap(), "junk");
    }

    #[test]
    fn test_fraction_and_weight_lookups() {
        let rubric = make_rubric();
        let normalizer = LabelNormalizer::new(&rubric);

        assert_eq!(normalizer.fraction("diet", Some("salad")).unwrap(), 1.0);
        assert_eq!(normalizer.weight("diet", Some("salad")).unwrap(), 1.0);
        assert_eq!(normalizer.fraction("diet", Some("moderate")).unwrap(), 0.5);
        assert_eq!(normalizer.weight("diet", Some("moderate")).unwrap(), 1.2);
    }

    #[test]
    fn test_unknown_label_passthrough_scores_zero() {
        let rubric = make_rubric();
        let resolved = LabelNormalizer::new(&rubric)
            .resolve("diet", Some("pizza"))
            .unwrap();

        assert_eq!(resolved.canonical, "pizza");
        assert_eq!(resolved.fraction, UNKNOWN_LABEL_FRACTION);
        assert_eq!(resolved.weight, DEFAULT_LABEL_WEIGHT);
    }

    #[test]
    fn test_unknown_activity_fails() {
        let rubric = make_rubric();
        let normalizer = LabelNormalizer::new(&rubric);

        assert!(matches!(
            normalizer.fraction("sleep", Some("good")),
            Err(ScoringError::UnknownActivity(_))
        ));
    }
}
