//! Diagnosis types.
//!
//! [`DiagnosisCandidate`] is one parsed inference reply. [`DiagnosisResult`]
//! is the reconciled verdict stored against a scan.

use serde::{Deserialize, Deserializer, Serialize};

/// One structured diagnosis parsed from a single inference reply.
///
/// Defaults for every optional field are applied here, at the parse boundary,
/// so downstream code never has to check for missing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisCandidate {
    /// Name of the diagnosed condition. Required and non-blank.
    #[serde(alias = "disease_name", alias = "conditionName")]
    pub condition_name: String,
    /// Model-reported confidence in `[0, 1]`.
    #[serde(default, deserialize_with = "deserialize_confidence")]
    pub confidence: f64,
    /// Observed symptoms.
    #[serde(default)]
    pub symptoms: String,
    /// Organic treatment advice.
    #[serde(default, alias = "organicTreatment")]
    pub organic_treatment: String,
    /// Chemical treatment advice.
    #[serde(default, alias = "chemicalTreatment")]
    pub chemical_treatment: String,
    /// Prevention advice.
    #[serde(default)]
    pub prevention: String,
    /// Follow-up actions.
    #[serde(default, alias = "nextSteps", deserialize_with = "deserialize_steps")]
    pub next_steps: Vec<String>,
}

impl DiagnosisCandidate {
    /// Creates a candidate with only a condition name.
    #[must_use]
    pub fn named(condition_name: impl Into<String>) -> Self {
        Self {
            condition_name: condition_name.into(),
            confidence: 0.0,
            symptoms: String::new(),
            organic_treatment: String::new(),
            chemical_treatment: String::new(),
            prevention: String::new(),
            next_steps: Vec::new(),
        }
    }

    /// Parses a candidate from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InferenceRunFailed`] if the text is not a JSON
    /// object of the expected shape or the condition name is blank.
    pub fn parse(json: &str) -> crate::Result<Self> {
        let candidate: Self =
            serde_json::from_str(json).map_err(|e| crate::Error::InferenceRunFailed {
                operation: "parse_diagnosis".to_string(),
                cause: e.to_string(),
            })?;

        if candidate.condition_name.trim().is_empty() {
            return Err(crate::Error::InferenceRunFailed {
                operation: "parse_diagnosis".to_string(),
                cause: "condition_name is blank".to_string(),
            });
        }

        Ok(candidate)
    }

    /// Lowercased, trimmed condition name used for voting.
    #[must_use]
    pub fn normalized_name(&self) -> String {
        self.condition_name.trim().to_lowercase()
    }
}

/// Accepts a number or numeric string, clamped to `[0, 1]`.
fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Null,
    }

    let value = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s.trim().trim_end_matches('%').parse::<f64>().unwrap_or(0.0),
        Raw::Null => 0.0,
    };

    // Some models answer in percent
    let value = if value > 1.0 { value / 100.0 } else { value };
    Ok(if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    })
}

/// Accepts either a list of steps or a single string.
fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        One(String),
        Null,
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::List(steps) => steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Raw::One(s) if s.trim().is_empty() => Vec::new(),
        Raw::One(s) => vec![s.trim().to_string()],
        Raw::Null => Vec::new(),
    })
}

/// The reconciled diagnosis for a scan.
///
/// Attached 1:1 to the scan that ran inference. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    /// Display form of the winning condition name.
    pub condition_name: String,
    /// Model-reported confidence of the candidate whose fields were kept.
    pub confidence: f64,
    /// Observed symptoms.
    pub symptoms: String,
    /// Organic treatment advice.
    pub organic_treatment: String,
    /// Chemical treatment advice.
    pub chemical_treatment: String,
    /// Prevention advice.
    pub prevention: String,
    /// Follow-up actions.
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// Fraction of surviving runs that agreed with the winner.
    pub consensus_confidence: f64,
    /// Number of surviving runs that agreed with the winner.
    pub consensus_count: usize,
    /// Number of runs that succeeded.
    pub total_runs: usize,
    /// Agreement fell below two thirds.
    pub needs_review: bool,
}

impl DiagnosisResult {
    /// Agreement below this fraction sets `needs_review`.
    pub const REVIEW_THRESHOLD: f64 = 2.0 / 3.0;

    /// Builds a result from the candidate whose fields are kept and the vote
    /// tally.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_vote(
        candidate: DiagnosisCandidate,
        display_name: String,
        consensus_count: usize,
        total_runs: usize,
    ) -> Self {
        let consensus_confidence = if total_runs == 0 {
            0.0
        } else {
            consensus_count as f64 / total_runs as f64
        };

        Self {
            condition_name: display_name,
            confidence: candidate.confidence,
            symptoms: candidate.symptoms,
            organic_treatment: candidate.organic_treatment,
            chemical_treatment: candidate.chemical_treatment,
            prevention: candidate.prevention,
            next_steps: candidate.next_steps,
            consensus_confidence,
            consensus_count,
            total_runs,
            needs_review: consensus_confidence < Self::REVIEW_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_full_reply() {
        let json = r#"{
            "condition_name": "Early Blight",
            "confidence": 0.92,
            "symptoms": "Concentric rings on lower leaves",
            "organic_treatment": "Copper spray",
            "chemical_treatment": "Chlorothalonil",
            "prevention": "Rotate crops",
            "next_steps": ["Remove infected leaves", "Monitor weekly"]
        }"#;

        let candidate = DiagnosisCandidate::parse(json).unwrap();
        assert_eq!(candidate.condition_name, "Early Blight");
        assert!((candidate.confidence - 0.92).abs() < f64::EPSILON);
        assert_eq!(candidate.next_steps.len(), 2);
    }

    #[test]
    fn test_parse_applies_defaults() {
        let candidate = DiagnosisCandidate::parse(r#"{"disease_name": "Rust"}"#).unwrap();
        assert_eq!(candidate.condition_name, "Rust");
        assert!(candidate.confidence.abs() < f64::EPSILON);
        assert!(candidate.symptoms.is_empty());
        assert!(candidate.next_steps.is_empty());
    }

    #[test_case(r#"{"condition_name": "x", "confidence": 1.7}"#, 0.017 ; "percent number")]
    #[test_case(r#"{"condition_name": "x", "confidence": -0.5}"#, 0.0 ; "negative")]
    #[test_case(r#"{"condition_name": "x", "confidence": "85%"}"#, 0.85 ; "percent string")]
    #[test_case(r#"{"condition_name": "x", "confidence": null}"#, 0.0 ; "null")]
    fn test_confidence_clamped(json: &str, expected: f64) {
        let candidate = DiagnosisCandidate::parse(json).unwrap();
        assert!((candidate.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_next_steps_as_string() {
        let candidate =
            DiagnosisCandidate::parse(r#"{"condition_name": "x", "next_steps": "Water less"}"#)
                .unwrap();
        assert_eq!(candidate.next_steps, vec!["Water less".to_string()]);
    }

    #[test_case("not json" ; "prose")]
    #[test_case(r#"{"confidence": 0.5}"# ; "missing name")]
    #[test_case(r#"{"condition_name": "   "}"# ; "blank name")]
    #[test_case("[1, 2, 3]" ; "array")]
    fn test_parse_failures(json: &str) {
        let err = DiagnosisCandidate::parse(json).unwrap_err();
        assert!(matches!(err, crate::Error::InferenceRunFailed { .. }));
    }

    #[test]
    fn test_normalized_name() {
        assert_eq!(
            DiagnosisCandidate::named("  Leaf Blight ").normalized_name(),
            "leaf blight"
        );
    }

    #[test_case(2, 3, false ; "two thirds is not flagged")]
    #[test_case(1, 2, true ; "half is flagged")]
    #[test_case(3, 3, false ; "unanimous")]
    #[test_case(1, 3, true ; "one third")]
    fn test_needs_review_boundary(count: usize, total: usize, flagged: bool) {
        let result =
            DiagnosisResult::from_vote(DiagnosisCandidate::named("x"), "x".into(), count, total);
        assert_eq!(result.needs_review, flagged);
    }
}
