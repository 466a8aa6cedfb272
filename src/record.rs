//! Canonical description record and result normalization.
//!
//! The normalizer is the boundary that guarantees callers always receive a
//! well-typed record once recovery has produced a JSON value: every field is
//! independently defaulted or coerced, and this stage never fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timing breakdown for one description request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    /// Wall-clock duration of the provider generation call, in milliseconds.
    pub generation_ms: u64,
    /// Wall-clock duration of recovery + normalization, in milliseconds.
    pub parse_ms: u64,
    /// The max-output-token budget the request was issued with.
    pub max_output_tokens: u32,
}

/// Canonical output of the description pipeline.
///
/// Serialized field names follow the mobile client's contract (camelCase),
/// while the keys recovered from model output are snake_case per the prompt
/// schema — the two never mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionRecord {
    /// Short description, 2-3 sentences.
    pub summary: String,
    /// Long-form description, 6-10 sentences.
    pub detailed: String,
    /// Ordered points of interest; never absent, may be empty.
    pub points_of_interest: Vec<String>,
    /// Model-reported uncertainties; empty when the model is confident.
    pub uncertainties: Vec<String>,
    /// Confidence in [0,1]; absent when the source value was unparseable —
    /// callers can distinguish "low confidence" from "unknown confidence".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Verbatim provider output, retained for diagnostics.
    pub raw_text: String,
    /// The model actually used, after any resolution fallback.
    pub model_used: String,
    pub timing: Timing,
}

/// The schema fields recovered from a parsed model response, before the
/// request-level metadata (raw text, model, timing) is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFields {
    pub summary: String,
    pub detailed: String,
    pub points_of_interest: Vec<String>,
    pub uncertainties: Vec<String>,
    pub confidence: Option<f64>,
}

/// Coerce a recovered JSON value into the canonical schema fields.
///
/// Missing or wrong-typed strings become empty; absent or non-array lists
/// become empty with every element stringified; confidence accepts numbers
/// and numeric strings and is clamped to [0,1], or omitted when not coercible
/// to a finite number.
pub fn normalize(value: &Value) -> NormalizedFields {
    NormalizedFields {
        summary: string_field(value, "summary"),
        detailed: string_field(value, "detailed"),
        points_of_interest: string_list_field(value, "points_of_interest"),
        uncertainties: string_list_field(value, "uncertainties"),
        confidence: confidence_field(value.get("confidence")),
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_list_field(value: &Value, key: &str) -> Vec<String> {
    match value.get(key).and_then(Value::as_array) {
        Some(items) => items.iter().map(stringify_element).collect(),
        None => Vec::new(),
    }
}

/// Stringify an arbitrary array element the way the mobile contract expects:
/// strings pass through, everything else renders as its JSON text.
fn stringify_element(element: &Value) -> String {
    match element {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn confidence_field(raw: Option<&Value>) -> Option<f64> {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_happy_path() {
        let value = json!({
            "summary": "Una sala",
            "detailed": "Una sala amplia con dos ventanas.",
            "points_of_interest": ["mesa", "silla"],
            "uncertainties": [],
            "confidence": 0.8
        });
        let fields = normalize(&value);
        assert_eq!(fields.summary, "Una sala");
        assert_eq!(fields.detailed, "Una sala amplia con dos ventanas.");
        assert_eq!(fields.points_of_interest, vec!["mesa", "silla"]);
        assert!(fields.uncertainties.is_empty());
        assert_eq!(fields.confidence, Some(0.8));
    }

    #[test]
    fn test_missing_strings_default_to_empty() {
        let fields = normalize(&json!({}));
        assert_eq!(fields.summary, "");
        assert_eq!(fields.detailed, "");
    }

    #[test]
    fn test_wrong_typed_summary_defaults_to_empty() {
        let fields = normalize(&json!({"summary": 42, "detailed": ["x"]}));
        assert_eq!(fields.summary, "");
        assert_eq!(fields.detailed, "");
    }

    #[test]
    fn test_array_coercion_stringifies_elements() {
        let fields = normalize(&json!({"points_of_interest": [1, "x", true]}));
        assert_eq!(fields.points_of_interest, vec!["1", "x", "true"]);
    }

    #[test]
    fn test_absent_or_null_arrays_become_empty() {
        let absent = normalize(&json!({}));
        assert!(absent.points_of_interest.is_empty());
        assert!(absent.uncertainties.is_empty());

        let null = normalize(&json!({"points_of_interest": null, "uncertainties": "nope"}));
        assert!(null.points_of_interest.is_empty());
        assert!(null.uncertainties.is_empty());
    }

    #[test]
    fn test_confidence_clamped_to_unit_interval() {
        assert_eq!(
            normalize(&json!({"confidence": -5})).confidence,
            Some(0.0)
        );
        assert_eq!(
            normalize(&json!({"confidence": 0.5})).confidence,
            Some(0.5)
        );
        assert_eq!(normalize(&json!({"confidence": 5})).confidence, Some(1.0));
    }

    #[test]
    fn test_numeric_string_confidence_accepted() {
        assert_eq!(
            normalize(&json!({"confidence": "0.75"})).confidence,
            Some(0.75)
        );
    }

    #[test]
    fn test_non_numeric_confidence_is_absent_not_zero() {
        assert_eq!(normalize(&json!({"confidence": "unknown"})).confidence, None);
        assert_eq!(normalize(&json!({"confidence": null})).confidence, None);
        assert_eq!(normalize(&json!({})).confidence, None);
    }

    #[test]
    fn test_non_finite_confidence_is_absent() {
        assert_eq!(normalize(&json!({"confidence": "NaN"})).confidence, None);
        assert_eq!(normalize(&json!({"confidence": "inf"})).confidence, None);
    }

    #[test]
    fn test_normalize_never_fails_on_non_object() {
        // Recovery can yield any valid JSON value; the normalizer still
        // produces a well-typed (empty) result.
        let fields = normalize(&json!([1, 2, 3]));
        assert_eq!(fields.summary, "");
        assert!(fields.points_of_interest.is_empty());
        assert_eq!(fields.confidence, None);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = DescriptionRecord {
            summary: "s".into(),
            detailed: "d".into(),
            points_of_interest: vec!["p".into()],
            uncertainties: vec![],
            confidence: Some(0.9),
            raw_text: "{}".into(),
            model_used: "gemini-1.5-flash".into(),
            timing: Timing {
                generation_ms: 1200,
                parse_ms: 3,
                max_output_tokens: 1100,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("pointsOfInterest").is_some());
        assert!(json.get("rawText").is_some());
        assert!(json.get("modelUsed").is_some());
        assert_eq!(json["timing"]["generationMs"], 1200);
        assert_eq!(json["timing"]["maxOutputTokens"], 1100);
    }

    #[test]
    fn test_absent_confidence_omitted_from_serialization() {
        let record = DescriptionRecord {
            summary: String::new(),
            detailed: String::new(),
            points_of_interest: vec![],
            uncertainties: vec![],
            confidence: None,
            raw_text: String::new(),
            model_used: "m".into(),
            timing: Timing {
                generation_ms: 0,
                parse_ms: 0,
                max_output_tokens: 700,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("confidence").is_none());
    }
}
