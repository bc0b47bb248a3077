//! Response cleanup and schema normalization.
//!
//! Models wrap JSON in Markdown fences, emit scalars where arrays belong,
//! and drop whole sections. Everything here is deterministic repair with
//! documented defaults; anything that still fails to parse is a hard
//! extraction error, never a silently synthesized analysis.

use serde_json::{Map, Value as JsonValue};
use tracing::warn;

use finsight_core::{Error, Result};

use crate::schema::{ExtractionReport, LIST_KEYS, OBJECT_KEYS};

/// Strip a surrounding Markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Repair section types in place: list keys become `[]` unless they are
/// arrays, object keys become `{}` unless they are objects.
pub fn normalize_sections(payload: &mut JsonValue) {
    let Some(map) = payload.as_object_mut() else {
        return;
    };
    for key in LIST_KEYS {
        match map.get(*key) {
            Some(JsonValue::Array(_)) => {}
            Some(other) => {
                warn!(section = key, got = %type_name(other), "extract: coercing section to []");
                map.insert((*key).to_string(), JsonValue::Array(vec![]));
            }
            None => {
                map.insert((*key).to_string(), JsonValue::Array(vec![]));
            }
        }
    }
    for key in OBJECT_KEYS {
        match map.get(*key) {
            Some(JsonValue::Object(_)) => {}
            Some(other) => {
                warn!(section = key, got = %type_name(other), "extract: coercing section to {{}}");
                map.insert((*key).to_string(), JsonValue::Object(Map::new()));
            }
            None => {
                map.insert((*key).to_string(), JsonValue::Object(Map::new()));
            }
        }
    }
}

fn type_name(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Parse a raw model response into a validated [`ExtractionReport`].
///
/// Fails hard on non-JSON output or a non-object top level; never invents
/// analysis content beyond the documented section defaults.
pub fn parse_report(raw: &str) -> Result<ExtractionReport> {
    let stripped = strip_code_fences(raw);
    let mut payload: JsonValue = serde_json::from_str(stripped).map_err(|e| {
        let excerpt: String = stripped.chars().take(120).collect();
        Error::Extraction(format!("model returned unparseable JSON ({e}): {excerpt}"))
    })?;

    if !payload.is_object() {
        return Err(Error::Validation(format!(
            "expected a JSON object at top level, got {}",
            type_name(&payload)
        )));
    }

    normalize_sections(&mut payload);

    let mut report: ExtractionReport = serde_json::from_value(payload)
        .map_err(|e| Error::Validation(format!("payload failed schema validation: {e}")))?;

    report.summary.financial_health_score = report.summary.clamped_health_score();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_json_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_bare_fence() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_no_fence_passthrough() {
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_report_happy_path() {
        let raw = json!({
            "summary": {
                "total_income": 5000.0,
                "total_expenses": 3200.0,
                "transaction_count": 42,
                "financial_health_score": 71.0
            },
            "insights": [{"title": "steady income"}],
            "detailed_analysis": "Looks healthy."
        })
        .to_string();
        let report = parse_report(&raw).unwrap();
        assert_eq!(report.summary.total_income, 5000.0);
        assert_eq!(report.summary.effective_net_cash_flow(), 1800.0);
        assert_eq!(report.insights.len(), 1);
        assert_eq!(report.detailed_analysis, "Looks healthy.");
    }

    #[test]
    fn test_parse_report_clamps_health_score() {
        let raw = json!({"summary": {"financial_health_score": 250.0}}).to_string();
        let report = parse_report(&raw).unwrap();
        assert_eq!(report.summary.financial_health_score, 100.0);
    }

    #[test]
    fn test_parse_report_coerces_scalar_list_sections() {
        let raw = json!({
            "insights": "no insights available",
            "anomalies": 7,
            "recommendations": null
        })
        .to_string();
        let report = parse_report(&raw).unwrap();
        assert!(report.insights.is_empty());
        assert!(report.anomalies.is_empty());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_parse_report_coerces_scalar_object_sections() {
        let raw = json!({"summary": "n/a", "risk_assessment": ["high"]}).to_string();
        let report = parse_report(&raw).unwrap();
        // Coerced summary falls back to the documented defaults.
        assert_eq!(report.summary.total_income, 0.0);
        assert_eq!(report.summary.financial_health_score, 50.0);
        assert_eq!(report.risk_assessment, json!({}));
    }

    #[test]
    fn test_parse_report_fenced_payload() {
        let raw = "```json\n{\"summary\": {\"total_income\": 10.0}}\n```";
        let report = parse_report(raw).unwrap();
        assert_eq!(report.summary.total_income, 10.0);
    }

    #[test]
    fn test_parse_report_rejects_non_json() {
        let err = parse_report("I could not read this document.").unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn test_parse_report_rejects_non_object_top_level() {
        let err = parse_report("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_missing_sections_get_defaults() {
        let report = parse_report("{}").unwrap();
        assert_eq!(report.income_analysis, json!({}));
        assert_eq!(report.cash_flow_analysis, json!({}));
        assert!(report.transaction_categories.is_empty());
    }
}
