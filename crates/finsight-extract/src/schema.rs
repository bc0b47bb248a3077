//! Typed schema for extracted analysis payloads.
//!
//! The model is asked for a JSON document matching this shape. Sections the
//! model omits (or mangles) are replaced with documented defaults instead of
//! surfacing as nulls downstream:
//!
//! | Section | Default |
//! |---|---|
//! | `document_info` | all-`None` |
//! | `summary` | zeroed figures, health score 50 |
//! | list sections | `[]` |
//! | `income_analysis`, `cash_flow_analysis`, `risk_assessment` | `{}` |
//! | `detailed_analysis` | `""` |

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use finsight_core::defaults::HEALTH_SCORE_DEFAULT;

/// Statement-level metadata the model reads off the document header.
/// Dates arrive as ISO-8601 strings and are parsed leniently downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentInfo {
    pub bank_name: Option<String>,
    pub account_type: Option<String>,
    /// Masked account number, last four digits only.
    pub account_number_masked: Option<String>,
    pub statement_period_start: Option<String>,
    pub statement_period_end: Option<String>,
    pub opening_balance: Option<f64>,
    pub closing_balance: Option<f64>,
}

/// Headline figures for the statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Summary {
    pub total_income: f64,
    pub total_expenses: f64,
    /// Recomputed as income − expenses when the model omits it.
    pub net_cash_flow: Option<f64>,
    pub transaction_count: i64,
    pub financial_health_score: f64,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            total_income: 0.0,
            total_expenses: 0.0,
            net_cash_flow: None,
            transaction_count: 0,
            financial_health_score: HEALTH_SCORE_DEFAULT,
        }
    }
}

impl Summary {
    /// Net cash flow, falling back to income − expenses.
    pub fn effective_net_cash_flow(&self) -> f64 {
        self.net_cash_flow
            .unwrap_or(self.total_income - self.total_expenses)
    }

    /// Health score clamped into [0, 100].
    pub fn clamped_health_score(&self) -> f64 {
        if !self.financial_health_score.is_finite() {
            return HEALTH_SCORE_DEFAULT;
        }
        self.financial_health_score.clamp(0.0, 100.0)
    }
}

/// Full validated extraction output for one statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionReport {
    pub document_info: DocumentInfo,
    pub summary: Summary,
    pub transaction_categories: Vec<JsonValue>,
    pub spending_patterns: Vec<JsonValue>,
    pub income_analysis: JsonValue,
    pub cash_flow_analysis: JsonValue,
    pub anomalies: Vec<JsonValue>,
    pub insights: Vec<JsonValue>,
    pub recommendations: Vec<JsonValue>,
    pub risk_assessment: JsonValue,
    pub detailed_analysis: String,
}

/// Keys that must deserialize as arrays; anything else is coerced to `[]`.
pub const LIST_KEYS: &[&str] = &[
    "transaction_categories",
    "spending_patterns",
    "anomalies",
    "insights",
    "recommendations",
];

/// Keys that must deserialize as objects; anything else is coerced to `{}`.
pub const OBJECT_KEYS: &[&str] = &[
    "document_info",
    "summary",
    "income_analysis",
    "cash_flow_analysis",
    "risk_assessment",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_default_is_zeroed_with_neutral_health() {
        let s = Summary::default();
        assert_eq!(s.total_income, 0.0);
        assert_eq!(s.total_expenses, 0.0);
        assert_eq!(s.transaction_count, 0);
        assert_eq!(s.financial_health_score, 50.0);
    }

    #[test]
    fn test_effective_net_cash_flow_prefers_explicit() {
        let s = Summary {
            total_income: 100.0,
            total_expenses: 40.0,
            net_cash_flow: Some(55.0),
            ..Default::default()
        };
        assert_eq!(s.effective_net_cash_flow(), 55.0);
    }

    #[test]
    fn test_effective_net_cash_flow_derives_when_missing() {
        let s = Summary {
            total_income: 5000.0,
            total_expenses: 3200.0,
            net_cash_flow: None,
            ..Default::default()
        };
        assert_eq!(s.effective_net_cash_flow(), 1800.0);
    }

    #[test]
    fn test_clamped_health_score() {
        let mut s = Summary {
            financial_health_score: 150.0,
            ..Default::default()
        };
        assert_eq!(s.clamped_health_score(), 100.0);
        s.financial_health_score = -3.0;
        assert_eq!(s.clamped_health_score(), 0.0);
        s.financial_health_score = 72.5;
        assert_eq!(s.clamped_health_score(), 72.5);
        s.financial_health_score = f64::NAN;
        assert_eq!(s.clamped_health_score(), 50.0);
    }

    #[test]
    fn test_report_deserializes_with_everything_missing() {
        let report: ExtractionReport = serde_json::from_str("{}").unwrap();
        assert_eq!(report, ExtractionReport::default());
        assert!(report.transaction_categories.is_empty());
        assert_eq!(report.summary.financial_health_score, 50.0);
    }
}
