//! Analysis export rendering.
//!
//! Every format is rendered in-process and returned synchronously:
//! JSON and CSV are full-fidelity; Excel is a SpreadsheetML 2003 workbook;
//! PDF is a minimal single-page text report; PNG is a bar chart of the
//! headline figures.

use std::io::Cursor;

use image::{DynamicImage, Rgb, RgbImage};
use serde_json::{json, Value as JsonValue};

use finsight_core::{Analysis, Error, Result};

/// Requested export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Excel,
    Pdf,
    Png,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Excel => "application/vnd.ms-excel",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xls",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Png => "png",
        }
    }
}

/// Render an analysis in the requested format.
pub fn render(analysis: &Analysis, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => render_json(analysis),
        ExportFormat::Csv => render_csv(analysis),
        ExportFormat::Excel => Ok(render_excel(analysis)),
        ExportFormat::Pdf => Ok(render_pdf(analysis)),
        ExportFormat::Png => render_png(analysis),
    }
}

/// Summary rows shared by the tabular formats.
fn summary_rows(analysis: &Analysis) -> Vec<(String, String)> {
    let mut rows = vec![
        ("analysis_id".into(), analysis.id.to_string()),
        ("statement_id".into(), analysis.statement_id.to_string()),
        ("analysis_type".into(), analysis.analysis_type.clone()),
        ("model_version".into(), analysis.model_version.clone()),
        ("created_at".into(), analysis.created_at.to_rfc3339()),
        ("total_income".into(), format!("{:.2}", analysis.total_income)),
        (
            "total_expenses".into(),
            format!("{:.2}", analysis.total_expenses),
        ),
        (
            "net_cash_flow".into(),
            format!("{:.2}", analysis.net_cash_flow),
        ),
        (
            "savings_rate".into(),
            format!("{:.2}", analysis.savings_rate()),
        ),
        (
            "expense_ratio".into(),
            format!("{:.2}", analysis.expense_ratio()),
        ),
        (
            "financial_health_score".into(),
            format!("{:.1}", analysis.financial_health_score),
        ),
    ];
    if let Some(opening) = analysis.opening_balance {
        rows.push(("opening_balance".into(), format!("{opening:.2}")));
    }
    if let Some(closing) = analysis.closing_balance {
        rows.push(("closing_balance".into(), format!("{closing:.2}")));
    }
    rows
}

/// Flatten a JSON list section into display strings.
fn section_items(section: &JsonValue) -> Vec<String> {
    section
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn render_json(analysis: &Analysis) -> Result<Vec<u8>> {
    let doc = json!({
        "analysis": analysis,
        "derived": {
            "savings_rate": analysis.savings_rate(),
            "expense_ratio": analysis.expense_ratio(),
        },
    });
    serde_json::to_vec_pretty(&doc).map_err(Error::from)
}

fn render_csv(analysis: &Analysis) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["field", "value"])
        .map_err(|e| Error::Serialization(e.to_string()))?;
    for (field, value) in summary_rows(analysis) {
        writer
            .write_record([field.as_str(), value.as_str()])
            .map_err(|e| Error::Serialization(e.to_string()))?;
    }
    for (section, values) in [
        ("insight", &analysis.insights),
        ("recommendation", &analysis.recommendations),
        ("anomaly", &analysis.anomalies),
    ] {
        for item in section_items(values) {
            writer
                .write_record([section, item.as_str()])
                .map_err(|e| Error::Serialization(e.to_string()))?;
        }
    }
    writer
        .into_inner()
        .map_err(|e| Error::Serialization(e.to_string()))
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// SpreadsheetML 2003 workbook: a single worksheet, openable by Excel and
/// LibreOffice without any spreadsheet dependency on our side.
fn render_excel(analysis: &Analysis) -> Vec<u8> {
    let mut rows = String::new();
    for (field, value) in summary_rows(analysis) {
        rows.push_str(&format!(
            "   <Row><Cell><Data ss:Type=\"String\">{}</Data></Cell>\
             <Cell><Data ss:Type=\"String\">{}</Data></Cell></Row>\n",
            xml_escape(&field),
            xml_escape(&value)
        ));
    }
    for item in section_items(&analysis.insights) {
        rows.push_str(&format!(
            "   <Row><Cell><Data ss:Type=\"String\">insight</Data></Cell>\
             <Cell><Data ss:Type=\"String\">{}</Data></Cell></Row>\n",
            xml_escape(&item)
        ));
    }

    format!(
        "<?xml version=\"1.0\"?>\n\
         <Workbook xmlns=\"urn:schemas-microsoft-com:office:spreadsheet\"\n\
          xmlns:ss=\"urn:schemas-microsoft-com:office:spreadsheet\">\n\
          <Worksheet ss:Name=\"Analysis\">\n  <Table>\n{rows}  </Table>\n \
         </Worksheet>\n</Workbook>\n"
    )
    .into_bytes()
}

/// Escape a string for a PDF literal string.
fn pdf_escape(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii() && !c.is_control())
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            c => c.to_string(),
        })
        .collect()
}

/// Minimal single-page PDF: Helvetica text lines, no compression.
fn render_pdf(analysis: &Analysis) -> Vec<u8> {
    let mut lines = vec!["Statement Analysis Report".to_string(), String::new()];
    for (field, value) in summary_rows(analysis) {
        lines.push(format!("{field}: {value}"));
    }
    let insights = section_items(&analysis.insights);
    if !insights.is_empty() {
        lines.push(String::new());
        lines.push("Insights".to_string());
        for item in insights.iter().take(10) {
            lines.push(format!("- {item}"));
        }
    }

    let mut content = String::from("BT /F1 12 Tf 72 740 Td 16 TL\n");
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            content.push_str("T*\n");
        }
        content.push_str(&format!("({}) Tj\n", pdf_escape(line)));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
    ];

    let mut out: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    out
}

const PNG_WIDTH: u32 = 480;
const PNG_HEIGHT: u32 = 320;

/// Bar chart of income, expenses, and net cash flow.
fn render_png(analysis: &Analysis) -> Result<Vec<u8>> {
    let bars: [(f64, Rgb<u8>); 3] = [
        (analysis.total_income, Rgb([46, 160, 67])),
        (analysis.total_expenses, Rgb([207, 34, 46])),
        (analysis.net_cash_flow, Rgb([9, 105, 218])),
    ];
    let scale = bars
        .iter()
        .map(|(v, _)| v.abs())
        .fold(1.0_f64, f64::max);

    let mut chart = RgbImage::from_pixel(PNG_WIDTH, PNG_HEIGHT, Rgb([255, 255, 255]));
    let baseline = PNG_HEIGHT / 2;
    let chart_half = f64::from(PNG_HEIGHT / 2 - 20);

    // Baseline axis.
    for x in 20..PNG_WIDTH - 20 {
        chart.put_pixel(x, baseline, Rgb([160, 160, 160]));
    }

    let bar_width = 90;
    for (i, (value, color)) in bars.iter().enumerate() {
        let height = ((value.abs() / scale) * chart_half).round() as u32;
        let x0 = 60 + i as u32 * (bar_width + 60);
        for x in x0..x0 + bar_width {
            for dy in 0..height {
                let y = if *value >= 0.0 {
                    baseline.saturating_sub(dy + 1)
                } else {
                    (baseline + dy + 1).min(PNG_HEIGHT - 1)
                };
                chart.put_pixel(x, y, *color);
            }
        }
    }

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(chart)
        .write_to(&mut buffer, image::ImageOutputFormat::Png)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::GenericImageView;
    use uuid::Uuid;

    fn analysis() -> Analysis {
        Analysis {
            id: Uuid::now_v7(),
            user_id: Uuid::new_v4(),
            statement_id: Uuid::now_v7(),
            analysis_type: "comprehensive".into(),
            model_version: "gemini-pro-v1".into(),
            processing_time_seconds: 12.5,
            total_income: 5000.0,
            total_expenses: 3200.0,
            net_cash_flow: 1800.0,
            opening_balance: Some(1000.0),
            closing_balance: Some(2800.0),
            financial_health_score: 72.5,
            transaction_categories: serde_json::json!([{"category": "Groceries", "amount": 640.0}]),
            spending_patterns: serde_json::json!([]),
            income_analysis: serde_json::json!({}),
            anomalies: serde_json::json!([]),
            insights: serde_json::json!(["Savings rate is strong", "Dining (spend) up 20%"]),
            recommendations: serde_json::json!(["Increase emergency fund"]),
            risk_assessment: serde_json::json!({}),
            cash_flow_data: serde_json::json!({}),
            document_info: serde_json::json!({}),
            summary_text: Some("Strong month.".into()),
            detailed_analysis: Some("Strong month with healthy savings.".into()),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_json_includes_derived_rates() {
        let bytes = render(&analysis(), ExportFormat::Json).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["derived"]["savings_rate"], 36.0);
        assert_eq!(doc["derived"]["expense_ratio"], 64.0);
        assert_eq!(doc["analysis"]["total_income"], 5000.0);
    }

    #[test]
    fn test_csv_has_summary_and_sections() {
        let bytes = render(&analysis(), ExportFormat::Csv).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("field,value\n"));
        assert!(text.contains("net_cash_flow,1800.00"));
        assert!(text.contains("insight,Savings rate is strong"));
        assert!(text.contains("recommendation,Increase emergency fund"));
    }

    #[test]
    fn test_excel_is_well_formed_spreadsheetml() {
        let bytes = render(&analysis(), ExportFormat::Excel).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\"?>"));
        assert!(text.contains("urn:schemas-microsoft-com:office:spreadsheet"));
        assert!(text.contains("financial_health_score"));
        // Ampersands and angle brackets must be escaped.
        assert!(text.contains("Dining (spend) up 20%"));
        assert!(!text.contains("<Data ss:Type=\"String\"><"));
    }

    #[test]
    fn test_pdf_structure() {
        let bytes = render(&analysis(), ExportFormat::Pdf).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(bytes.ends_with(b"%%EOF\n"));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/BaseFont /Helvetica"));
        assert!(text.contains("startxref"));
        // Parenthesised text must be escaped inside literal strings.
        assert!(text.contains("Dining \\(spend\\) up 20%"));
    }

    #[test]
    fn test_png_decodes_to_expected_dimensions() {
        let bytes = render(&analysis(), ExportFormat::Png).unwrap();
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), PNG_WIDTH);
        assert_eq!(decoded.height(), PNG_HEIGHT);
    }

    #[test]
    fn test_png_handles_zero_figures() {
        let mut a = analysis();
        a.total_income = 0.0;
        a.total_expenses = 0.0;
        a.net_cash_flow = 0.0;
        // Must not divide by zero or panic.
        assert!(!render(&a, ExportFormat::Png).unwrap().is_empty());
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(ExportFormat::Csv.content_type(), "text/csv");
        assert_eq!(ExportFormat::Excel.extension(), "xls");
        let f: ExportFormat = serde_json::from_str("\"png\"").unwrap();
        assert_eq!(f, ExportFormat::Png);
    }
}
