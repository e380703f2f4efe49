use std::fmt::Write as _;

use itertools::Itertools;

use crate::aggregate::DetectionResult;
use crate::apply::FormatApplication;
use crate::patterns::NumberFormat;
use crate::schema::{ColumnType, DataHeader};

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths.iter().map(|w| "-".repeat((*w).max(3))).collect_vec();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}

/// One line per column: name, applied type, the format used to read it, and confidence.
pub fn detection_rows(
    headers: &[DataHeader],
    result: &DetectionResult,
    number_format: &NumberFormat,
) -> Vec<Vec<String>> {
    headers
        .iter()
        .map(|header| {
            let format = match header.column_type {
                ColumnType::Date => header
                    .date_format
                    .map(|format| format.token().to_string())
                    .unwrap_or_default(),
                ColumnType::Number => number_format.describe(),
                ColumnType::Text => String::new(),
            };
            let confidence = result
                .confidence
                .columns
                .get(header.index)
                .copied()
                .unwrap_or(0.0);
            vec![
                header.name.clone(),
                header.column_type.to_string(),
                format,
                format!("{confidence:.2}"),
            ]
        })
        .collect()
}

pub fn render_detection(
    headers: &[DataHeader],
    result: &DetectionResult,
    application: FormatApplication,
    number_format: &NumberFormat,
) -> String {
    let columns = ["column", "type", "format", "confidence"].map(String::from);
    let mut output = render_table(&columns, &detection_rows(headers, result, number_format));
    let _ = writeln!(
        output,
        "\ndate format: {} (confidence {:.2}{})",
        result.date_format,
        result.confidence.date_format,
        if application.apply_date_format { "" } else { ", not applied" }
    );
    let _ = writeln!(
        output,
        "number format: {} (confidence {:.2}{})",
        result.number_format.describe(),
        result.confidence.number_format,
        if application.apply_number_format { "" } else { ", not applied" }
    );
    output
}

pub fn describe_invalid_cell(row_number: usize, column: &str, raw: &str) -> String {
    format!("row {row_number}, column '{column}': '{raw}'")
}
