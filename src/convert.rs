use std::{collections::HashMap, fmt};

use chrono::{Datelike, Local, NaiveDateTime};
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::patterns::{DateFormat, NumberFormat, format_number};
use crate::schema::ColumnType;

/// Every successfully converted date is rendered with this template.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Outcome of converting one cell. A failure leaves `value` as the raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertResult {
    pub ok: bool,
    pub value: String,
    pub changed: bool,
}

impl ConvertResult {
    fn blank() -> Self {
        Self {
            ok: true,
            value: String::new(),
            changed: false,
        }
    }

    fn unchanged(raw: &str) -> Self {
        Self {
            ok: true,
            value: raw.to_string(),
            changed: false,
        }
    }

    fn failed(raw: &str) -> Self {
        Self {
            ok: false,
            value: raw.to_string(),
            changed: false,
        }
    }

    fn converted(raw: &str, value: String) -> Self {
        let changed = value != raw;
        Self {
            ok: true,
            value,
            changed,
        }
    }
}

/// Typed value kept for consumers that need numbers or dates rather than text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParsedValue {
    Number(f64),
    Date(NaiveDateTime),
}

impl ParsedValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParsedValue::Number(value) => Some(*value),
            ParsedValue::Date(_) => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            ParsedValue::Date(value) => Some(*value),
            ParsedValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ParsedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedValue::Number(value) => f.write_str(&format_number(*value)),
            ParsedValue::Date(value) => write!(f, "{}", value.format(CANONICAL_DATE_FORMAT)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub result: ConvertResult,
    pub parsed: Option<ParsedValue>,
}

impl Conversion {
    fn without_value(result: ConvertResult) -> Self {
        Self {
            result,
            parsed: None,
        }
    }
}

/// Parsed values keyed by column index, then by zero-based data row.
#[derive(Debug, Clone, Default)]
pub struct ParsedValueCache {
    columns: HashMap<usize, HashMap<usize, ParsedValue>>,
}

impl ParsedValueCache {
    /// Stores `value` for the cell, or forgets the cell when `value` is `None`.
    pub fn record(&mut self, column: usize, row: usize, value: Option<ParsedValue>) {
        match value {
            Some(value) => {
                self.columns.entry(column).or_default().insert(row, value);
            }
            None => {
                if let Some(rows) = self.columns.get_mut(&column) {
                    rows.remove(&row);
                    if rows.is_empty() {
                        self.columns.remove(&column);
                    }
                }
            }
        }
    }

    pub fn get(&self, column: usize, row: usize) -> Option<&ParsedValue> {
        self.columns.get(&column).and_then(|rows| rows.get(&row))
    }

    pub fn clear_column(&mut self, column: usize) {
        self.columns.remove(&column);
    }

    pub fn column_len(&self, column: usize) -> usize {
        self.columns.get(&column).map(HashMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Converts raw cells under a declared type and format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueConverter {
    reference_year: i32,
}

impl Default for ValueConverter {
    fn default() -> Self {
        Self::new(Local::now().year())
    }
}

impl ValueConverter {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    pub fn convert(
        &self,
        column_type: ColumnType,
        raw: &str,
        number_format: Option<&NumberFormat>,
        date_format: Option<DateFormat>,
    ) -> ConvertResult {
        self.prepare(column_type, number_format, date_format)
            .convert(raw)
            .result
    }

    /// Builds a reusable converter for one column; the number pattern is compiled once.
    pub fn prepare(
        &self,
        column_type: ColumnType,
        number_format: Option<&NumberFormat>,
        date_format: Option<DateFormat>,
    ) -> PreparedConversion {
        let kind = match column_type {
            ColumnType::Text => ConversionKind::Text,
            ColumnType::Number => {
                let format = number_format.copied().unwrap_or_default();
                let pattern = match format.strict_pattern() {
                    Ok(pattern) => Some(pattern),
                    Err(err) => {
                        warn!("Number format {} is unusable: {err}", format.describe());
                        None
                    }
                };
                ConversionKind::Number { format, pattern }
            }
            ColumnType::Date => ConversionKind::Date {
                format: date_format.unwrap_or_default(),
                reference_year: self.reference_year,
            },
        };
        PreparedConversion { kind }
    }
}

#[derive(Debug, Clone)]
enum ConversionKind {
    Text,
    Number {
        format: NumberFormat,
        pattern: Option<Regex>,
    },
    Date {
        format: DateFormat,
        reference_year: i32,
    },
}

#[derive(Debug, Clone)]
pub struct PreparedConversion {
    kind: ConversionKind,
}

impl PreparedConversion {
    pub fn convert(&self, raw: &str) -> Conversion {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Conversion::without_value(ConvertResult::blank());
        }
        match &self.kind {
            ConversionKind::Text => Conversion::without_value(ConvertResult::unchanged(raw)),
            ConversionKind::Number { format, pattern } => {
                match pattern
                    .as_ref()
                    .and_then(|pattern| parse_number(trimmed, format, pattern))
                {
                    Some(number) => Conversion {
                        result: ConvertResult::converted(raw, format_number(number)),
                        parsed: Some(ParsedValue::Number(number)),
                    },
                    None => Conversion::without_value(ConvertResult::failed(raw)),
                }
            }
            ConversionKind::Date {
                format,
                reference_year,
            } => match format.parse(trimmed, *reference_year) {
                Some(parsed) => Conversion {
                    result: ConvertResult::converted(
                        raw,
                        parsed.format(CANONICAL_DATE_FORMAT).to_string(),
                    ),
                    parsed: Some(ParsedValue::Date(parsed)),
                },
                None => Conversion::without_value(ConvertResult::failed(raw)),
            },
        }
    }
}

fn parse_number(value: &str, format: &NumberFormat, pattern: &Regex) -> Option<f64> {
    if !pattern.is_match(value) {
        return None;
    }
    let mut normalized = match format.thousands_separator {
        Some(thousands) => value.replace(thousands, ""),
        None => value.to_string(),
    };
    if format.decimal_separator != '.' {
        normalized = normalized.replace(format.decimal_separator, ".");
    }
    normalized.parse::<f64>().ok().filter(|number| !number.is_nan())
}
