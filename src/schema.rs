//! Column metadata, header detection, and schema persistence.
//!
//! This module owns [`DataHeader`] (the persisted per-column schema entry),
//! the [`ColumnType`] enum, and the [`Schema`] bundle written to disk after
//! detection: the headers plus the dataset-wide date and number formats.
//!
//! ## Responsibilities
//!
//! - YAML (default) or JSON schema loading and saving
//! - Header row detection heuristics and synthetic name assignment
//! - Header name de-duplication

use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

use crate::patterns::{DateFormat, NUMBER_PATTERNS, NumberFormat, NumberPatternSpec};

const COMMON_HEADER_TOKENS: &[&str] = &[
    "amount",
    "category",
    "city",
    "count",
    "country",
    "created",
    "date",
    "day",
    "description",
    "group",
    "id",
    "label",
    "month",
    "name",
    "percent",
    "price",
    "quarter",
    "region",
    "series",
    "status",
    "time",
    "total",
    "type",
    "updated",
    "value",
    "week",
    "year",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Number,
    Date,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Date => "date",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "string" => Ok(ColumnType::Text),
            "number" | "numeric" | "float" => Ok(ColumnType::Number),
            "date" | "datetime" => Ok(ColumnType::Date),
            other => Err(anyhow!("Unknown column type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataHeader {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<DateFormat>,
}

impl DataHeader {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Text,
            index,
            date_format: None,
        }
    }

    /// Sets the declared type; only date columns keep a `date_format`.
    pub fn set_type(&mut self, column_type: ColumnType, date_format: Option<DateFormat>) {
        self.column_type = column_type;
        self.date_format = match column_type {
            ColumnType::Date => date_format.or(self.date_format),
            ColumnType::Text | ColumnType::Number => None,
        };
    }
}

pub fn headers_from_names(names: &[String]) -> Vec<DataHeader> {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| DataHeader::new(name.clone(), idx))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub headers: Vec<DataHeader>,
    #[serde(default)]
    pub date_format: DateFormat,
    #[serde(default)]
    pub number_format: NumberFormat,
}

impl Schema {
    pub fn validate_headers(&self, names: &[String]) -> Result<()> {
        ensure!(
            names.len() == self.headers.len(),
            "Header length mismatch: schema expects {} column(s) but input contains {}",
            self.headers.len(),
            names.len()
        );
        for (idx, header) in self.headers.iter().enumerate() {
            let found = names.get(idx).map(|s| s.as_str()).unwrap_or_default();
            ensure!(
                header.name == found,
                "Header mismatch at position {}: expected '{}' but found '{}'",
                idx + 1,
                header.name,
                found
            );
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        if is_json_path(path) {
            serde_json::to_writer_pretty(file, self).context("Writing schema JSON")
        } else {
            serde_yaml::to_writer(file, self).context("Writing schema YAML")
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: Schema = if is_json_path(path) {
            serde_json::from_reader(reader).context("Parsing schema JSON")?
        } else {
            serde_yaml::from_reader(reader).context("Parsing schema YAML")?
        };
        for (idx, header) in schema.headers.iter().enumerate() {
            ensure!(
                header.index == idx,
                "Column '{}' declares index {} but appears at position {}",
                header.name,
                header.index,
                idx
            );
        }
        Ok(schema)
    }
}

fn is_json_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

pub fn generate_field_names(count: usize) -> Vec<String> {
    (0..count).map(|idx| format!("column_{}", idx + 1)).collect()
}

/// Names blank headers by position and suffixes repeats with ` (2)`, ` (3)`, ...
pub fn dedupe_header_names(names: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut result = Vec::with_capacity(names.len());
    for (idx, raw) in names.iter().enumerate() {
        let trimmed = raw.trim();
        let base = if trimmed.is_empty() {
            format!("column_{}", idx + 1)
        } else {
            trimmed.to_string()
        };
        let mut candidate = base.clone();
        while let Some(count) = seen.get_mut(&candidate) {
            *count += 1;
            candidate = format!("{base} ({count})");
        }
        seen.insert(candidate.clone(), 1);
        result.push(candidate);
    }
    result
}

fn token_is_common_header(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return false;
    }
    let sanitized = normalized
        .chars()
        .map(|ch| match ch {
            ' ' | '-' | '/' => '_',
            other => other,
        })
        .collect::<String>();
    COMMON_HEADER_TOKENS
        .iter()
        .any(|token| normalized == *token || sanitized == *token)
}

fn value_is_data_like(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lowered = trimmed.to_ascii_lowercase();
    if matches!(lowered.as_str(), "true" | "false" | "yes" | "no") {
        return true;
    }
    let numeric = (0..NUMBER_PATTERNS.len())
        .filter_map(NumberPatternSpec::shape_regex)
        .any(|shape| shape.is_match(trimmed));
    if numeric {
        return true;
    }
    DateFormat::all()
        .filter(|format| !format.needs_reference_year())
        .any(|format| format.validates(trimmed, 2000))
}

fn value_is_header_like(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() || value_is_data_like(trimmed) {
        return false;
    }
    trimmed.chars().any(|c| c.is_alphabetic()) || token_is_common_header(trimmed)
}

fn header_tokens_match_dictionary(row: &[String]) -> bool {
    row.iter()
        .filter(|value| token_is_common_header(value))
        .count()
        >= 2
}

/// Decides whether the first row names the columns rather than holding data.
pub fn detect_header_row(first_row: &[String], other_rows: &[Vec<String>]) -> bool {
    let header_like_first = first_row
        .iter()
        .filter(|value| value_is_header_like(value))
        .count();
    let data_like_first = first_row
        .iter()
        .filter(|value| value_is_data_like(value))
        .count();

    if header_like_first == 0 && data_like_first == 0 {
        return false;
    }
    if data_like_first > header_like_first {
        return false;
    }
    if other_rows.is_empty() {
        return header_like_first >= 2 || header_tokens_match_dictionary(first_row);
    }

    let mut header_signal = 0usize;
    let mut data_signal = 0usize;
    for (column, first_value) in first_row.iter().enumerate() {
        let other_has_data = other_rows
            .iter()
            .filter_map(|row| row.get(column))
            .any(|value| value_is_data_like(value));
        if !other_has_data {
            continue;
        }
        if value_is_header_like(first_value) {
            header_signal += 1;
        } else if value_is_data_like(first_value) {
            data_signal += 1;
        }
    }

    if header_signal != data_signal {
        return header_signal > data_signal;
    }
    if header_tokens_match_dictionary(first_row) && header_like_first >= 1 {
        return true;
    }
    // All-text tables have no data signal at all; a fully populated first row
    // of distinct labels is still the usual shape of a header.
    header_like_first == first_row.len() && header_like_first > data_like_first
}
