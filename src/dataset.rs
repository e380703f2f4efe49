//! Editing-session state: raw data, headers, validation errors, parsed values.
//!
//! A [`Dataset`] owns everything derived from a loaded table and keeps it in
//! step whenever the user changes a column type or a dataset-wide format.
//! Raw cells are never rewritten; conversion results flow only into the
//! [`ParsedValueCache`] and the [`ValidationErrorMap`].

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};
use log::{debug, info};

use crate::aggregate::DetectionResult;
use crate::apply::{FormatApplication, apply_detected_formats};
use crate::convert::{ParsedValue, ParsedValueCache, ValueConverter};
use crate::patterns::{DateFormat, NumberFormat};
use crate::schema::{ColumnType, DataHeader, Schema, headers_from_names};

/// Invalid cells keyed by 1-based row number. Rows with no invalid column are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrorMap {
    rows: BTreeMap<usize, BTreeSet<usize>>,
}

impl ValidationErrorMap {
    pub fn insert(&mut self, row_number: usize, column: usize) {
        self.rows.entry(row_number).or_default().insert(column);
    }

    /// Drops `column` from every row, removing rows left empty.
    pub fn clear_column(&mut self, column: usize) {
        self.rows.retain(|_, columns| {
            columns.remove(&column);
            !columns.is_empty()
        });
    }

    pub fn contains(&self, row_number: usize, column: usize) -> bool {
        self.rows
            .get(&row_number)
            .is_some_and(|columns| columns.contains(&column))
    }

    pub fn columns_for_row(&self, row_number: usize) -> Option<&BTreeSet<usize>> {
        self.rows.get(&row_number)
    }

    /// Every `(row_number, column)` pair, ordered by row then column.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows
            .iter()
            .flat_map(|(row, columns)| columns.iter().map(move |column| (*row, *column)))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell_count(&self) -> usize {
        self.rows.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevalidationSummary {
    pub column: usize,
    pub column_type: ColumnType,
    /// 1-based row numbers that failed conversion.
    pub failed_rows: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    headers: Vec<DataHeader>,
    data: Vec<Vec<String>>,
    number_format: NumberFormat,
    date_format: DateFormat,
    errors: ValidationErrorMap,
    parsed: ParsedValueCache,
    converter: ValueConverter,
}

impl Dataset {
    /// `data` holds data rows only; row `i` is reported as row number `i + 1`.
    pub fn new(headers: Vec<DataHeader>, data: Vec<Vec<String>>, converter: ValueConverter) -> Self {
        Self {
            headers,
            data,
            number_format: NumberFormat::default(),
            date_format: DateFormat::default(),
            errors: ValidationErrorMap::default(),
            parsed: ParsedValueCache::default(),
            converter,
        }
    }

    /// Fresh session over `names`, every column text until detection is applied.
    pub fn from_rows(names: &[String], data: Vec<Vec<String>>, reference_year: i32) -> Self {
        Self::new(headers_from_names(names), data, ValueConverter::new(reference_year))
    }

    /// Restores a session from a saved schema and revalidates every typed column.
    pub fn from_schema(schema: &Schema, data: Vec<Vec<String>>, converter: ValueConverter) -> Result<Self> {
        let mut dataset = Self::new(schema.headers.clone(), data, converter);
        dataset.number_format = schema.number_format;
        dataset.date_format = schema.date_format;
        dataset.revalidate_all_columns()?;
        Ok(dataset)
    }

    pub fn headers(&self) -> &[DataHeader] {
        &self.headers
    }

    pub fn data(&self) -> &[Vec<String>] {
        &self.data
    }

    pub fn number_format(&self) -> NumberFormat {
        self.number_format
    }

    pub fn date_format(&self) -> DateFormat {
        self.date_format
    }

    pub fn errors(&self) -> &ValidationErrorMap {
        &self.errors
    }

    /// Invalid `(row_number, column)` pairs in row then column order.
    pub fn invalid_cells(&self) -> Vec<(usize, usize)> {
        self.errors.cells().collect()
    }

    pub fn parsed_values(&self) -> &ParsedValueCache {
        &self.parsed
    }

    /// Typed value for a zero-based data row, if the cell converted.
    pub fn typed_value(&self, row: usize, column: usize) -> Option<&ParsedValue> {
        self.parsed.get(column, row)
    }

    pub fn raw_value(&self, row: usize, column: usize) -> Option<&str> {
        self.data.get(row)?.get(column).map(String::as_str)
    }

    pub fn schema(&self) -> Schema {
        Schema {
            headers: self.headers.clone(),
            date_format: self.date_format,
            number_format: self.number_format,
        }
    }

    /// Stamps detected types, adopts confident dataset formats, then validates.
    pub fn apply_detection(&mut self, result: &DetectionResult) -> Result<FormatApplication> {
        let application = apply_detected_formats(&mut self.headers, result);
        self.date_format = if application.apply_date_format {
            result.date_format
        } else {
            DateFormat::default()
        };
        self.number_format = if application.apply_number_format {
            result.number_format
        } else {
            NumberFormat::default()
        };
        info!(
            "Dataset formats: date {} ({}), number {} ({})",
            self.date_format,
            if application.apply_date_format { "detected" } else { "default" },
            self.number_format.describe(),
            if application.apply_number_format { "detected" } else { "default" },
        );
        self.revalidate_all_columns()?;
        Ok(application)
    }

    /// Re-checks `column` under `column_type` and rebuilds its error entries.
    ///
    /// The number format falls back to the dataset's; the date format falls
    /// back to the column's stored format, then the dataset's.
    pub fn revalidate_column(
        &mut self,
        column: usize,
        column_type: ColumnType,
        number_format: Option<&NumberFormat>,
        date_format: Option<DateFormat>,
    ) -> Result<RevalidationSummary> {
        let Some(header) = self.headers.get(column) else {
            bail!(
                "Column index {column} is out of range for {} column(s)",
                self.headers.len()
            );
        };
        let number_format = number_format.copied().unwrap_or(self.number_format);
        let date_format = date_format
            .or(header.date_format)
            .unwrap_or(self.date_format);

        let conversion = self.converter.prepare(
            column_type,
            Some(&number_format),
            Some(date_format),
        );
        let mut failed_rows = Vec::new();
        for (row, cells) in self.data.iter().enumerate() {
            let raw = cells.get(column).map(String::as_str).unwrap_or_default();
            let outcome = conversion.convert(raw);
            if !outcome.result.ok {
                failed_rows.push(row + 1);
            }
            if column_type != ColumnType::Text {
                self.parsed.record(column, row, outcome.parsed);
            }
        }

        self.errors.clear_column(column);
        for row_number in &failed_rows {
            self.errors.insert(*row_number, column);
        }

        if column_type == ColumnType::Text {
            self.parsed.clear_column(column);
        }
        let header = &mut self.headers[column];
        header.set_type(column_type, Some(date_format));

        debug!(
            "Revalidated column '{}' as {column_type}: {} invalid of {} row(s)",
            header.name,
            failed_rows.len(),
            self.data.len()
        );
        Ok(RevalidationSummary {
            column,
            column_type,
            failed_rows,
        })
    }

    /// Re-runs [`Dataset::revalidate_column`] on every column currently declared as `column_type`.
    pub fn revalidate_columns_of_type(
        &mut self,
        column_type: ColumnType,
        number_format: Option<&NumberFormat>,
        date_format: Option<DateFormat>,
    ) -> Result<Vec<RevalidationSummary>> {
        let columns: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, header)| header.column_type == column_type)
            .map(|(idx, _)| idx)
            .collect();
        columns
            .into_iter()
            .map(|column| self.revalidate_column(column, column_type, number_format, date_format))
            .collect()
    }

    /// User-initiated type change, using the dataset-wide formats.
    pub fn set_column_type(&mut self, column: usize, column_type: ColumnType) -> Result<RevalidationSummary> {
        self.revalidate_column(column, column_type, None, None)
    }

    /// Changes the dataset number format and re-checks every number column.
    pub fn set_number_format(&mut self, format: NumberFormat) -> Result<Vec<RevalidationSummary>> {
        self.number_format = format;
        self.revalidate_columns_of_type(ColumnType::Number, Some(&format), None)
    }

    /// Changes the dataset date format and re-checks every date column under it.
    pub fn set_date_format(&mut self, format: DateFormat) -> Result<Vec<RevalidationSummary>> {
        self.date_format = format;
        self.revalidate_columns_of_type(ColumnType::Date, None, Some(format))
    }

    /// Rebuilds every column's errors and cached values under its declared type,
    /// text columns included.
    fn revalidate_all_columns(&mut self) -> Result<()> {
        for column in 0..self.headers.len() {
            let header = &self.headers[column];
            let column_type = header.column_type;
            let date_format = header.date_format;
            self.revalidate_column(column, column_type, None, date_format)?;
        }
        info!(
            "Validation found {} invalid cell(s) across {} row(s)",
            self.errors.cell_count(),
            self.errors.row_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::FormatConfidence;

    fn dataset(names: &[&str], rows: &[&[&str]]) -> Dataset {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let data = rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        Dataset::from_rows(&names, data, 2024)
    }

    #[test]
    fn error_map_drops_rows_that_become_empty() {
        let mut errors = ValidationErrorMap::default();
        errors.insert(1, 0);
        errors.insert(1, 2);
        errors.insert(3, 0);
        errors.clear_column(0);
        assert!(errors.contains(1, 2));
        assert!(errors.columns_for_row(3).is_none());
        assert_eq!(errors.cells().collect::<Vec<_>>(), vec![(1, 2)]);
    }

    #[test]
    fn revalidation_flags_exactly_the_failing_rows() {
        let mut ds = dataset(&["amount"], &[&["1,000"], &["abc"], &[""], &["2.5"], &["x"]]);
        let summary = ds
            .revalidate_column(0, ColumnType::Number, None, None)
            .expect("revalidate");
        assert_eq!(summary.failed_rows, vec![2, 5]);
        assert_eq!(ds.invalid_cells(), vec![(2, 0), (5, 0)]);
        assert!(ds.errors().contains(2, 0));
        assert!(!ds.errors().contains(1, 0));
        assert_eq!(ds.typed_value(0, 0), Some(&ParsedValue::Number(1000.0)));
        assert_eq!(ds.typed_value(1, 0), None);
        assert_eq!(ds.raw_value(1, 0), Some("abc"));
        assert_eq!(ds.headers()[0].column_type, ColumnType::Number);
    }

    #[test]
    fn revalidation_replaces_stale_entries() {
        let mut ds = dataset(&["a", "b"], &[&["1.5", "x"], &["1,5", "y"]]);
        ds.revalidate_column(1, ColumnType::Number, None, None).unwrap();
        let european = NumberFormat::new(Some('.'), ',');
        ds.revalidate_column(0, ColumnType::Number, Some(&european), None)
            .unwrap();
        assert!(ds.errors().contains(1, 0));
        assert!(!ds.errors().contains(2, 0));

        ds.revalidate_column(0, ColumnType::Number, None, None).unwrap();
        assert!(!ds.errors().contains(1, 0));
        assert!(ds.errors().contains(2, 0));
        // Column b's entries survive column a's rebuild.
        assert!(ds.errors().contains(1, 1));
        assert!(ds.errors().contains(2, 1));
    }

    #[test]
    fn switching_to_text_clears_errors_and_cache() {
        let mut ds = dataset(&["v"], &[&["1"], &["oops"]]);
        ds.set_column_type(0, ColumnType::Number).unwrap();
        assert_eq!(ds.parsed_values().column_len(0), 1);
        ds.set_column_type(0, ColumnType::Text).unwrap();
        assert!(ds.errors().is_empty());
        assert_eq!(ds.parsed_values().column_len(0), 0);
    }

    #[test]
    fn stored_column_date_format_is_preferred_over_dataset_default() {
        let mut ds = dataset(&["when"], &[&["25/12/2024"], &["2024-12-25"]]);
        ds.revalidate_column(0, ColumnType::Date, None, Some(DateFormat::DmySlash))
            .unwrap();
        let summary = ds.revalidate_column(0, ColumnType::Date, None, None).unwrap();
        assert_eq!(summary.failed_rows, vec![2]);
        assert_eq!(ds.headers()[0].date_format, Some(DateFormat::DmySlash));
    }

    #[test]
    fn global_number_format_change_rechecks_number_columns_only() {
        let mut ds = dataset(&["n", "t"], &[&["1.234,5", "1.234,5"], &["7", "x"]]);
        ds.set_column_type(0, ColumnType::Number).unwrap();
        assert!(ds.errors().contains(1, 0));

        let summaries = ds
            .set_number_format(NumberFormat::new(Some('.'), ','))
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(ds.errors().is_empty());
        assert_eq!(ds.typed_value(0, 0), Some(&ParsedValue::Number(1234.5)));
    }

    #[test]
    fn global_date_format_change_overrides_column_formats() {
        let mut ds = dataset(&["d"], &[&["2024-Q2"]]);
        ds.revalidate_column(0, ColumnType::Date, None, Some(DateFormat::Ymd))
            .unwrap();
        assert!(ds.errors().contains(1, 0));
        ds.set_date_format(DateFormat::YearQuarter).unwrap();
        assert!(ds.errors().is_empty());
        assert_eq!(ds.headers()[0].date_format, Some(DateFormat::YearQuarter));
    }

    #[test]
    fn detection_resetting_a_column_to_text_drops_its_errors_and_values() {
        let mut ds = dataset(&["v"], &[&["1"], &["oops"]]);
        ds.set_column_type(0, ColumnType::Number).unwrap();
        assert_eq!(ds.invalid_cells(), vec![(2, 0)]);
        assert!(ds.typed_value(0, 0).is_some());

        let low_confidence = DetectionResult {
            date_format: DateFormat::Ymd,
            number_format: NumberFormat::default(),
            column_types: vec![ColumnType::Number],
            column_date_formats: vec![None],
            confidence: FormatConfidence {
                date_format: 0.0,
                number_format: 0.5,
                columns: vec![0.5],
            },
        };
        ds.apply_detection(&low_confidence).unwrap();
        assert_eq!(ds.headers()[0].column_type, ColumnType::Text);
        assert!(ds.errors().is_empty());
        assert!(ds.parsed_values().is_empty());
        assert!(ds.typed_value(0, 0).is_none());
    }

    #[test]
    fn out_of_range_column_is_an_error() {
        let mut ds = dataset(&["a"], &[&["1"]]);
        assert!(ds.revalidate_column(3, ColumnType::Number, None, None).is_err());
    }
}
