//! Dataset-level format aggregation.
//!
//! Individual columns may disagree about date formats and separators. This
//! module combines the per-column [`ColumnAnalysis`] results into a single
//! [`DetectionResult`]: one dominant date format, one dominant number format,
//! and a confidence for each, alongside the per-column types. When no column
//! classifies as a number, bare decimals such as `3,5` in the remaining
//! non-date columns still decide the decimal separator.

use log::{debug, info};

use crate::detect::{ColumnAnalysis, DetectorConfig, analyze_samples, sample_values};
use crate::patterns::{DateFormat, NUMBER_PATTERNS, NumberFormat, NumberPatternSpec};
use crate::schema::ColumnType;

const UNGROUPED_BOOST: f64 = 1.2;
const UNGROUPED_BOOST_MIN_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct FormatConfidence {
    pub date_format: f64,
    pub number_format: f64,
    pub columns: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub date_format: DateFormat,
    pub number_format: NumberFormat,
    pub column_types: Vec<ColumnType>,
    /// Each date column's own format; `None` for non-date columns.
    pub column_date_formats: Vec<Option<DateFormat>>,
    pub confidence: FormatConfidence,
}

impl DetectionResult {
    pub fn column_count(&self) -> usize {
        self.column_types.len()
    }
}

#[derive(Debug, Clone, Default)]
struct Tally {
    matches: usize,
    confidences: Vec<f64>,
}

impl Tally {
    fn record(&mut self, matches: usize, confidence: f64) {
        self.matches += matches;
        self.confidences.push(confidence);
    }

    fn average_confidence(&self) -> f64 {
        if self.confidences.is_empty() {
            return 0.0;
        }
        self.confidences.iter().sum::<f64>() / self.confidences.len() as f64
    }

    /// Confidence weighted by log-scaled match volume.
    fn weighted_score(&self) -> f64 {
        self.average_confidence() * (1.0 + (self.matches as f64 + 1.0).log10() / 10.0)
    }
}

fn tally_for<K: PartialEq>(tallies: &mut Vec<(K, Tally)>, key: K) -> &mut Tally {
    let position = match tallies.iter().position(|(existing, _)| *existing == key) {
        Some(position) => position,
        None => {
            tallies.push((key, Tally::default()));
            tallies.len() - 1
        }
    };
    &mut tallies[position].1
}

fn best_by<K: Copy>(tallies: &[(K, Tally)], score: impl Fn(&K, &Tally) -> f64) -> Option<(K, f64)> {
    let mut best: Option<(K, f64)> = None;
    for (key, tally) in tallies {
        let value = score(key, tally);
        if best.is_none_or(|(_, current)| value > current) {
            best = Some((*key, value));
        }
    }
    best
}

/// Classifies every column of `rows` and aggregates the dataset formats.
///
/// `rows` holds data rows only (no header row).
pub fn detect_formats(rows: &[Vec<String>], config: &DetectorConfig) -> DetectionResult {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let samples: Vec<Vec<&str>> = (0..width)
        .map(|column| {
            let cells = rows
                .iter()
                .map(move |row| row.get(column).map(String::as_str).unwrap_or_default());
            sample_values(cells, config.sample_cap)
        })
        .collect();
    let analyses: Vec<ColumnAnalysis> = samples
        .iter()
        .map(|column| analyze_samples(column, config))
        .collect();
    let result = aggregate_formats(&analyses, &samples, config);
    info!(
        "Detected {} column(s): {} date, {} number; dataset formats {} / {}",
        result.column_count(),
        result
            .column_types
            .iter()
            .filter(|ty| **ty == ColumnType::Date)
            .count(),
        result
            .column_types
            .iter()
            .filter(|ty| **ty == ColumnType::Number)
            .count(),
        result.date_format,
        result.number_format.describe()
    );
    result
}

/// Combines per-column analyses; `samples[i]` are the sampled cells of column `i`.
pub fn aggregate_formats(
    analyses: &[ColumnAnalysis],
    samples: &[Vec<&str>],
    config: &DetectorConfig,
) -> DetectionResult {
    let (date_format, date_confidence) =
        aggregate_date_format(analyses, samples, config.reference_year);
    let (number_format, number_confidence) = aggregate_number_format(analyses, samples);

    DetectionResult {
        date_format,
        number_format,
        column_types: analyses.iter().map(|a| a.column_type).collect(),
        column_date_formats: analyses.iter().map(ColumnAnalysis::date_format).collect(),
        confidence: FormatConfidence {
            date_format: date_confidence,
            number_format: number_confidence,
            columns: analyses.iter().map(|a| a.confidence).collect(),
        },
    }
}

fn column_samples<'a, 'b>(samples: &'a [Vec<&'b str>], column: usize) -> &'a [&'b str] {
    samples.get(column).map(Vec::as_slice).unwrap_or_default()
}

fn aggregate_date_format(
    analyses: &[ColumnAnalysis],
    samples: &[Vec<&str>],
    reference_year: i32,
) -> (DateFormat, f64) {
    let mut tallies: Vec<(DateFormat, Tally)> = Vec::new();
    for (column, analysis) in analyses.iter().enumerate() {
        if analysis.column_type != ColumnType::Date {
            continue;
        }
        let Some(format) = analysis.date_format() else {
            continue;
        };
        let matches = column_samples(samples, column)
            .iter()
            .filter(|value| format.validates(value, reference_year))
            .count();
        tally_for(&mut tallies, format).record(matches, analysis.confidence);
    }
    // Catalog order breaks ties.
    tallies.sort_by_key(|(format, _)| *format);

    match best_by(&tallies, |_, tally| tally.average_confidence()) {
        Some((format, confidence)) => {
            debug!("Dataset date format {format} (avg confidence {confidence:.3})");
            (format, confidence)
        }
        None => (DateFormat::Ymd, 0.0),
    }
}

fn aggregate_number_format(
    analyses: &[ColumnAnalysis],
    samples: &[Vec<&str>],
) -> (NumberFormat, f64) {
    let mut thousands: Vec<(Option<char>, Tally)> = Vec::new();
    let mut decimals: Vec<(char, Tally)> = Vec::new();
    for (column, analysis) in analyses.iter().enumerate() {
        if analysis.column_type != ColumnType::Number {
            continue;
        }
        let Some(format) = analysis.number_format() else {
            continue;
        };
        let matches = match format.shape_pattern() {
            Ok(shape) => column_samples(samples, column)
                .iter()
                .filter(|value| shape.is_match(value))
                .count(),
            Err(_) => 0,
        };
        tally_for(&mut thousands, format.thousands_separator).record(matches, analysis.confidence);
        tally_for(&mut decimals, format.decimal_separator).record(matches, analysis.confidence);
    }

    if thousands.is_empty() && decimals.is_empty() {
        return decimal_only_format(analyses, samples);
    }

    let default = NumberFormat::default();
    let (thousands_separator, thousands_score) = best_by(&thousands, |key, tally| {
        let score = tally.weighted_score();
        if key.is_none()
            && tally.matches > 0
            && tally.average_confidence() >= UNGROUPED_BOOST_MIN_CONFIDENCE
        {
            score * UNGROUPED_BOOST
        } else {
            score
        }
    })
    .unwrap_or((default.thousands_separator, 0.0));
    let (decimal_separator, decimal_score) = best_by(&decimals, |_, tally| tally.weighted_score())
        .unwrap_or((default.decimal_separator, 0.0));

    let confidence = ((thousands_score + decimal_score) / 2.0).clamp(0.0, 1.0);
    if thousands_separator == Some(decimal_separator) {
        debug!("Thousands and decimal separators collide on '{decimal_separator}'; using ungrouped");
        return (NumberFormat::ungrouped(), confidence);
    }

    let format = NumberFormat::new(thousands_separator, decimal_separator);
    debug!(
        "Dataset number format {} (confidence {confidence:.3})",
        format.describe()
    );
    (format, confidence)
}

/// Tallies bare decimals (`3,5`, `0.25`) in non-date columns against the
/// ungrouped catalog entries. No grouping is inferred from them.
fn decimal_only_format(analyses: &[ColumnAnalysis], samples: &[Vec<&str>]) -> (NumberFormat, f64) {
    let mut decimals: Vec<(char, Tally)> = Vec::new();
    for (column, analysis) in analyses.iter().enumerate() {
        if analysis.column_type == ColumnType::Date {
            continue;
        }
        let values = column_samples(samples, column);
        if values.is_empty() {
            continue;
        }
        for (idx, spec) in NUMBER_PATTERNS.iter().enumerate() {
            if spec.format.thousands_separator.is_some() {
                continue;
            }
            let Some(shape) = NumberPatternSpec::shape_regex(idx) else {
                continue;
            };
            let decimal = spec.format.decimal_separator;
            let matches = values
                .iter()
                .filter(|value| value.contains(decimal) && shape.is_match(value))
                .count();
            if matches == 0 {
                continue;
            }
            let confidence = matches as f64 / values.len() as f64 * spec.base_confidence;
            tally_for(&mut decimals, decimal).record(matches, confidence);
        }
    }

    let Some((decimal_separator, decimal_score)) =
        best_by(&decimals, |_, tally| tally.weighted_score())
    else {
        return (NumberFormat::default(), 0.0);
    };
    let format = NumberFormat::new(None, decimal_separator);
    let confidence = (decimal_score / 2.0).clamp(0.0, 1.0);
    debug!(
        "No number columns; decimal-only evidence gives {} (confidence {confidence:.3})",
        format.describe()
    );
    (format, confidence)
}
