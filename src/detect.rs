//! Per-column type classification.
//!
//! [`analyze_column`] samples the first non-blank cells of a column and
//! scores every date and number pattern against them. Date patterns must
//! both match structurally and parse strictly. Number patterns are scored on
//! shape, then penalized when the claimed grouping never shows up or when
//! separators sit in implausible places. A column only resolves to `date` or
//! `number` when its best score clears [`CLASSIFICATION_THRESHOLD`] and beats
//! the other family; everything else stays `text`.

use chrono::{Datelike, Local};
use log::debug;

use crate::patterns::{DATE_PATTERNS, DateFormat, DetectedPattern, NUMBER_PATTERNS, NumberFormat, NumberPatternSpec};
use crate::schema::ColumnType;

pub const DEFAULT_SAMPLE_CAP: usize = 20;
pub const CLASSIFICATION_THRESHOLD: f64 = 0.6;
pub const TEXT_CONFIDENCE: f64 = 0.5;

const UNEVIDENCED_GROUPING_PENALTY: f64 = 0.7;
const MISPLACED_MAJORITY_PENALTY: f64 = 0.2;
const MISPLACED_MINORITY_PENALTY: f64 = 0.5;
const HEURISTIC_TRIGGER_SCORE: f64 = 0.6;
const HEURISTIC_MIN_RATIO: f64 = 0.6;
const HEURISTIC_CONFIDENCE: f64 = 0.9;
const SEPARATOR_CANDIDATES: &[char] = &[' ', ',', '.', '_', '\'', '#', '@'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Only the first `sample_cap` non-blank cells of a column are scored.
    pub sample_cap: usize,
    /// Year assumed for values such as `February` or `Mar 3`.
    pub reference_year: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_cap: DEFAULT_SAMPLE_CAP,
            reference_year: Local::now().year(),
        }
    }
}

impl DetectorConfig {
    pub fn with_reference_year(reference_year: i32) -> Self {
        Self {
            reference_year,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnAnalysis {
    pub column_type: ColumnType,
    pub confidence: f64,
    pub pattern: Option<DetectedPattern>,
}

impl ColumnAnalysis {
    fn text(confidence: f64) -> Self {
        Self {
            column_type: ColumnType::Text,
            confidence,
            pattern: None,
        }
    }

    pub fn date_format(&self) -> Option<DateFormat> {
        match self.pattern {
            Some(DetectedPattern::Date(format)) => Some(format),
            _ => None,
        }
    }

    pub fn number_format(&self) -> Option<NumberFormat> {
        match self.pattern {
            Some(DetectedPattern::Number(format)) => Some(format),
            _ => None,
        }
    }
}

/// First `cap` non-blank cells, trimmed.
pub fn sample_values<'a, I>(values: I, cap: usize) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .take(cap)
        .collect()
}

pub fn analyze_column<'a, I>(values: I, config: &DetectorConfig) -> ColumnAnalysis
where
    I: IntoIterator<Item = &'a str>,
{
    let samples = sample_values(values, config.sample_cap);
    analyze_samples(&samples, config)
}

pub(crate) fn analyze_samples(samples: &[&str], config: &DetectorConfig) -> ColumnAnalysis {
    if samples.is_empty() {
        return ColumnAnalysis::text(0.0);
    }

    let date = best_date_pattern(samples, config.reference_year);
    let mut number = best_number_pattern(samples);
    let number_score = number.map(|(_, score)| score).unwrap_or(0.0);
    if number_score <= HEURISTIC_TRIGGER_SCORE
        && let Some((format, score)) = infer_separators(samples)
        && score > number_score
    {
        debug!(
            "Heuristic separator inference chose {} (score {score:.3})",
            format.describe()
        );
        number = Some((format, score));
    }

    let date_score = date.map(|(_, score)| score).unwrap_or(0.0);
    let number_score = number.map(|(_, score)| score).unwrap_or(0.0);
    debug!(
        "Scored {} sample(s): date={date_score:.3} ({}), number={number_score:.3} ({})",
        samples.len(),
        date.map(|(f, _)| f.token()).unwrap_or("-"),
        number.map(|(f, _)| f.describe()).unwrap_or_else(|| "-".to_string()),
    );

    match (date, number) {
        (Some((format, score)), _)
            if score > CLASSIFICATION_THRESHOLD && score > number_score =>
        {
            ColumnAnalysis {
                column_type: ColumnType::Date,
                confidence: score,
                pattern: Some(DetectedPattern::Date(format)),
            }
        }
        (_, Some((format, score))) if score > CLASSIFICATION_THRESHOLD && score > date_score => {
            ColumnAnalysis {
                column_type: ColumnType::Number,
                confidence: score,
                pattern: Some(DetectedPattern::Number(format)),
            }
        }
        _ => ColumnAnalysis::text(TEXT_CONFIDENCE),
    }
}

fn best_date_pattern(samples: &[&str], reference_year: i32) -> Option<(DateFormat, f64)> {
    let total = samples.len() as f64;
    let mut best: Option<(DateFormat, f64)> = None;
    for spec in DATE_PATTERNS {
        let matches = samples
            .iter()
            .filter(|value| spec.format.validates(value, reference_year))
            .count();
        if matches == 0 {
            continue;
        }
        let score = matches as f64 / total * spec.base_confidence;
        if best.is_none_or(|(_, current)| score > current) {
            best = Some((spec.format, score));
        }
    }
    best
}

fn best_number_pattern(samples: &[&str]) -> Option<(NumberFormat, f64)> {
    let mut best: Option<(NumberFormat, f64)> = None;
    for (idx, spec) in NUMBER_PATTERNS.iter().enumerate() {
        let Some(score) = score_number_pattern(samples, idx) else {
            continue;
        };
        if best.is_none_or(|(_, current)| score > current) {
            best = Some((spec.format, score));
        }
    }
    best
}

/// Scores catalog entry `index`; `None` when no sample has its shape.
fn score_number_pattern(samples: &[&str], index: usize) -> Option<f64> {
    let spec = NUMBER_PATTERNS.get(index)?;
    let shape = NumberPatternSpec::shape_regex(index)?;
    let matched: Vec<&str> = samples
        .iter()
        .copied()
        .filter(|value| shape.is_match(value))
        .collect();
    if matched.is_empty() {
        return None;
    }

    let mut score = matched.len() as f64 / samples.len() as f64 * spec.base_confidence;
    if let Some(thousands) = spec.format.thousands_separator
        && !samples.iter().any(|value| value.contains(thousands))
    {
        score *= UNEVIDENCED_GROUPING_PENALTY;
    }

    let well_placed = matched
        .iter()
        .filter(|value| separators_well_placed(value, &spec.format))
        .count();
    let placement_ratio = well_placed as f64 / matched.len() as f64;
    if placement_ratio < 0.5 {
        score *= MISPLACED_MAJORITY_PENALTY;
    } else if placement_ratio < 0.8 {
        score *= MISPLACED_MINORITY_PENALTY;
    }
    Some(score)
}

/// Checks that grouping and decimal separators sit where `format` expects them.
pub fn separators_well_placed(value: &str, format: &NumberFormat) -> bool {
    let decimal = format.decimal_separator;
    let unsigned = value.strip_prefix('-').unwrap_or(value);
    let integer_part = unsigned.split(decimal).next().unwrap_or_default();

    if let Some(thousands) = format.thousands_separator {
        if unsigned.contains(thousands) {
            if !is_grouped(integer_part, thousands) {
                return false;
            }
        } else if longest_digit_run(integer_part) > 3 {
            return false;
        }
    }

    if unsigned.contains(decimal) {
        let parts: Vec<&str> = unsigned.split(decimal).collect();
        if parts.len() != 2 || !is_digits(parts[1]) {
            return false;
        }
    }

    // "39166.593" reads as a decimal point, not a grouped "39.166,593".
    if format.thousands_separator == Some('.')
        && decimal == ','
        && !value.contains(',')
        && value.matches('.').count() == 1
        && let Some((_, fraction)) = value.split_once('.')
        && is_digits(fraction)
    {
        return false;
    }

    true
}

fn is_grouped(integer_part: &str, thousands: char) -> bool {
    let mut groups = integer_part.split(thousands);
    let Some(lead) = groups.next() else {
        return false;
    };
    (1..=3).contains(&lead.len())
        && is_digits(lead)
        && groups.all(|group| group.len() == 3 && is_digits(group))
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn longest_digit_run(value: &str) -> usize {
    value
        .split(|c: char| !c.is_ascii_digit())
        .map(str::len)
        .max()
        .unwrap_or(0)
}

/// Infers a separator pair outside the fixed catalog.
///
/// The decimal separator is the first candidate character (scanning each
/// sample right to left) followed by 1-3 trailing digits; the thousands
/// separator is another candidate character to its left in that same sample.
pub fn infer_separators(samples: &[&str]) -> Option<(NumberFormat, f64)> {
    let present: Vec<char> = SEPARATOR_CANDIDATES
        .iter()
        .copied()
        .filter(|candidate| samples.iter().any(|value| value.contains(*candidate)))
        .collect();
    if present.is_empty() {
        return None;
    }

    let format = samples.iter().find_map(|sample| {
        sample
            .char_indices()
            .rev()
            .filter(|(_, ch)| present.contains(ch))
            .find_map(|(idx, ch)| {
                let remainder = &sample[idx + ch.len_utf8()..];
                if !(1..=3).contains(&remainder.len()) || !is_digits(remainder) {
                    return None;
                }
                let thousands = sample[..idx]
                    .chars()
                    .rev()
                    .find(|c| *c != ch && present.contains(c));
                Some(NumberFormat::new(thousands, ch))
            })
    })?;

    let shape = format.shape_pattern().ok()?;
    let matches = samples.iter().filter(|value| shape.is_match(value)).count();
    let ratio = matches as f64 / samples.len() as f64;
    if ratio >= HEURISTIC_MIN_RATIO {
        Some((format, ratio * HEURISTIC_CONFIDENCE))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DetectorConfig {
        DetectorConfig::with_reference_year(2024)
    }

    #[test]
    fn blank_column_is_text_with_zero_confidence() {
        let analysis = analyze_column(["", "  ", "\t"], &config());
        assert_eq!(analysis.column_type, ColumnType::Text);
        assert_eq!(analysis.confidence, 0.0);
        assert!(analysis.pattern.is_none());
    }

    #[test]
    fn comma_grouped_numbers_resolve_to_us_format() {
        let analysis = analyze_column(["1,234.56", "987.00", "12,000"], &config());
        assert_eq!(analysis.column_type, ColumnType::Number);
        assert_eq!(
            analysis.number_format(),
            Some(NumberFormat::new(Some(','), '.'))
        );
        assert!((analysis.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn european_numbers_resolve_to_dot_grouping() {
        let analysis = analyze_column(["1.234,56", "12,5", "3.000.000,00"], &config());
        assert_eq!(
            analysis.number_format(),
            Some(NumberFormat::new(Some('.'), ','))
        );
    }

    #[test]
    fn plain_integers_prefer_ungrouped_format() {
        let analysis = analyze_column(["1", "22", "333", "4444"], &config());
        assert_eq!(analysis.column_type, ColumnType::Number);
        assert_eq!(analysis.number_format(), Some(NumberFormat::ungrouped()));
    }

    #[test]
    fn space_grouping_with_comma_decimal_uses_heuristic() {
        let analysis = analyze_column(["1 234,50", "2 000,00", "500,75"], &config());
        assert_eq!(analysis.column_type, ColumnType::Number);
        assert_eq!(
            analysis.number_format(),
            Some(NumberFormat::new(Some(' '), ','))
        );
        assert!((analysis.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn iso_dates_resolve_with_pattern_confidence() {
        let analysis = analyze_column(["2024-01-15", "2024-02-20", "2023-12-31"], &config());
        assert_eq!(analysis.column_type, ColumnType::Date);
        assert_eq!(analysis.date_format(), Some(DateFormat::Ymd));
        assert!(analysis.confidence >= DateFormat::Ymd.base_confidence() - 1e-9);
    }

    #[test]
    fn day_first_wins_when_a_day_exceeds_twelve() {
        let analysis = analyze_column(["03/04/2024", "25/12/2024", "13/01/2024"], &config());
        assert_eq!(analysis.date_format(), Some(DateFormat::DmySlash));

        let analysis = analyze_column(["03/04/2024", "12/25/2024", "01/13/2024"], &config());
        assert_eq!(analysis.date_format(), Some(DateFormat::MdySlash));
    }

    #[test]
    fn ambiguous_slash_dates_follow_catalog_order() {
        let analysis = analyze_column(["03/04/2024", "05/06/2024"], &config());
        assert_eq!(analysis.date_format(), Some(DateFormat::DmySlash));
    }

    #[test]
    fn quarter_column_detected() {
        let analysis = analyze_column(["2024-Q1", "2024-Q2", "2024-Q3"], &config());
        assert_eq!(analysis.date_format(), Some(DateFormat::YearQuarter));
    }

    #[test]
    fn mixed_evidence_falls_back_to_text() {
        let analysis = analyze_column(["12", "apple", "pear", "2024-01-01", "plum"], &config());
        assert_eq!(analysis.column_type, ColumnType::Text);
        assert_eq!(analysis.confidence, TEXT_CONFIDENCE);
    }

    #[test]
    fn sample_cap_limits_scored_values() {
        let mut values = vec!["10"; 3];
        values.extend(["word"; 10]);
        let capped = DetectorConfig {
            sample_cap: 3,
            reference_year: 2024,
        };
        assert_eq!(analyze_column(values.clone(), &capped).column_type, ColumnType::Number);
        assert_eq!(analyze_column(values, &config()).column_type, ColumnType::Text);
    }

    #[test]
    fn lone_dot_with_digits_is_not_dot_grouping() {
        let format = NumberFormat::new(Some('.'), ',');
        assert!(!separators_well_placed("39.166", &format));
        assert!(separators_well_placed("1.234.567", &format));
        assert!(separators_well_placed("1.234,5", &format));
    }

    #[test]
    fn ungrouped_long_run_contradicts_grouped_format() {
        let format = NumberFormat::new(Some(','), '.');
        assert!(!separators_well_placed("39166.593", &format));
        assert!(separators_well_placed("391.5", &format));
        assert!(!separators_well_placed("1,23,456", &format));
        assert!(!separators_well_placed("1.2.3", &format));
    }

    const COMMA_GROUPED: usize = 0;
    const DOT_GROUPED: usize = 1;

    fn assert_score(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("pattern matched");
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    #[test]
    fn grouping_never_seen_in_samples_costs_thirty_percent() {
        let samples = ["1.5", "22.25", "300"];
        assert_score(score_number_pattern(&samples, COMMA_GROUPED), 0.9 * 0.7);
    }

    #[test]
    fn minority_of_misplaced_values_halves_the_score() {
        // "39.166" has a lone dot and reads as a decimal point.
        let samples = ["1.234,5", "1.234.567", "39.166"];
        assert_score(score_number_pattern(&samples, DOT_GROUPED), 0.9 * 0.5);
    }

    #[test]
    fn majority_of_misplaced_values_cuts_the_score_to_a_fifth() {
        let samples = ["1.234,5", "2.000", "39.166"];
        assert_score(score_number_pattern(&samples, DOT_GROUPED), 0.9 * 0.2);
    }

    #[test]
    fn placement_penalty_hands_lone_dot_values_to_the_ungrouped_format() {
        let samples = ["39.166", "12.500", "7.250"];
        assert_score(score_number_pattern(&samples, DOT_GROUPED), 0.9 * 0.2);
        assert_score(score_number_pattern(&samples, COMMA_GROUPED), 0.9 * 0.7);

        let (format, score) = best_number_pattern(&samples).expect("number pattern");
        assert_eq!(format, NumberFormat::ungrouped());
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn heuristic_reads_apostrophe_grouping() {
        let samples = ["1'234.5", "12'000.25", "7.5"];
        let (format, score) = infer_separators(&samples).expect("inferred");
        assert_eq!(format, NumberFormat::new(Some('\''), '.'));
        assert!((score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn heuristic_rejects_low_match_ratio() {
        let samples = ["1_5", "a_b", "c_d"];
        assert!(infer_separators(&samples).is_none());
    }
}
