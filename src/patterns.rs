//! Fixed pattern catalogs for date and number detection.
//!
//! This module owns the two immutable tables the classifier scores against:
//!
//! - [`DATE_PATTERNS`]: every supported [`DateFormat`] with its structural
//!   shape and base confidence. Iteration order is significant: when two
//!   formats score identically (e.g. `DD/MM/YYYY` and `MM/DD/YYYY` for
//!   `03/04/2024`) the earlier entry wins.
//! - [`NUMBER_PATTERNS`]: the five canonical thousands/decimal separator
//!   pairs.
//!
//! Date parsing is strict. A value must match the format's shape before the
//! field values are checked, and out-of-range fields are rejected.

use std::{
    fmt,
    str::FromStr,
    sync::LazyLock,
};

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Symbolic date format tokens, declared in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DateFormat {
    /// `YYYY-MM-DD HH:mm:ss`
    YmdHms,
    /// `YYYY-MM-DDTHH:mm:ss`
    YmdTHms,
    /// `YYYY-MM-DD HH:mm`
    YmdHm,
    /// `YYYY-MM-DD`
    #[default]
    Ymd,
    /// `YYYY/MM/DD`
    YmdSlash,
    /// `DD/MM/YYYY HH:mm`
    DmySlashHm,
    /// `MM/DD/YYYY HH:mm`
    MdySlashHm,
    /// `DD/MM/YYYY`
    DmySlash,
    /// `MM/DD/YYYY`
    MdySlash,
    /// `DD-MM-YYYY`
    DmyDash,
    /// `MM-DD-YYYY`
    MdyDash,
    /// `DD.MM.YYYY`
    DmyDot,
    /// `YYYY-MM`
    YearMonth,
    /// `MM/YYYY`
    MonthSlashYear,
    /// `YYYY-[Q]Q`
    YearQuarter,
    /// `MMMM DD, YYYY`
    MonthNameDayYear,
    /// `DD MMM YYYY`
    DayMonthAbbrYear,
    /// `MMMM YYYY`
    MonthNameYear,
    /// `MMM YYYY`
    MonthAbbrYear,
    /// `MMMM DD`
    MonthNameDay,
    /// `MMM DD`
    MonthAbbrDay,
    /// `MMMM`
    MonthName,
    /// `MMM`
    MonthAbbr,
    /// `YYYY`
    Year,
}

#[derive(Debug, Clone, Copy)]
pub struct DatePatternSpec {
    pub format: DateFormat,
    pub shape: &'static str,
    pub base_confidence: f64,
}

pub const DATE_PATTERNS: &[DatePatternSpec] = &[
    DatePatternSpec::new(DateFormat::YmdHms, r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$", 0.95),
    DatePatternSpec::new(DateFormat::YmdTHms, r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}$", 0.95),
    DatePatternSpec::new(DateFormat::YmdHm, r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}$", 0.9),
    DatePatternSpec::new(DateFormat::Ymd, r"^\d{4}-\d{2}-\d{2}$", 0.95),
    DatePatternSpec::new(DateFormat::YmdSlash, r"^\d{4}/\d{2}/\d{2}$", 0.9),
    DatePatternSpec::new(DateFormat::DmySlashHm, r"^\d{1,2}/\d{1,2}/\d{4} \d{2}:\d{2}$", 0.85),
    DatePatternSpec::new(DateFormat::MdySlashHm, r"^\d{1,2}/\d{1,2}/\d{4} \d{2}:\d{2}$", 0.85),
    DatePatternSpec::new(DateFormat::DmySlash, r"^\d{1,2}/\d{1,2}/\d{4}$", 0.85),
    DatePatternSpec::new(DateFormat::MdySlash, r"^\d{1,2}/\d{1,2}/\d{4}$", 0.85),
    DatePatternSpec::new(DateFormat::DmyDash, r"^\d{1,2}-\d{1,2}-\d{4}$", 0.8),
    DatePatternSpec::new(DateFormat::MdyDash, r"^\d{1,2}-\d{1,2}-\d{4}$", 0.8),
    DatePatternSpec::new(DateFormat::DmyDot, r"^\d{1,2}\.\d{1,2}\.\d{4}$", 0.85),
    DatePatternSpec::new(DateFormat::YearMonth, r"^\d{4}-\d{2}$", 0.8),
    DatePatternSpec::new(DateFormat::MonthSlashYear, r"^\d{1,2}/\d{4}$", 0.8),
    DatePatternSpec::new(DateFormat::YearQuarter, r"^(\d{4})-[Qq]([1-4])$", 0.9),
    DatePatternSpec::new(DateFormat::MonthNameDayYear, r"^([A-Za-z]+) (\d{1,2}), (\d{4})$", 0.9),
    DatePatternSpec::new(DateFormat::DayMonthAbbrYear, r"^(\d{1,2}) ([A-Za-z]{3}) (\d{4})$", 0.9),
    DatePatternSpec::new(DateFormat::MonthNameYear, r"^([A-Za-z]+) (\d{4})$", 0.85),
    DatePatternSpec::new(DateFormat::MonthAbbrYear, r"^([A-Za-z]{3}) (\d{4})$", 0.85),
    DatePatternSpec::new(DateFormat::MonthNameDay, r"^([A-Za-z]+) (\d{1,2})$", 0.8),
    DatePatternSpec::new(DateFormat::MonthAbbrDay, r"^([A-Za-z]{3}) (\d{1,2})$", 0.8),
    DatePatternSpec::new(DateFormat::MonthName, r"^([A-Za-z]+)$", 0.75),
    DatePatternSpec::new(DateFormat::MonthAbbr, r"^([A-Za-z]{3})$", 0.75),
    DatePatternSpec::new(DateFormat::Year, r"^(\d{4})$", 0.7),
];

static DATE_SHAPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DATE_PATTERNS
        .iter()
        .map(|spec| Regex::new(spec.shape).expect("date shape regex"))
        .collect()
});

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

impl DatePatternSpec {
    const fn new(format: DateFormat, shape: &'static str, base_confidence: f64) -> Self {
        Self {
            format,
            shape,
            base_confidence,
        }
    }
}

impl DateFormat {
    pub fn all() -> impl Iterator<Item = DateFormat> {
        DATE_PATTERNS.iter().map(|spec| spec.format)
    }

    pub fn spec(self) -> &'static DatePatternSpec {
        &DATE_PATTERNS[self as usize]
    }

    fn shape(self) -> &'static Regex {
        &DATE_SHAPES[self as usize]
    }

    pub fn base_confidence(self) -> f64 {
        self.spec().base_confidence
    }

    pub fn token(self) -> &'static str {
        match self {
            DateFormat::YmdHms => "YYYY-MM-DD HH:mm:ss",
            DateFormat::YmdTHms => "YYYY-MM-DDTHH:mm:ss",
            DateFormat::YmdHm => "YYYY-MM-DD HH:mm",
            DateFormat::Ymd => "YYYY-MM-DD",
            DateFormat::YmdSlash => "YYYY/MM/DD",
            DateFormat::DmySlashHm => "DD/MM/YYYY HH:mm",
            DateFormat::MdySlashHm => "MM/DD/YYYY HH:mm",
            DateFormat::DmySlash => "DD/MM/YYYY",
            DateFormat::MdySlash => "MM/DD/YYYY",
            DateFormat::DmyDash => "DD-MM-YYYY",
            DateFormat::MdyDash => "MM-DD-YYYY",
            DateFormat::DmyDot => "DD.MM.YYYY",
            DateFormat::YearMonth => "YYYY-MM",
            DateFormat::MonthSlashYear => "MM/YYYY",
            DateFormat::YearQuarter => "YYYY-[Q]Q",
            DateFormat::MonthNameDayYear => "MMMM DD, YYYY",
            DateFormat::DayMonthAbbrYear => "DD MMM YYYY",
            DateFormat::MonthNameYear => "MMMM YYYY",
            DateFormat::MonthAbbrYear => "MMM YYYY",
            DateFormat::MonthNameDay => "MMMM DD",
            DateFormat::MonthAbbrDay => "MMM DD",
            DateFormat::MonthName => "MMMM",
            DateFormat::MonthAbbr => "MMM",
            DateFormat::Year => "YYYY",
        }
    }

    /// Whether the source format carries a time-of-day component.
    pub fn has_time(self) -> bool {
        matches!(
            self,
            DateFormat::YmdHms
                | DateFormat::YmdTHms
                | DateFormat::YmdHm
                | DateFormat::DmySlashHm
                | DateFormat::MdySlashHm
        )
    }

    /// Whether parsing borrows the reference year because the value has none.
    pub fn needs_reference_year(self) -> bool {
        matches!(
            self,
            DateFormat::MonthNameDay
                | DateFormat::MonthAbbrDay
                | DateFormat::MonthName
                | DateFormat::MonthAbbr
        )
    }

    pub fn matches_shape(self, value: &str) -> bool {
        self.shape().is_match(value.trim())
    }

    /// Strictly parses `value`. Year-less formats are placed in `reference_year`.
    pub fn parse(self, value: &str, reference_year: i32) -> Option<NaiveDateTime> {
        let value = value.trim();
        let captures = self.shape().captures(value)?;
        let group = |idx: usize| captures.get(idx).map(|m| m.as_str()).unwrap_or_default();
        let date = match self {
            DateFormat::YmdHms => return parse_datetime(value, "%Y-%m-%d %H:%M:%S"),
            DateFormat::YmdTHms => return parse_datetime(value, "%Y-%m-%dT%H:%M:%S"),
            DateFormat::YmdHm => return parse_datetime(value, "%Y-%m-%d %H:%M"),
            DateFormat::DmySlashHm => return parse_datetime(value, "%d/%m/%Y %H:%M"),
            DateFormat::MdySlashHm => return parse_datetime(value, "%m/%d/%Y %H:%M"),
            DateFormat::Ymd => parse_date(value, "%Y-%m-%d"),
            DateFormat::YmdSlash => parse_date(value, "%Y/%m/%d"),
            DateFormat::DmySlash => parse_date(value, "%d/%m/%Y"),
            DateFormat::MdySlash => parse_date(value, "%m/%d/%Y"),
            DateFormat::DmyDash => parse_date(value, "%d-%m-%Y"),
            DateFormat::MdyDash => parse_date(value, "%m-%d-%Y"),
            DateFormat::DmyDot => parse_date(value, "%d.%m.%Y"),
            DateFormat::YearMonth => parse_date(&format!("{value}-01"), "%Y-%m-%d"),
            DateFormat::MonthSlashYear => parse_date(&format!("01/{value}"), "%d/%m/%Y"),
            DateFormat::YearQuarter => {
                let year = group(1).parse().ok()?;
                let quarter: u32 = group(2).parse().ok()?;
                NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1)
            }
            DateFormat::MonthNameDayYear => ymd(group(3), month_full(group(1))?, group(2)),
            DateFormat::DayMonthAbbrYear => ymd(group(3), month_abbr(group(2))?, group(1)),
            DateFormat::MonthNameYear => ymd(group(2), month_full(group(1))?, "1"),
            DateFormat::MonthAbbrYear => ymd(group(2), month_abbr(group(1))?, "1"),
            DateFormat::MonthNameDay => {
                ymd(&reference_year.to_string(), month_full(group(1))?, group(2))
            }
            DateFormat::MonthAbbrDay => {
                ymd(&reference_year.to_string(), month_abbr(group(1))?, group(2))
            }
            DateFormat::MonthName => NaiveDate::from_ymd_opt(reference_year, month_full(group(1))?, 1),
            DateFormat::MonthAbbr => NaiveDate::from_ymd_opt(reference_year, month_abbr(group(1))?, 1),
            DateFormat::Year => ymd(group(1), 1, "1"),
        }?;
        date.and_hms_opt(0, 0, 0)
    }

    /// Structural match and strict parse both succeed.
    pub fn validates(self, value: &str, reference_year: i32) -> bool {
        self.parse(value, reference_year).is_some()
    }
}

fn parse_datetime(value: &str, template: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, template).ok()
}

fn parse_date(value: &str, template: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, template).ok()
}

fn ymd(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

fn month_full(name: &str) -> Option<u32> {
    let lowered = name.to_ascii_lowercase();
    MONTH_NAMES
        .iter()
        .position(|month| *month == lowered)
        .map(|idx| idx as u32 + 1)
}

fn month_abbr(name: &str) -> Option<u32> {
    if name.len() != 3 {
        return None;
    }
    let lowered = name.to_ascii_lowercase();
    MONTH_NAMES
        .iter()
        .position(|month| month.starts_with(&lowered))
        .map(|idx| idx as u32 + 1)
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for DateFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        DateFormat::all()
            .find(|format| format.token() == trimmed)
            .ok_or_else(|| anyhow!("Unknown date format '{trimmed}'"))
    }
}

impl Serialize for DateFormat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for DateFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateFormat::from_str(&raw).map_err(de::Error::custom)
    }
}

/// Thousands/decimal separator pair used to read numeric cells.
///
/// A `None` thousands separator means digits are never grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumberFormat {
    #[serde(with = "separator", default)]
    pub thousands_separator: Option<char>,
    pub decimal_separator: char,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::new(Some(','), '.')
    }
}

impl NumberFormat {
    pub const fn new(thousands_separator: Option<char>, decimal_separator: char) -> Self {
        Self {
            thousands_separator,
            decimal_separator,
        }
    }

    /// `("", ".")`: the fallback when separators would collide.
    pub const fn ungrouped() -> Self {
        Self::new(None, '.')
    }

    /// Structural shape used while scoring samples; allows a leading minus only.
    pub fn shape_pattern(&self) -> Result<Regex, regex::Error> {
        let decimal = regex::escape(&self.decimal_separator.to_string());
        match self.thousands_separator {
            Some(thousands) => Regex::new(&format!(
                r"^-?\d{{1,3}}(?:{}\d{{3}})*(?:{decimal}\d+)?$",
                regex::escape(&thousands.to_string())
            )),
            None => Regex::new(&format!(r"^-?\d+(?:{decimal}\d+)?$")),
        }
    }

    /// Strict conversion pattern: optional sign, grouped integer, optional fraction.
    pub fn strict_pattern(&self) -> Result<Regex, regex::Error> {
        let thousands = self
            .thousands_separator
            .map(|c| regex::escape(&c.to_string()))
            .unwrap_or_default();
        let decimal = regex::escape(&self.decimal_separator.to_string());
        Regex::new(&format!(
            r"^[-+]?\d{{1,3}}(?:{thousands}\d{{3}})*(?:{decimal}\d+)?$"
        ))
    }

    pub fn describe(&self) -> String {
        let thousands = match self.thousands_separator {
            Some(' ') => "space".to_string(),
            Some(c) => format!("'{c}'"),
            None => "none".to_string(),
        };
        format!(
            "thousands={thousands}, decimal='{}'",
            self.decimal_separator
        )
    }
}

mod separator {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(value: &Option<char>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(c) => serializer.serialize_str(&c.to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<char>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Ok(None),
            (Some(c), None) => Ok(Some(c)),
            _ => Err(de::Error::custom(format!(
                "separator '{raw}' must be a single character"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NumberPatternSpec {
    pub format: NumberFormat,
    pub shape: &'static str,
    pub base_confidence: f64,
}

pub const NUMBER_PATTERNS: &[NumberPatternSpec] = &[
    NumberPatternSpec {
        format: NumberFormat::new(Some(','), '.'),
        shape: r"^-?\d{1,3}(,\d{3})*(\.\d+)?$",
        base_confidence: 0.9,
    },
    NumberPatternSpec {
        format: NumberFormat::new(Some('.'), ','),
        shape: r"^-?\d{1,3}(\.\d{3})*(,\d+)?$",
        base_confidence: 0.9,
    },
    NumberPatternSpec {
        format: NumberFormat::new(Some(' '), '.'),
        shape: r"^-?\d{1,3}( \d{3})*(\.\d+)?$",
        base_confidence: 0.85,
    },
    NumberPatternSpec {
        format: NumberFormat::new(None, '.'),
        shape: r"^-?\d+(\.\d+)?$",
        base_confidence: 0.8,
    },
    NumberPatternSpec {
        format: NumberFormat::new(None, ','),
        shape: r"^-?\d+(,\d+)?$",
        base_confidence: 0.75,
    },
];

static NUMBER_SHAPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    NUMBER_PATTERNS
        .iter()
        .map(|spec| Regex::new(spec.shape).expect("number shape regex"))
        .collect()
});

impl NumberPatternSpec {
    pub fn shape_regex(index: usize) -> Option<&'static Regex> {
        NUMBER_SHAPES.get(index)
    }
}

/// The winning interpretation of a classified column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectedPattern {
    Date(DateFormat),
    Number(NumberFormat),
}

/// Renders a parsed number without a trailing `.0` for whole values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
