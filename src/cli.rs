use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::ingest::InputFormat;
use crate::patterns::DateFormat;
use crate::schema::ColumnType;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Detect column types, date formats, and number locales in tabular data",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify every column and report detected types and formats
    Detect(DetectArgs),
    /// Check a file against a saved schema and list cells that fail conversion
    Validate(ValidateArgs),
    /// Convert a single value to its canonical form
    Convert(ConvertArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV, TSV, or JSON file ('-' reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Input format; inferred from the file extension when omitted
    #[arg(long, value_enum)]
    pub format: Option<InputFormat>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Treat the first row as data and generate column names
    #[arg(long = "no-header", conflicts_with = "header")]
    pub no_header: bool,
    /// Always treat the first row as the header
    #[arg(long)]
    pub header: bool,
    /// Year assumed for date formats that carry no year (defaults to the current year)
    #[arg(long = "reference-year")]
    pub reference_year: Option<i32>,
}

impl InputArgs {
    pub fn header_override(&self) -> Option<bool> {
        match (self.header, self.no_header) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Destination schema file (.yml, .yaml, or .json)
    #[arg(short = 'o', long = "schema")]
    pub schema: Option<PathBuf>,
    /// Number of non-blank values sampled per column
    #[arg(long = "sample-cap", default_value_t = crate::detect::DEFAULT_SAMPLE_CAP)]
    pub sample_cap: usize,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Schema produced by `detect`
    #[arg(short = 's', long = "schema")]
    pub schema: PathBuf,
    /// Maximum number of invalid cells to list (0 lists all)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Target column type (text, number, date)
    #[arg(short = 't', long = "type", value_parser = parse_column_type)]
    pub column_type: ColumnType,
    /// Raw value to convert
    #[arg(allow_hyphen_values = true)]
    pub value: String,
    /// Thousands separator; pass an empty string or 'none' for ungrouped numbers
    #[arg(long, default_value = ",")]
    pub thousands: String,
    /// Decimal separator
    #[arg(long, default_value_t = '.')]
    pub decimal: char,
    /// Date format token such as YYYY-MM-DD or DD/MM/YYYY
    #[arg(long = "date-format", value_parser = parse_date_format)]
    pub date_format: Option<DateFormat>,
    /// Year assumed for date formats that carry no year (defaults to the current year)
    #[arg(long = "reference-year")]
    pub reference_year: Option<i32>,
    /// Print the full conversion result as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_column_type(value: &str) -> Result<ColumnType, String> {
    value.parse().map_err(|err: anyhow::Error| err.to_string())
}

pub fn parse_date_format(value: &str) -> Result<DateFormat, String> {
    value.parse().map_err(|err: anyhow::Error| err.to_string())
}

/// `""`, `none`, and `empty` mean no thousands separator; `space` is accepted for `' '`.
pub fn parse_separator(value: &str) -> Result<Option<char>, String> {
    match value {
        "" | "none" | "empty" => Ok(None),
        "space" => Ok(Some(' ')),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Ok(Some(ch)),
                _ => Err(format!("Separator '{other}' must be a single character")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_aliases() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn separator_aliases() {
        assert_eq!(parse_separator(""), Ok(None));
        assert_eq!(parse_separator("none"), Ok(None));
        assert_eq!(parse_separator("space"), Ok(Some(' ')));
        assert_eq!(parse_separator("'"), Ok(Some('\'')));
        assert!(parse_separator("..").is_err());
    }

    #[test]
    fn convert_args_parse() {
        let cli = Cli::try_parse_from([
            "smart-columns",
            "convert",
            "--type",
            "date",
            "--date-format",
            "DD/MM/YYYY",
            "25/12/2024",
        ])
        .expect("parse");
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.column_type, ColumnType::Date);
        assert_eq!(args.date_format, Some(DateFormat::DmySlash));
        assert_eq!(args.value, "25/12/2024");
    }

    #[test]
    fn header_flags_conflict() {
        assert!(
            Cli::try_parse_from(["smart-columns", "detect", "-i", "x.csv", "--header", "--no-header"])
                .is_err()
        );
    }
}
