//! Table ingestion: CSV/TSV and JSON 2D arrays into rectangular string rows.
//!
//! Everything downstream assumes rectangular string data with unique header
//! names. This module is where that is established:
//!
//! - **Delimiter resolution**: extension-based (`.tsv` → tab) with override.
//! - **Encoding**: CSV bytes are decoded through `encoding_rs` (UTF-8 default).
//! - **Shape**: CSV rows are padded/truncated to the first row's width; JSON
//!   input must already be a rectangular array of arrays.
//! - **Headers**: the first row is used as the header when it looks like one,
//!   otherwise synthetic names are generated. Names are de-duplicated.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use encoding_rs::{Encoding, UTF_8};
use log::debug;
use serde_json::Value;
use thiserror::Error;

use crate::schema::{dedupe_header_names, detect_header_row, generate_field_names};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
const HEADER_DETECTION_SAMPLE_ROWS: usize = 6;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Opening input file {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Reading input")]
    Read(#[from] io::Error),
    #[error("Reading CSV record {record}")]
    Csv {
        record: usize,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to decode record {record} with encoding {encoding}")]
    Decode {
        record: usize,
        encoding: &'static str,
    },
    #[error("Unknown encoding '{0}'")]
    UnknownEncoding(String),
    #[error("Parsing JSON input")]
    Json(#[from] serde_json::Error),
    #[error("JSON input must be an array of arrays: {0}")]
    NotATable(String),
    #[error("JSON row {row} has {found} cell(s) but the first row has {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Input has {0} row(s); at least 2 are required")]
    TooFewRows(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => InputFormat::Json,
            _ => InputFormat::Csv,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub format: Option<InputFormat>,
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    /// `Some(true)` forces a header row, `Some(false)` forbids one.
    pub header: Option<bool>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            format: None,
            delimiter: None,
            encoding: UTF_8,
            header: None,
        }
    }
}

/// A rectangular table with unique header names and data rows only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub has_header_row: bool,
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding, IngestError> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| IngestError::UnknownEncoding(value.to_string())),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn load_table(path: &Path, options: &LoadOptions) -> Result<Table, IngestError> {
    let format = options
        .format
        .unwrap_or_else(|| InputFormat::from_path(path));
    let rows = match format {
        InputFormat::Csv => {
            let delimiter = resolve_input_delimiter(path, options.delimiter);
            let reader = open_input(path)?;
            rectangularize(read_csv(reader, delimiter, options.encoding)?)
        }
        InputFormat::Json => {
            let mut text = String::new();
            open_input(path)?.read_to_string(&mut text)?;
            parse_json_rows(&text)?
        }
    };
    debug!("Loaded {} raw row(s) from {path:?}", rows.len());
    build_table(rows, options.header)
}

fn open_input(path: &Path) -> Result<Box<dyn Read>, IngestError> {
    if is_dash(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Box::new(BufReader::new(file)))
}

/// Reads every record, tolerating uneven lengths; see [`rectangularize`].
pub fn read_csv<R: Read>(
    reader: R,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<Vec<String>>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(reader);
    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    loop {
        let index = rows.len() + 1;
        let more = reader
            .read_byte_record(&mut record)
            .map_err(|source| IngestError::Csv {
                record: index,
                source,
            })?;
        if !more {
            break;
        }
        let decoded = record
            .iter()
            .map(|field| decode_bytes(field, encoding))
            .collect::<Option<Vec<String>>>()
            .ok_or(IngestError::Decode {
                record: index,
                encoding: encoding.name(),
            })?;
        rows.push(decoded);
    }
    Ok(rows)
}

fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    (!had_errors).then(|| text.into_owned())
}

/// Accepts only an array of equally long arrays of scalars.
pub fn parse_json_rows(text: &str) -> Result<Vec<Vec<String>>, IngestError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(rows) = value else {
        return Err(IngestError::NotATable("top-level value is not an array".into()));
    };
    let mut table = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        let Value::Array(cells) = row else {
            return Err(IngestError::NotATable(format!("row {} is not an array", idx + 1)));
        };
        let cells = cells
            .into_iter()
            .map(|cell| match cell {
                Value::Null => Ok(String::new()),
                Value::String(text) => Ok(text),
                Value::Bool(flag) => Ok(flag.to_string()),
                Value::Number(number) => Ok(number.to_string()),
                Value::Array(_) | Value::Object(_) => Err(IngestError::NotATable(format!(
                    "row {} contains a nested value",
                    idx + 1
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(first) = table.first().map(Vec::len)
            && first != cells.len()
        {
            return Err(IngestError::Ragged {
                row: idx + 1,
                expected: first,
                found: cells.len(),
            });
        }
        table.push(cells);
    }
    Ok(table)
}

/// Pads short rows with blanks and truncates long rows to the first row's width.
pub fn rectangularize(mut rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    for row in &mut rows {
        row.resize(width, String::new());
    }
    rows
}

/// Splits off (or synthesizes) the header row.
pub fn build_table(mut rows: Vec<Vec<String>>, header: Option<bool>) -> Result<Table, IngestError> {
    if rows.len() < 2 {
        return Err(IngestError::TooFewRows(rows.len()));
    }
    let has_header_row = header.unwrap_or_else(|| {
        let sample_end = rows.len().min(HEADER_DETECTION_SAMPLE_ROWS);
        detect_header_row(&rows[0], &rows[1..sample_end])
    });
    let headers = if has_header_row {
        dedupe_header_names(&rows.remove(0))
    } else {
        generate_field_names(rows[0].len())
    };
    debug!(
        "Header row {}; {} column(s)",
        if has_header_row { "detected" } else { "absent" },
        headers.len()
    );
    Ok(Table {
        headers,
        rows,
        has_header_row,
    })
}
