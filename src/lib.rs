pub mod aggregate;
pub mod apply;
pub mod cli;
pub mod convert;
pub mod dataset;
pub mod detect;
pub mod ingest;
pub mod patterns;
pub mod report;
pub mod schema;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::cli::{Cli, Commands, InputArgs};
use crate::convert::ValueConverter;
use crate::dataset::Dataset;
use crate::detect::DetectorConfig;
use crate::ingest::{LoadOptions, Table};
use crate::patterns::NumberFormat;
use crate::schema::Schema;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("smart_columns", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Detect(args) => handle_detect(&args),
        Commands::Validate(args) => handle_validate(&args),
        Commands::Convert(args) => handle_convert(&args),
    }
}

fn reference_year(provided: Option<i32>) -> i32 {
    provided.unwrap_or_else(|| ValueConverter::default().reference_year())
}

fn load_input(args: &InputArgs) -> Result<Table> {
    let encoding = ingest::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Reading '{}' with delimiter '{}' and encoding {}",
        args.input.display(),
        printable_delimiter(ingest::resolve_input_delimiter(&args.input, args.delimiter)),
        encoding.name()
    );
    let options = LoadOptions {
        format: args.format,
        delimiter: args.delimiter,
        encoding,
        header: args.header_override(),
    };
    ingest::load_table(&args.input, &options)
        .with_context(|| format!("Loading table from {:?}", args.input))
}

fn handle_detect(args: &cli::DetectArgs) -> Result<()> {
    let table = load_input(&args.input)?;
    let config = DetectorConfig {
        sample_cap: args.sample_cap,
        reference_year: reference_year(args.input.reference_year),
    };
    debug!("Detector config: {config:?}");
    let result = aggregate::detect_formats(&table.rows, &config);

    let mut dataset = Dataset::from_rows(&table.headers, table.rows, config.reference_year);
    let application = dataset.apply_detection(&result)?;
    print!(
        "{}",
        report::render_detection(
            dataset.headers(),
            &result,
            application,
            &dataset.number_format()
        )
    );

    if let Some(path) = &args.schema {
        dataset
            .schema()
            .save(path)
            .with_context(|| format!("Writing schema to {path:?}"))?;
        info!(
            "Schema for {} column(s) written to {path:?}",
            dataset.headers().len()
        );
    }
    Ok(())
}

fn handle_validate(args: &cli::ValidateArgs) -> Result<()> {
    let schema = Schema::load(&args.schema)
        .with_context(|| format!("Loading schema from {:?}", args.schema))?;
    let table = load_input(&args.input)?;
    schema.validate_headers(&table.headers)?;

    let converter = ValueConverter::new(reference_year(args.input.reference_year));
    let dataset = Dataset::from_schema(&schema, table.rows, converter)?;
    let invalid = dataset.invalid_cells();
    let shown = if args.limit == 0 {
        invalid.len()
    } else {
        args.limit.min(invalid.len())
    };
    for (row_number, column) in &invalid[..shown] {
        let name = &dataset.headers()[*column].name;
        let raw = dataset
            .raw_value(row_number - 1, *column)
            .unwrap_or_default();
        println!("{}", report::describe_invalid_cell(*row_number, name, raw));
    }

    if !invalid.is_empty() {
        bail!(
            "{} invalid cell(s) across {} row(s)",
            invalid.len(),
            dataset.errors().row_count()
        );
    }
    info!(
        "All {} row(s) of {:?} conform to the schema",
        dataset.data().len(),
        args.input.input
    );
    Ok(())
}

fn handle_convert(args: &cli::ConvertArgs) -> Result<()> {
    let thousands = cli::parse_separator(&args.thousands).map_err(|err| anyhow!(err))?;
    let number_format = NumberFormat::new(thousands, args.decimal);
    let converter = ValueConverter::new(reference_year(args.reference_year));
    let result = converter.convert(
        args.column_type,
        &args.value,
        Some(&number_format),
        args.date_format,
    );
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Serializing conversion result")?
        );
        return Ok(());
    }
    if !result.ok {
        bail!("Cannot convert '{}' to {}", args.value, args.column_type);
    }
    println!("{}", result.value);
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
