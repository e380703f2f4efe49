mod common;

use common::{SALES_CSV, TestWorkspace, rows};
use proptest::prelude::*;
use smart_columns::aggregate::{DetectionResult, FormatConfidence, detect_formats};
use smart_columns::convert::{ParsedValue, ValueConverter};
use smart_columns::dataset::Dataset;
use smart_columns::detect::{DetectorConfig, analyze_column};
use smart_columns::ingest::{LoadOptions, load_table};
use smart_columns::patterns::{DateFormat, NumberFormat};
use smart_columns::schema::{ColumnType, Schema};

fn config() -> DetectorConfig {
    DetectorConfig::with_reference_year(2024)
}

#[test]
fn space_grouped_comma_decimal_column_round_trips() {
    let values = ["1 234,50", "2 000,00", "500,75"];
    let analysis = analyze_column(values, &config());
    assert_eq!(analysis.column_type, ColumnType::Number);
    let format = analysis.number_format().expect("number format");
    assert_eq!(format, NumberFormat::new(Some(' '), ','));

    let converter = ValueConverter::new(2024);
    let result = converter.convert(ColumnType::Number, "1 234,50", Some(&format), None);
    assert!(result.ok);
    assert_eq!(result.value, "1234.5");
    assert!(result.changed);
}

#[test]
fn loaded_table_is_classified_and_validated() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("sales.csv", SALES_CSV);
    let table = load_table(&path, &LoadOptions::default()).expect("load table");
    assert_eq!(table.headers, vec!["date", "amount", "label"]);

    let result = detect_formats(&table.rows, &config());
    assert_eq!(
        result.column_types,
        vec![ColumnType::Date, ColumnType::Number, ColumnType::Text]
    );
    assert_eq!(result.date_format, DateFormat::DmySlash);
    assert_eq!(result.number_format, NumberFormat::new(Some(','), '.'));

    let mut dataset = Dataset::from_rows(&table.headers, table.rows, 2024);
    let application = dataset.apply_detection(&result).expect("apply detection");
    assert!(application.apply_date_format);
    assert!(application.apply_number_format);
    assert!(dataset.invalid_cells().is_empty());
    assert_eq!(dataset.typed_value(2, 1), Some(&ParsedValue::Number(12000.0)));
    let christmas = dataset
        .typed_value(0, 0)
        .and_then(ParsedValue::as_date)
        .expect("parsed date");
    assert_eq!(christmas.to_string(), "2024-12-25 00:00:00");
    assert_eq!(dataset.typed_value(0, 2), None);
}

#[test]
fn saved_schema_restores_the_same_session() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("sales.csv", SALES_CSV);
    let table = load_table(&path, &LoadOptions::default()).expect("load table");
    let mut dataset = Dataset::from_rows(&table.headers, table.rows.clone(), 2024);
    dataset
        .apply_detection(&detect_formats(&table.rows, &config()))
        .expect("apply detection");

    let schema_path = workspace.path().join("sales.yml");
    dataset.schema().save(&schema_path).expect("save schema");
    let schema = Schema::load(&schema_path).expect("load schema");
    assert_eq!(schema, dataset.schema());

    let mut edited = table.rows;
    edited[1][1] = "n/a".to_string();
    let restored =
        Dataset::from_schema(&schema, edited, ValueConverter::new(2024)).expect("restore");
    assert_eq!(restored.invalid_cells(), vec![(2, 1)]);
}

#[test]
fn low_confidence_columns_stay_text_after_application() {
    let data = rows(&[&["12"], &["abc"], &["7"]]);
    let mut dataset = Dataset::from_rows(&["mixed".to_string()], data, 2024);
    let result = DetectionResult {
        date_format: DateFormat::Ymd,
        number_format: NumberFormat::default(),
        column_types: vec![ColumnType::Number],
        column_date_formats: vec![None],
        confidence: FormatConfidence {
            date_format: 0.0,
            number_format: 0.6,
            columns: vec![0.6],
        },
    };
    let application = dataset.apply_detection(&result).expect("apply detection");
    assert_eq!(dataset.headers()[0].column_type, ColumnType::Text);
    assert!(!application.apply_number_format);
    assert!(dataset.invalid_cells().is_empty());
    assert!(dataset.parsed_values().is_empty());
}

#[test]
fn switching_the_dataset_number_format_rechecks_number_columns() {
    let data = rows(&[&["1.234,5", "x"], &["2.000", "y"], &["17", "z"]]);
    let names = vec!["amount".to_string(), "note".to_string()];
    let mut dataset = Dataset::from_rows(&names, data, 2024);
    dataset
        .set_column_type(0, ColumnType::Number)
        .expect("set type");
    assert_eq!(dataset.invalid_cells(), vec![(1, 0)]);
    assert_eq!(dataset.typed_value(1, 0), Some(&ParsedValue::Number(2.0)));

    dataset
        .set_number_format(NumberFormat::new(Some('.'), ','))
        .expect("set number format");
    assert!(dataset.invalid_cells().is_empty());
    assert_eq!(dataset.typed_value(0, 0), Some(&ParsedValue::Number(1234.5)));
    assert_eq!(dataset.typed_value(1, 0), Some(&ParsedValue::Number(2000.0)));
    assert_eq!(dataset.headers()[1].column_type, ColumnType::Text);
}

fn number_format_strategy() -> impl Strategy<Value = NumberFormat> {
    prop_oneof![
        Just(NumberFormat::new(Some(','), '.')),
        Just(NumberFormat::new(Some('.'), ',')),
        Just(NumberFormat::new(Some(' '), ',')),
        Just(NumberFormat::new(None, '.')),
    ]
}

proptest! {
    #[test]
    fn revalidation_errors_match_conversion_failures(
        cells in proptest::collection::vec("[0-9 .,a-]{0,9}", 1..25),
        format in number_format_strategy(),
    ) {
        let data: Vec<Vec<String>> = cells.iter().map(|cell| vec![cell.clone(), "x".to_string()]).collect();
        let names = vec!["value".to_string(), "other".to_string()];
        let mut dataset = Dataset::from_rows(&names, data, 2024);
        // Seed stale entries under a different format first.
        dataset
            .revalidate_column(0, ColumnType::Date, None, Some(DateFormat::Ymd))
            .expect("seed");
        dataset
            .revalidate_column(0, ColumnType::Number, Some(&format), None)
            .expect("revalidate");

        let converter = ValueConverter::new(2024);
        for (row, cell) in cells.iter().enumerate() {
            let ok = converter.convert(ColumnType::Number, cell, Some(&format), None).ok;
            prop_assert_eq!(dataset.errors().contains(row + 1, 0), !ok);
            prop_assert_eq!(dataset.typed_value(row, 0).is_some(), ok && !cell.trim().is_empty());
        }
    }
}
