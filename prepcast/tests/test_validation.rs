use pretty_assertions::assert_eq;
use prepcast::data::RawTable;
use prepcast::error::SchemaError;
use prepcast::validation::REQUIRED_COLUMNS;
use prepcast::{validate, PipelineConfig, PipelineSession, PipelineStage};
use rstest::rstest;

const HEADERS: [&str; 5] = ["Item", "Qty Prepped", "Qty Sold", "Date", "WeatherOpt"];

fn without(column: &str) -> RawTable {
    let headers: Vec<&str> = HEADERS.iter().copied().filter(|h| *h != column).collect();
    let row: Vec<&str> = HEADERS
        .iter()
        .zip(["Soup", "10", "8", "2024-03-01", "Sunny"])
        .filter(|(h, _)| **h != column)
        .map(|(_, v)| v)
        .collect();
    RawTable::from_strings(&headers, &[row.as_slice()])
}

#[rstest]
#[case("Item")]
#[case("Qty Prepped")]
#[case("Qty Sold")]
#[case("Date")]
#[case("WeatherOpt")]
fn test_each_missing_column_is_reported(#[case] column: &str) {
    let result = validate(&without(column));

    assert!(!result.is_valid());
    assert_eq!(
        result.column_errors(),
        &[SchemaError::MissingColumn(column.to_string())]
    );
    // No partial dataset on a blocking error
    assert!(result.dataset().is_empty());
}

#[test]
fn test_missing_columns_reported_once_each() {
    let table = RawTable::from_strings(&["Item", "Qty Sold"], &[&["Soup", "3"]]);
    let result = validate(&table);

    let missing: Vec<String> = result
        .column_errors()
        .iter()
        .map(|e| e.to_string())
        .collect();
    assert_eq!(
        missing,
        vec![
            "Missing required column: Qty Prepped",
            "Missing required column: Date",
            "Missing required column: WeatherOpt",
        ]
    );
}

#[test]
fn test_missing_date_keeps_pipeline_awaiting_upload() {
    let mut session = PipelineSession::new(PipelineConfig::default()).unwrap();
    let result = session.submit_upload(&without("Date")).unwrap();

    assert_eq!(
        result.column_errors(),
        &[SchemaError::MissingColumn("Date".to_string())]
    );
    assert_eq!(session.stage(), PipelineStage::AwaitingUpload);
    assert!(session.dataset().is_none());
}

#[test]
fn test_dataset_length_is_rows_minus_row_errors() {
    let table = RawTable::from_strings(
        &HEADERS,
        &[
            &["Soup", "10", "8", "2024-03-01", "Sunny"],
            &["Soup", "-1", "8", "2024-03-02", "Sunny"],
            &["Soup", "10", "abc", "2024-03-03", "Sunny"],
            &["", "10", "8", "2024-03-04", "Sunny"],
            &["Soup", "10", "8", "not a date", "Sunny"],
            &["Soup", "10", "8", "2024-03-06", ""],
        ],
    );
    let result = validate(&table);

    assert!(result.is_valid());
    assert_eq!(result.dataset().len(), table.len() - result.row_errors().len());
    let rejected: Vec<usize> = result.row_errors().iter().map(|e| e.row_index).collect();
    assert_eq!(rejected, vec![1, 2, 3, 4]);
}

#[test]
fn test_zero_usable_rows_is_invalid() {
    let table = RawTable::from_strings(&HEADERS, &[&["Soup", "x", "y", "z", ""]]);
    let result = validate(&table);

    assert!(!result.is_valid());
    assert_eq!(result.column_errors(), &[SchemaError::EmptyDataset]);
    assert_eq!(result.row_errors().len(), 1);

    let empty = validate(&RawTable::from_strings(&REQUIRED_COLUMNS, &[]));
    assert_eq!(empty.column_errors(), &[SchemaError::EmptyDataset]);
}

#[test]
fn test_extra_and_reordered_columns() {
    let table = RawTable::from_strings(
        &["Notes", "Date", "WeatherOpt", "Item", "Qty Sold", "Qty Prepped"],
        &[&["late delivery", "2024-03-01", "Cloudy", "Soup", "4", "9"]],
    );
    let result = validate(&table);

    assert!(result.is_valid());
    let record = &result.dataset().records()[0];
    assert_eq!(record.quantity_prepped, 9.0);
    assert_eq!(record.quantity_sold, 4.0);
    assert_eq!(record.weather.as_deref(), Some("Cloudy"));
}
