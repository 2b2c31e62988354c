use polars::prelude::*;
use prepcast::data::{Cell, DataLoader};
use prepcast::validate;
use std::io::Write;
use tempfile::NamedTempFile;

fn create_prep_log() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Item,Qty Prepped,Qty Sold,Date,WeatherOpt").unwrap();
    writeln!(file, "Soup,40,35,2024-03-01,Sunny").unwrap();
    writeln!(file, "Salad,30,12,2024-03-01,").unwrap();
    writeln!(file, "Soup,40,38,03/02/2024,Rain").unwrap();
    writeln!(file, "Pasta,ten,8,2024-03-02,Rain").unwrap();
    file
}

#[test]
fn test_data_loader_from_csv() {
    let file = create_prep_log();
    let table = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(table.len(), 4);
    assert_eq!(table.column_index("Qty Sold"), Some(2));
    // Case-sensitive header matching
    assert_eq!(table.column_index("qty sold"), None);
    assert_eq!(table.rows()[1][4], Cell::Empty);
}

#[test]
fn test_csv_rows_flow_into_validation() {
    let file = create_prep_log();
    let table = DataLoader::from_csv(file.path()).unwrap();
    let result = validate(&table);

    assert!(result.is_valid());
    assert_eq!(result.dataset().len(), 3);
    assert_eq!(result.row_errors().len(), 1);
    assert_eq!(result.row_errors()[0].row_index, 3);

    let salad = &result.dataset().records()[1];
    assert_eq!(salad.weather, None);
    assert_eq!(result.dataset().records()[2].date.to_string(), "2024-03-02");
}

#[test]
fn test_byte_order_mark_and_ragged_rows() {
    let csv = "\u{feff}Item,Qty Prepped,Qty Sold,Date,WeatherOpt\nSoup,10,5,2024-03-01\n";
    let table = DataLoader::from_csv_reader(csv.as_bytes()).unwrap();

    assert_eq!(table.headers()[0], "Item");
    assert_eq!(table.rows()[0].len(), 4);

    let result = validate(&table);
    assert!(!result.is_valid());
    assert_eq!(result.row_errors().len(), 1);
}

#[test]
fn test_oversold_rows_are_kept_and_flagged() {
    let csv = "Item,Qty Prepped,Qty Sold,Date,WeatherOpt\nSoup,10,12,2024-03-01,Sunny\n";
    let result = validate(&DataLoader::from_csv_reader(csv.as_bytes()).unwrap());

    assert!(result.is_valid());
    assert!(result.dataset().records()[0].oversold());
    assert_eq!(result.summary().oversold_rows, 1);
}

#[test]
fn test_data_loader_from_dataframe() {
    let df = df!(
        "Item" => &["Soup", "Salad"],
        "Qty Prepped" => &[40.0, 30.0],
        "Qty Sold" => &[35.0, 12.0],
        "Date" => &["2024-03-01", "2024-03-01"],
        "WeatherOpt" => &[Some("Sunny"), None]
    )
    .unwrap();

    let table = DataLoader::from_dataframe(&df).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.rows()[0][1], Cell::Number(40.0));
    assert_eq!(table.rows()[1][4], Cell::Empty);

    let result = validate(&table);
    assert!(result.is_valid());
    assert_eq!(result.dataset().len(), 2);
}

#[test]
fn test_data_loader_error_handling() {
    assert!(DataLoader::from_csv("nonexistent_file.csv").is_err());
}
