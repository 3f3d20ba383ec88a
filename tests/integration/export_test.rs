//! Export requests end to end.

use super::common::{shop_connector, shop_service, SHOP};
use chrono::{NaiveDate, TimeZone, Utc};
use db_query::config::LimitsConfig;
use db_query::db::{CanonicalType, ColumnInfo, Value};
use db_query::error::AppError;
use db_query::export::{ExportEngine, ExportFormat};
use db_query::query::QueryResultSet;
use db_query::service::ExportSource;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::json;
use std::io::Read;

const BOM: &[u8] = b"\xEF\xBB\xBF";

fn users_sql() -> ExportSource {
    ExportSource::Sql("SELECT * FROM users".to_string())
}

#[tokio::test]
async fn test_csv_export() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let output = service
        .export(SHOP, users_sql(), ExportFormat::Csv)
        .await
        .unwrap();

    assert_eq!(output.mime_type, "text/csv; charset=utf-8");
    assert!(output.bytes.starts_with(BOM));
    let text = std::str::from_utf8(&output.bytes[BOM.len()..]).unwrap();
    assert_eq!(
        text,
        "id,email,active,created_at\r\n\
         1,ada@example.com,true,2024-03-01T09:30:00+00:00\r\n\
         2,\"bob, \"\"the builder\"\"\",,\r\n"
    );
}

#[tokio::test]
async fn test_json_export_keeps_types_and_order() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let output = service
        .export(SHOP, users_sql(), ExportFormat::Json)
        .await
        .unwrap();

    let text = String::from_utf8(output.bytes).unwrap();
    assert!(text.starts_with("[\n  {\n    \"id\": 1,"));
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        parsed[1],
        json!({
            "id": 2,
            "email": "bob, \"the builder\"",
            "active": null,
            "created_at": null
        })
    );
}

#[tokio::test]
async fn test_excel_export() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let output = service
        .export(SHOP, users_sql(), ExportFormat::Excel)
        .await
        .unwrap();

    assert!(output.bytes.starts_with(b"PK"));
    assert!(output.filename.ends_with(".xlsx"));
    assert_eq!(
        output.mime_type,
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
}

#[tokio::test]
async fn test_sql_export_over_limit_fails() {
    let connector = shop_connector();
    let limits = LimitsConfig {
        export_row_limit: 1,
        ..LimitsConfig::default()
    };
    let service = shop_service(&connector).with_limits(&limits);

    let err = service
        .export(SHOP, users_sql(), ExportFormat::Csv)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ExportTooLarge { limit: 1, actual: 2 }));
    assert_eq!(err.details().unwrap(), json!({"limit": 1, "actual": 2}));
}

#[tokio::test]
async fn test_forbidden_sql_is_never_exported() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let err = service
        .export(
            SHOP,
            ExportSource::Sql("DELETE FROM users".to_string()),
            ExportFormat::Json,
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "FORBIDDEN_STATEMENT");
    assert_eq!(connector.open_count(), 0);
}

#[tokio::test]
async fn test_client_held_result_with_duplicate_names() {
    let connector = shop_connector();
    let service = shop_service(&connector);
    let result = QueryResultSet::from_json(&json!({
        "columns": ["name", "name", "joined"],
        "rows": [["Zoë", "Zoë B.", "2024-01-02"]],
        "rowCount": 1,
        "executionTime": 3.5
    }))
    .unwrap();

    let output = service
        .export("client/side", ExportSource::ResultSet(result), ExportFormat::Json)
        .await
        .unwrap();

    let text = String::from_utf8(output.bytes).unwrap();
    assert!(text.contains("\"Zoë\""));
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        parsed,
        json!([{"name": "Zoë", "name_1": "Zoë B.", "joined": "2024-01-02"}])
    );
    assert!(output.filename.starts_with("clientside_"));
    assert_eq!(connector.open_count(), 0);
}

#[test]
fn test_filename_shape() {
    let result = QueryResultSet::default();
    let output = ExportEngine::default()
        .export(&result, ExportFormat::Json, "sales db!")
        .unwrap();

    assert_eq!(output.bytes, b"[]");
    let stem = output.filename.strip_suffix(".json").unwrap();
    let (name, stamp) = stem.split_once('_').unwrap();
    assert_eq!(name, "salesdb");
    assert_eq!(stamp.len(), 15);
    assert_eq!(stamp.as_bytes()[8], b'T');
    assert!(stamp
        .chars()
        .enumerate()
        .all(|(i, c)| i == 8 || c.is_ascii_digit()));
}

#[test]
fn test_unsupported_format() {
    let err = "pdf".parse::<ExportFormat>().unwrap_err();

    assert_eq!(err.code(), "UNSUPPORTED_FORMAT");
    assert_eq!(
        err.details().unwrap()["supported"],
        json!(["csv", "json", "excel"])
    );
    assert_eq!("XLSX".parse::<ExportFormat>().unwrap(), ExportFormat::Excel);
}

fn xlsx_part(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut text = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    text
}

fn repeated_id_result() -> QueryResultSet {
    QueryResultSet {
        columns: vec![
            ColumnInfo::new("id", "int4", CanonicalType::Integer),
            ColumnInfo::new("name", "text", CanonicalType::Text),
            ColumnInfo::new("id", "int4", CanonicalType::Integer),
        ],
        rows: vec![vec![Value::Int(1), Value::from("ada"), Value::Int(10)]],
        ..Default::default()
    }
}

#[test]
fn test_engine_renames_repeated_columns_in_every_format() {
    let engine = ExportEngine::default();
    let result = repeated_id_result();

    let csv = engine.export(&result, ExportFormat::Csv, "app").unwrap();
    assert_eq!(&csv.bytes[BOM.len()..], b"id,name,id_1\r\n1,ada,10\r\n");

    let json = engine.export(&result, ExportFormat::Json, "app").unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&json.bytes).unwrap();
    assert_eq!(parsed, json!([{"id": 1, "name": "ada", "id_1": 10}]));

    let excel = engine.export(&result, ExportFormat::Excel, "app").unwrap();
    let strings = xlsx_part(&excel.bytes, "xl/sharedStrings.xml");
    assert!(strings.contains("<t>id_1</t>"));
    let sheet = xlsx_part(&excel.bytes, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains("<c r=\"C1\""));
    assert!(sheet.contains("<v>10</v>"));

    // The result set itself keeps the names it came with.
    assert_eq!(result.column_names(), vec!["id", "name", "id"]);
}

#[test]
fn test_json_export_reads_back_cell_for_cell() {
    let day = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
    let at = day.and_hms_opt(8, 30, 0).unwrap();
    let at_utc = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    let result = QueryResultSet {
        columns: vec![
            ColumnInfo::new("n", "int8", CanonicalType::Integer),
            ColumnInfo::new("ratio", "float8", CanonicalType::Floating),
            ColumnInfo::new("price", "numeric", CanonicalType::Decimal),
            ColumnInfo::new("ok", "bool", CanonicalType::Boolean),
            ColumnInfo::new("gone", "text", CanonicalType::Text),
            ColumnInfo::new("day", "date", CanonicalType::Date),
            ColumnInfo::new("at", "timestamp", CanonicalType::Datetime),
            ColumnInfo::new("at_utc", "timestamptz", CanonicalType::Datetime),
        ],
        rows: vec![
            vec![
                Value::Int(-7),
                Value::Float(2.5),
                Value::Decimal(Decimal::new(1999, 2)),
                Value::Bool(true),
                Value::Null,
                Value::Date(day),
                Value::Timestamp(at),
                Value::TimestampTz(at_utc),
            ],
            vec![
                Value::Int(9_007_199_254_740_993),
                Value::Float(-0.125),
                Value::Decimal(Decimal::new(5, 0)),
                Value::Bool(false),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
            ],
        ],
        ..Default::default()
    };

    let output = ExportEngine::default()
        .export(&result, ExportFormat::Json, "app")
        .unwrap();
    let text = String::from_utf8(output.bytes).unwrap();
    let records: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(&text).unwrap();

    assert_eq!(records.len(), result.row_count());
    let names = result.column_names();
    for record in &records {
        let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
        let mut expected = names.clone();
        keys.sort_unstable();
        expected.sort_unstable();
        assert_eq!(keys, expected);
    }
    // Keys are written in column order.
    let positions: Vec<usize> = names
        .iter()
        .map(|name| text.find(&format!("\"{name}\":")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

    assert_eq!(
        serde_json::Value::Object(records[0].clone()),
        json!({
            "n": -7,
            "ratio": 2.5,
            "price": 19.99,
            "ok": true,
            "gone": null,
            "day": "2024-01-31",
            "at": "2024-01-31T08:30:00",
            "at_utc": "2024-03-01T09:30:00+00:00"
        })
    );
    assert_eq!(records[1]["n"], json!(9_007_199_254_740_993_i64));

    // Loading the export again yields the original cells.
    let rows: Vec<serde_json::Value> = records
        .iter()
        .map(|record| json!(names.iter().map(|n| record[*n].clone()).collect::<Vec<_>>()))
        .collect();
    let reloaded = QueryResultSet::from_json(&json!({"columns": names, "rows": rows})).unwrap();

    assert_eq!(reloaded.column_names(), names);
    assert_eq!(reloaded.row_count(), 2);
    for (row, original) in reloaded.rows.iter().zip(&result.rows) {
        for (index, (cell, expected)) in row.iter().zip(original).enumerate() {
            match expected {
                Value::Decimal(d) => assert_eq!(cell.to_text(), d.normalize().to_string()),
                _ => assert_eq!(cell, expected, "column {}", names[index]),
            }
        }
    }
}
