use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::identifiers::{quote_identifier, validate_identifier};
use crate::types::{AccessMode, Row};
use crate::{DataManager, DataResult};

/// Number of sample rows returned per table by [`discover_schema`].
pub const SAMPLE_ROWS: usize = 2;

const TABLES_SQL: &str = "SELECT table_schema, table_name, table_type
    FROM information_schema.tables
    WHERE table_schema NOT IN ('information_schema', 'pg_catalog')
    ORDER BY table_schema, table_name";

const COLUMNS_SQL: &str = "SELECT column_name, data_type, is_nullable
    FROM information_schema.columns
    WHERE table_schema = ? AND table_name = ?
    ORDER BY ordinal_position";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub table_type: String,
    pub columns: Vec<TableColumn>,
    pub sample_rows: usize,
    pub sample_data: Vec<Row>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub row_count: Option<i64>,
}

struct TableRef {
    schema: String,
    name: String,
    table_type: String,
}

impl TableRef {
    fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    fn quoted(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.name)
        )
    }
}

fn list_tables(data: &DataManager) -> DataResult<Vec<TableRef>> {
    let rows = data.execute(TABLES_SQL, &[], AccessMode::ReadOnly)?;
    Ok(rows
        .iter()
        .map(|row| TableRef {
            schema: text(row, "table_schema"),
            name: text(row, "table_name"),
            table_type: text(row, "table_type"),
        })
        .collect())
}

/// Columns of `schema.table` in ordinal order.
pub fn table_columns(data: &DataManager, schema: &str, table: &str) -> DataResult<Vec<TableColumn>> {
    validate_identifier(schema)?;
    validate_identifier(table)?;
    columns_of(data, schema, table)
}

fn columns_of(data: &DataManager, schema: &str, table: &str) -> DataResult<Vec<TableColumn>> {
    let rows = data.execute(
        COLUMNS_SQL,
        &[json!(schema), json!(table)],
        AccessMode::ReadOnly,
    )?;
    Ok(rows
        .iter()
        .map(|row| TableColumn {
            name: text(row, "column_name"),
            data_type: text(row, "data_type"),
            nullable: text(row, "is_nullable").eq_ignore_ascii_case("YES"),
        })
        .collect())
}

/// Every user table with its columns and a small data sample.
///
/// A table whose sample cannot be read is reported with an empty sample.
pub fn discover_schema(data: &DataManager) -> DataResult<Vec<TableSchema>> {
    let mut tables = Vec::new();
    for table in list_tables(data)? {
        let columns = columns_of(data, &table.schema, &table.name)?;
        let sample_sql = format!("SELECT * FROM {} LIMIT ?", table.quoted());
        let sample = data
            .execute(&sample_sql, &[json!(SAMPLE_ROWS + 1)], AccessMode::ReadOnly)
            .unwrap_or_default();

        tables.push(TableSchema {
            name: table.qualified(),
            table_type: table.table_type,
            columns,
            sample_rows: sample.len(),
            sample_data: sample.into_iter().take(SAMPLE_ROWS).collect(),
        });
    }
    Ok(tables)
}

/// Row counts for every user table.
pub fn table_info(data: &DataManager) -> DataResult<Vec<TableSummary>> {
    let mut summaries = Vec::new();
    for table in list_tables(data)? {
        let count_sql = format!("SELECT COUNT(*) AS total_rows FROM {}", table.quoted());
        let row_count = data
            .execute(&count_sql, &[], AccessMode::ReadOnly)
            .ok()
            .and_then(|rows| rows.first().and_then(|row| row.get("total_rows").cloned()))
            .and_then(|count| count.as_i64());
        summaries.push(TableSummary {
            name: table.qualified(),
            row_count,
        });
    }
    Ok(summaries)
}

fn text(row: &Row, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> DataManager {
        let dm = DataManager::in_memory();
        dm.execute_write("CREATE SCHEMA weather_data", &[]).expect("schema");
        dm.execute_write(
            "CREATE TABLE weather_data.london_weather(latitude DOUBLE NOT NULL, longitude DOUBLE, label VARCHAR)",
            &[],
        )
        .expect("create");
        dm.execute_write(
            "INSERT INTO weather_data.london_weather VALUES (51.5, -0.12, 'a'), (51.5, -0.12, 'b'), (51.5, -0.12, 'c')",
            &[],
        )
        .expect("insert");
        dm.execute_write("CREATE TABLE main.empty_table(x INTEGER)", &[])
            .expect("create empty");
        dm
    }

    #[test]
    fn discovers_tables_columns_and_samples() {
        let dm = seeded();
        let tables = discover_schema(&dm).expect("discover");
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["main.empty_table", "weather_data.london_weather"]);

        let weather = &tables[1];
        let columns: Vec<&str> = weather.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(columns, vec!["latitude", "longitude", "label"]);
        assert!(!weather.columns[0].nullable);
        assert!(weather.columns[1].nullable);
        assert_eq!(weather.columns[0].data_type, "DOUBLE");
        assert_eq!(weather.sample_data.len(), SAMPLE_ROWS);
        assert_eq!(weather.table_type, "BASE TABLE");

        assert!(tables[0].sample_data.is_empty());
    }

    #[test]
    fn table_info_counts_rows() {
        let dm = seeded();
        let info = table_info(&dm).expect("info");
        assert_eq!(info.len(), 2);
        assert_eq!(info[0].row_count, Some(0));
        assert_eq!(info[1].row_count, Some(3));
    }

    #[test]
    fn table_columns_rejects_bad_identifiers() {
        let dm = seeded();
        assert!(table_columns(&dm, "main", "x; DROP TABLE y").is_err());
    }
}
