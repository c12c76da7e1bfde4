use serde::Serialize;
use serde_json::Value;

use crate::identifiers::{quote_identifier, validate_table_name};
use crate::types::AccessMode;
use crate::{DataManager, DataResult};

pub const DEFAULT_QUALITY_TABLE: &str = "weather_data.london_weather";

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub table: String,
    pub total_rows: i64,
    pub columns: Vec<ColumnQuality>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnQuality {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(flatten)]
    pub outcome: ColumnOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ColumnOutcome {
    Stats {
        non_null_count: i64,
        null_count: i64,
        null_percentage: f64,
        distinct_values: i64,
    },
    Failed {
        error: String,
    },
}

/// Completeness metrics for every column of `table_name`.
///
/// A column whose statistics cannot be computed is reported with its error
/// instead of failing the whole report.
pub fn analyze_table(data: &DataManager, table_name: &str) -> DataResult<QualityReport> {
    validate_table_name(table_name)?;

    let count_sql = format!("SELECT COUNT(*) AS total_rows FROM {table_name}");
    let total_rows = data
        .execute(&count_sql, &[], AccessMode::ReadOnly)?
        .first()
        .and_then(|row| row.get("total_rows"))
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let mut columns = Vec::new();
    for (name, column_type) in describe_columns(data, table_name)? {
        let outcome = match column_stats(data, table_name, &name, total_rows) {
            Ok(stats) => stats,
            Err(err) => ColumnOutcome::Failed {
                error: err.to_string(),
            },
        };
        columns.push(ColumnQuality {
            name,
            column_type,
            outcome,
        });
    }

    Ok(QualityReport {
        table: table_name.to_string(),
        total_rows,
        columns,
    })
}

/// `(name, type)` pairs from `DESCRIBE`, falling back to the keys of one
/// sample row with an unknown type.
fn describe_columns(data: &DataManager, table_name: &str) -> DataResult<Vec<(String, String)>> {
    let describe_sql = format!("DESCRIBE {table_name}");
    if let Ok(rows) = data.execute(&describe_sql, &[], AccessMode::ReadOnly) {
        return Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get("column_name").and_then(Value::as_str)?;
                let column_type = row
                    .get("column_type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                Some((name.to_string(), column_type.to_string()))
            })
            .collect());
    }

    let sample_sql = format!("SELECT * FROM {table_name} LIMIT 1");
    let sample = data.execute(&sample_sql, &[], AccessMode::ReadOnly)?;
    Ok(sample
        .first()
        .map(|row| {
            row.keys()
                .map(|key| (key.clone(), "unknown".to_string()))
                .collect()
        })
        .unwrap_or_default())
}

fn column_stats(
    data: &DataManager,
    table_name: &str,
    column: &str,
    total_rows: i64,
) -> DataResult<ColumnOutcome> {
    let quoted = quote_identifier(column);
    let sql = format!(
        "SELECT COUNT({quoted}) AS non_null_count, \
                COUNT(*) - COUNT({quoted}) AS null_count, \
                COUNT(DISTINCT {quoted}) AS distinct_values \
         FROM {table_name}"
    );
    let rows = data.execute(&sql, &[], AccessMode::ReadOnly)?;
    let stat = |key: &str| {
        rows.first()
            .and_then(|row| row.get(key))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };
    let null_count = stat("null_count");

    Ok(ColumnOutcome::Stats {
        non_null_count: stat("non_null_count"),
        null_count,
        null_percentage: null_percentage(null_count, total_rows),
        distinct_values: stat("distinct_values"),
    })
}

fn null_percentage(null_count: i64, total_rows: i64) -> f64 {
    if total_rows <= 0 {
        return 0.0;
    }
    let pct = null_count as f64 / total_rows as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
