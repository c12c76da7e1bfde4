use chrono::{NaiveDateTime, Utc};
use duckwx_engine::identifiers::{quote_identifier, validate_identifier};
use duckwx_engine::{AccessMode, DataManager, Session};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{IngestError, IngestResult, WeatherSource};

/// Separator between parent and child keys in flattened column names.
pub const NESTING_SEPARATOR: &str = "__";

const LOAD_ID_COLUMN: &str = "_load_id";
const LOADED_AT_COLUMN: &str = "_loaded_at";

// The last entry is the normalized form, so typing still works after
// `normalize` has rewritten a value.
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

pub type Record = IndexMap<String, Value>;

#[derive(Debug, Clone, Serialize)]
pub struct LoadInfo {
    pub load_id: String,
    pub table: String,
    pub rows_loaded: usize,
    pub hourly_table: String,
    pub hourly_rows_loaded: usize,
    pub columns_added: Vec<String>,
}

/// Flattens nested objects into `parent__child` columns.
///
/// Only scalar leaves are kept; arrays belong to child tables.
pub fn flatten_record(payload: &Value) -> IngestResult<Record> {
    let Value::Object(fields) = payload else {
        return Err(IngestError::Payload("record must be a JSON object".into()));
    };
    let mut record = Record::new();
    flatten_into(&mut record, None, fields);
    Ok(record)
}

fn flatten_into(record: &mut Record, prefix: Option<&str>, fields: &serde_json::Map<String, Value>) {
    for (key, value) in fields {
        let name = match prefix {
            Some(prefix) => format!("{prefix}{NESTING_SEPARATOR}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => flatten_into(record, Some(&name), nested),
            Value::Array(_) => {}
            scalar => {
                record.insert(name, normalize(scalar));
            }
        }
    }
}

/// One row per hourly timestamp, zipping the parallel `hourly` arrays.
pub fn hourly_rows(payload: &Value) -> Vec<Record> {
    let Some(Value::Object(hourly)) = payload.get("hourly") else {
        return Vec::new();
    };
    let series: Vec<(&String, &Vec<Value>)> = hourly
        .iter()
        .filter_map(|(key, value)| value.as_array().map(|values| (key, values)))
        .collect();
    let len = series.iter().map(|(_, values)| values.len()).max().unwrap_or(0);

    (0..len)
        .map(|index| {
            series
                .iter()
                .map(|(key, values)| {
                    let value = values.get(index).map(normalize).unwrap_or(Value::Null);
                    ((*key).clone(), value)
                })
                .collect()
        })
        .collect()
}

/// Writes one forecast document into `<dataset>.<resource>` and its hourly
/// child table in one transaction under a single write session. A failed load
/// leaves no partial rows or tables behind.
pub fn load_forecast(
    data: &DataManager,
    source: &WeatherSource,
    payload: &Value,
) -> IngestResult<LoadInfo> {
    validate_identifier(&source.dataset)?;
    validate_identifier(&source.resource)?;

    let record = flatten_record(payload)?;
    let hourly = hourly_rows(payload);
    let now = Utc::now();
    let load_id = format!("{}", now.timestamp_micros());
    let loaded_at = now.format("%Y-%m-%d %H:%M:%S%.6f").to_string();

    let hourly_resource = source.hourly_resource();
    let session = data.acquire_session(AccessMode::ReadWrite)?;
    session.execute("BEGIN TRANSACTION", &[])?;
    let written = write_forecast(
        &session,
        source,
        &hourly_resource,
        &record,
        &hourly,
        &load_id,
        &loaded_at,
    );
    let columns_added = match written {
        Ok(columns_added) => {
            session.execute("COMMIT", &[])?;
            columns_added
        }
        Err(err) => {
            if let Err(rollback) = session.execute("ROLLBACK", &[]) {
                warn!(error = %rollback, "rollback after failed load also failed");
            }
            return Err(err);
        }
    };
    drop(session);

    let info = LoadInfo {
        load_id,
        table: source.table(),
        rows_loaded: 1,
        hourly_table: format!("{}.{}", source.dataset, hourly_resource),
        hourly_rows_loaded: hourly.len(),
        columns_added,
    };
    info!(
        table = %info.table,
        hourly_rows = info.hourly_rows_loaded,
        load_id = %info.load_id,
        "weather data loaded"
    );
    Ok(info)
}

/// Everything `load_forecast` writes, run inside its transaction.
fn write_forecast(
    session: &Session<'_>,
    source: &WeatherSource,
    hourly_resource: &str,
    record: &Record,
    hourly: &[Record],
    load_id: &str,
    loaded_at: &str,
) -> IngestResult<Vec<String>> {
    session.execute(
        &format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_identifier(&source.dataset)
        ),
        &[],
    )?;

    let mut columns_added = ensure_table(session, &source.dataset, &source.resource, &[record])?;
    insert_rows(
        session,
        &source.dataset,
        &source.resource,
        std::slice::from_ref(record),
        load_id,
        loaded_at,
    )?;

    if !hourly.is_empty() {
        let refs: Vec<&Record> = hourly.iter().collect();
        columns_added.extend(ensure_table(session, &source.dataset, hourly_resource, &refs)?);
        insert_rows(session, &source.dataset, hourly_resource, hourly, load_id, loaded_at)?;
    }
    Ok(columns_added)
}

/// Creates the table or adds the columns it is missing. Returns the names of
/// the columns added to an existing table.
fn ensure_table(
    session: &Session<'_>,
    dataset: &str,
    table: &str,
    records: &[&Record],
) -> IngestResult<Vec<String>> {
    let existing: Vec<String> = session
        .execute(
            "SELECT column_name FROM information_schema.columns
             WHERE table_schema = ? AND table_name = ?
             ORDER BY ordinal_position",
            &[json!(dataset), json!(table)],
        )?
        .iter()
        .filter_map(|row| row.get("column_name").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    let wanted = column_types(records);
    let target = qualified(dataset, table);
    if existing.is_empty() {
        let mut definitions: Vec<String> = wanted
            .iter()
            .map(|(name, kind)| format!("{} {kind}", quote_identifier(name)))
            .collect();
        definitions.push(format!("{LOAD_ID_COLUMN} VARCHAR"));
        definitions.push(format!("{LOADED_AT_COLUMN} TIMESTAMP"));
        session.execute(
            &format!("CREATE TABLE {target} ({})", definitions.join(", ")),
            &[],
        )?;
        return Ok(Vec::new());
    }

    let mut added = Vec::new();
    for (name, kind) in wanted {
        if existing.iter().any(|column| column == name) {
            continue;
        }
        session.execute(
            &format!(
                "ALTER TABLE {target} ADD COLUMN {} {kind}",
                quote_identifier(name)
            ),
            &[],
        )?;
        added.push(format!("{table}.{name}"));
    }
    Ok(added)
}

fn insert_rows(
    session: &Session<'_>,
    dataset: &str,
    table: &str,
    records: &[Record],
    load_id: &str,
    loaded_at: &str,
) -> IngestResult<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let names: Vec<&String> = first.keys().collect();
    let mut columns: Vec<String> = names.iter().map(|name| quote_identifier(name)).collect();
    columns.push(LOAD_ID_COLUMN.to_string());
    columns.push(LOADED_AT_COLUMN.to_string());

    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let mut params = Vec::with_capacity(records.len() * columns.len());
    for record in records {
        for name in &names {
            params.push(record.get(*name).cloned().unwrap_or(Value::Null));
        }
        params.push(json!(load_id));
        params.push(json!(loaded_at));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualified(dataset, table),
        columns.join(", "),
        vec![placeholders; records.len()].join(", ")
    );
    session.execute(&sql, &params)?;
    Ok(())
}

fn qualified(dataset: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(dataset), quote_identifier(table))
}

/// Column types across `records`, in first-seen order.
///
/// Nulls carry no type. Columns whose values disagree widen to VARCHAR, and
/// columns with no non-null value default to it.
fn column_types<'r>(records: &[&'r Record]) -> IndexMap<&'r str, &'static str> {
    let mut seen: IndexMap<&str, Option<&'static str>> = IndexMap::new();
    for record in records {
        for (name, value) in record.iter() {
            let entry = seen.entry(name.as_str()).or_insert(None);
            if value.is_null() {
                continue;
            }
            let kind = sql_type(value);
            *entry = match *entry {
                None => Some(kind),
                Some(current) if current == kind => Some(current),
                Some(_) => Some("VARCHAR"),
            };
        }
    }
    seen.into_iter()
        .map(|(name, kind)| (name, kind.unwrap_or("VARCHAR")))
        .collect()
}

fn sql_type(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "DOUBLE",
        Value::Bool(_) => "BOOLEAN",
        Value::String(text) if parse_datetime(text).is_some() => "TIMESTAMP",
        _ => "VARCHAR",
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Rewrites ISO-8601 local datetimes into the form DuckDB casts directly.
fn normalize(value: &Value) -> Value {
    match value {
        Value::String(text) => match parse_datetime(text) {
            Some(parsed) => Value::String(parsed.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => value.clone(),
        },
        other => other.clone(),
    }
}
