use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use duckdb::types::{TimeUnit, Value as SqlValue};
use serde_json::{json, Number, Value};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// Converts a JSON parameter into a value DuckDB can bind.
///
/// Arrays and objects have no scalar form and are bound as their JSON text.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::BigInt(i)
            } else if let Some(u) = n.as_u64() {
                SqlValue::UBigInt(u)
            } else {
                n.as_f64().map(SqlValue::Double).unwrap_or(SqlValue::Null)
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Converts a DuckDB result value into JSON.
pub fn to_json_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Boolean(b) => Value::Bool(b),
        SqlValue::TinyInt(i) => Value::from(i),
        SqlValue::SmallInt(i) => Value::from(i),
        SqlValue::Int(i) => Value::from(i),
        SqlValue::BigInt(i) => Value::from(i),
        SqlValue::HugeInt(i) => match i64::try_from(i) {
            Ok(small) => Value::from(small),
            Err(_) => Value::String(i.to_string()),
        },
        SqlValue::UTinyInt(u) => Value::from(u),
        SqlValue::USmallInt(u) => Value::from(u),
        SqlValue::UInt(u) => Value::from(u),
        SqlValue::UBigInt(u) => Value::from(u),
        SqlValue::Float(f) => float(f64::from(f)),
        SqlValue::Double(f) => float(f),
        SqlValue::Decimal(d) => Value::String(d.to_string()),
        SqlValue::Timestamp(unit, raw) => timestamp(unit, raw),
        SqlValue::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_CE_DAYS)
            .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        SqlValue::Time64(unit, raw) => time_of_day(unit, raw),
        SqlValue::Interval {
            months,
            days,
            nanos,
        } => json!({ "months": months, "days": days, "nanos": nanos }),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Enum(s) => Value::String(s),
        SqlValue::Blob(bytes) => Value::String(BASE64.encode(bytes)),
        SqlValue::List(items) => Value::Array(items.into_iter().map(to_json_value).collect()),
        other => Value::String(format!("{other:?}")),
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn to_micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

fn timestamp(unit: TimeUnit, raw: i64) -> Value {
    DateTime::<Utc>::from_timestamp_micros(to_micros(unit, raw))
        .map(|ts| Value::String(ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        .unwrap_or(Value::Null)
}

fn time_of_day(unit: TimeUnit, raw: i64) -> Value {
    let micros = to_micros(unit, raw);
    let secs = u32::try_from(micros.div_euclid(1_000_000)).ok();
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok();
    secs.zip(nanos)
        .and_then(|(secs, nanos)| NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos))
        .map(|time| Value::String(time.format("%H:%M:%S%.f").to_string()))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_numbers_bind_as_integers_or_doubles() {
        assert_eq!(to_sql_value(&json!(5)), SqlValue::BigInt(5));
        assert_eq!(to_sql_value(&json!(u64::MAX)), SqlValue::UBigInt(u64::MAX));
        assert_eq!(to_sql_value(&json!(1.5)), SqlValue::Double(1.5));
        assert_eq!(to_sql_value(&Value::Null), SqlValue::Null);
    }

    #[test]
    fn nested_json_binds_as_text() {
        assert_eq!(
            to_sql_value(&json!({"a": [1, 2]})),
            SqlValue::Text("{\"a\":[1,2]}".to_string())
        );
    }

    #[test]
    fn non_finite_doubles_become_null() {
        assert_eq!(to_json_value(SqlValue::Double(f64::NAN)), Value::Null);
        assert_eq!(to_json_value(SqlValue::Double(2.5)), json!(2.5));
    }

    #[test]
    fn huge_ints_outside_i64_become_strings() {
        assert_eq!(to_json_value(SqlValue::HugeInt(42)), json!(42));
        let big = i128::from(i64::MAX) + 1;
        assert_eq!(to_json_value(SqlValue::HugeInt(big)), json!(big.to_string()));
    }

    #[test]
    fn temporal_values_render_as_iso_strings() {
        assert_eq!(
            to_json_value(SqlValue::Timestamp(TimeUnit::Second, 86_400)),
            json!("1970-01-02T00:00:00")
        );
        assert_eq!(to_json_value(SqlValue::Date32(1)), json!("1970-01-02"));
        assert_eq!(
            to_json_value(SqlValue::Time64(TimeUnit::Microsecond, 3_661_000_000)),
            json!("01:01:01")
        );
    }

    #[test]
    fn blobs_are_base64() {
        assert_eq!(to_json_value(SqlValue::Blob(b"hi".to_vec())), json!("aGk="));
    }
}
