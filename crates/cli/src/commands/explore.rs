use duckwx_engine::{
    analyze_table, discover_schema, guard_read_query, recent_weather, run_analysis, table_info,
    AccessMode, AnalysisType, DataManager,
};
use serde_json::{json, Value};

use super::CliResult;

pub fn recent(data: &DataManager, limit: u64) -> CliResult<Value> {
    Ok(serde_json::to_value(recent_weather(data, limit)?)?)
}

pub fn sql(data: &DataManager, query: &str, limit: u64) -> CliResult<Value> {
    let guarded = guard_read_query(query, Some(limit))?;
    let rows = data.execute(&guarded, &[], AccessMode::ReadOnly)?;
    Ok(json!({
        "query": guarded,
        "record_count": rows.len(),
        "data": rows,
    }))
}

pub fn schema(data: &DataManager) -> CliResult<Value> {
    Ok(json!({ "tables": discover_schema(data)? }))
}

pub fn quality(data: &DataManager, table: &str) -> CliResult<Value> {
    Ok(serde_json::to_value(analyze_table(data, table)?)?)
}

pub fn analytics(data: &DataManager, kind: &str) -> CliResult<Value> {
    let kind: AnalysisType = kind.parse()?;
    Ok(json!({
        "analysis_type": kind,
        "insights": run_analysis(data, kind)?,
    }))
}

pub fn info(data: &DataManager) -> CliResult<Value> {
    Ok(json!({
        "database_path": data.location().to_string(),
        "tables": table_info(data)?,
    }))
}
