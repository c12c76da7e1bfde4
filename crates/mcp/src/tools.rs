//! Tool catalogue and handlers.
//!
//! Handlers never surface engine failures as JSON-RPC errors. A failing tool
//! returns a normal result flagged `isError` with a JSON body describing the
//! problem, so the calling agent can read it and adjust. Protocol-level
//! errors are reserved for unknown tools and malformed arguments.

use chrono::Utc;
use duckwx_engine::{
    analyze_table, discover_schema, guard_read_query, recent_weather, run_analysis, table_info,
    AccessMode, AnalysisType, DataError, DataManager, DEFAULT_QUALITY_TABLE,
};
use duckwx_ingest::{run_weather_pipeline, WeatherSource};
use serde_json::{json, Value};
use tracing::error;

pub const DEFAULT_CITY: &str = "London";
pub const DEFAULT_QUERY_LIMIT: u64 = 10;
pub const DEFAULT_SQL_LIMIT: u64 = 100;

/// Everything a tool handler needs. Built once at startup.
pub struct ToolContext {
    pub data: DataManager,
    pub weather: WeatherSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub body: Value,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(body: Value) -> Self {
        Self {
            body,
            is_error: false,
        }
    }

    fn failed(body: Value) -> Self {
        Self {
            body,
            is_error: true,
        }
    }

    /// MCP `tools/call` result shape.
    pub fn into_result(self) -> Value {
        let text = serde_json::to_string_pretty(&self.body).unwrap_or_else(|_| self.body.to_string());
        let mut result = json!({ "content": [{ "type": "text", "text": text }] });
        if self.is_error {
            result["isError"] = Value::Bool(true);
        }
        result
    }
}

pub fn definitions() -> Value {
    json!({
        "tools": [
            {
                "name": "fetch_weather_data",
                "description": "Run the weather ingestion pipeline: fetch the current forecast from Open-Meteo and load it into DuckDB.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "city": {
                            "type": "string",
                            "description": "City label for the run. Defaults to London."
                        }
                    }
                }
            },
            {
                "name": "query_weather_data",
                "description": "Return the most recently loaded weather records.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of records. Defaults to 10.",
                            "minimum": 1
                        }
                    }
                }
            },
            {
                "name": "weather_analytics",
                "description": "Run a canned weather analysis: summary, trends (daily, last 7 days) or conditions (temperature buckets).",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "analysis_type": {
                            "type": "string",
                            "enum": ["summary", "trends", "conditions"],
                            "description": "Analysis to run. Defaults to summary."
                        }
                    }
                }
            },
            {
                "name": "execute_sql_query",
                "description": "Execute a read-only SQL query against the weather database. Mutating statements are rejected and a LIMIT is added when missing.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "sql_query": {
                            "type": "string",
                            "description": "SELECT statement to run"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Row limit appended when the query has none. Defaults to 100; 0 disables it.",
                            "minimum": 0
                        }
                    },
                    "required": ["sql_query"]
                }
            },
            {
                "name": "discover_database_schema",
                "description": "List tables with their columns, data types and a couple of sample rows.",
                "inputSchema": { "type": "object", "properties": {} }
            },
            {
                "name": "analyze_data_quality",
                "description": "Report row count and per-column null and distinct-value statistics for a table.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "table_name": {
                            "type": "string",
                            "description": "Table as name or schema.name. Defaults to weather_data.london_weather."
                        }
                    }
                }
            },
            {
                "name": "get_table_info",
                "description": "Show the database location and the row count of every table.",
                "inputSchema": { "type": "object", "properties": {} }
            }
        ]
    })
}

/// Dispatches one `tools/call`. `Err` means the call itself was malformed.
pub fn call(ctx: &ToolContext, name: &str, args: &Value) -> Result<ToolOutcome, String> {
    match name {
        "fetch_weather_data" => {
            let city = optional_str(args, "city")?.unwrap_or(DEFAULT_CITY);
            Ok(fetch_weather_data(ctx, city))
        }
        "query_weather_data" => {
            let limit = optional_u64(args, "limit")?.unwrap_or(DEFAULT_QUERY_LIMIT);
            Ok(query_weather_data(ctx, limit))
        }
        "weather_analytics" => {
            let kind = optional_str(args, "analysis_type")?.unwrap_or("summary");
            Ok(weather_analytics(ctx, kind))
        }
        "execute_sql_query" => {
            let sql = require_str(args, "sql_query")?;
            let limit = optional_u64(args, "limit")?.unwrap_or(DEFAULT_SQL_LIMIT);
            Ok(execute_sql_query(ctx, sql, limit))
        }
        "discover_database_schema" => Ok(discover_database_schema(ctx)),
        "analyze_data_quality" => {
            let table = optional_str(args, "table_name")?.unwrap_or(DEFAULT_QUALITY_TABLE);
            Ok(analyze_data_quality(ctx, table))
        }
        "get_table_info" => Ok(get_table_info(ctx)),
        unknown => Err(format!("Unknown tool: {unknown}")),
    }
}

fn fetch_weather_data(ctx: &ToolContext, city: &str) -> ToolOutcome {
    match run_weather_pipeline(&ctx.data, &ctx.weather) {
        Ok(load) => ToolOutcome::ok(json!({
            "status": "success",
            "message": format!("Weather data pipeline completed for {city}"),
            "pipeline": "weather",
            "load": load,
            "triggered_at": now(),
        })),
        Err(err) => {
            error!(error = %err, "weather pipeline failed");
            ToolOutcome::failed(json!({
                "status": "error",
                "error": format!("Error running weather pipeline: {err}"),
            }))
        }
    }
}

fn query_weather_data(ctx: &ToolContext, limit: u64) -> ToolOutcome {
    match recent_weather(&ctx.data, limit) {
        Ok(rows) if rows.is_empty() => ToolOutcome::ok(json!({ "message": "No weather data found" })),
        Ok(rows) => ToolOutcome::ok(json!({
            "status": "success",
            "record_count": rows.len(),
            "data": rows,
        })),
        Err(err) => data_failure("Error querying weather data", &err),
    }
}

fn weather_analytics(ctx: &ToolContext, kind: &str) -> ToolOutcome {
    let kind = match kind.parse::<AnalysisType>() {
        Ok(kind) => kind,
        Err(err) => return ToolOutcome::failed(json!({ "status": "error", "error": err.to_string() })),
    };
    match run_analysis(&ctx.data, kind) {
        Ok(rows) if rows.is_empty() => {
            ToolOutcome::ok(json!({ "message": "No weather data available for analysis" }))
        }
        Ok(rows) => ToolOutcome::ok(json!({
            "analysis_type": kind,
            "status": "success",
            "insights": rows,
            "generated_at": now(),
        })),
        Err(err) => data_failure("Error performing weather analytics", &err),
    }
}

fn execute_sql_query(ctx: &ToolContext, sql: &str, limit: u64) -> ToolOutcome {
    let guarded = match guard_read_query(sql, Some(limit)) {
        Ok(guarded) => guarded,
        Err(err) => {
            return ToolOutcome::failed(json!({
                "status": "error",
                "error": err.to_string(),
                "message": "Only SELECT queries are allowed for data exploration",
            }))
        }
    };

    match ctx.data.execute(&guarded, &[], AccessMode::ReadOnly) {
        Ok(rows) => ToolOutcome::ok(json!({
            "status": "success",
            "query": guarded,
            "record_count": rows.len(),
            "data": rows,
            "executed_at": now(),
        })),
        Err(err) => ToolOutcome::failed(json!({
            "status": "error",
            "error": err.to_string(),
            "query": guarded,
            "message": "Query execution failed - check syntax and table names",
        })),
    }
}

fn discover_database_schema(ctx: &ToolContext) -> ToolOutcome {
    match discover_schema(&ctx.data) {
        Ok(tables) => ToolOutcome::ok(json!({
            "status": "success",
            "database_schema": { "tables": tables },
            "discovered_at": now(),
        })),
        Err(err) => data_failure("Error discovering database schema", &err),
    }
}

fn analyze_data_quality(ctx: &ToolContext, table: &str) -> ToolOutcome {
    match analyze_table(&ctx.data, table) {
        Ok(report) => ToolOutcome::ok(json!({
            "status": "success",
            "data_quality": report,
            "analyzed_at": now(),
        })),
        Err(err) => data_failure("Error analyzing data quality", &err),
    }
}

fn get_table_info(ctx: &ToolContext) -> ToolOutcome {
    match table_info(&ctx.data) {
        Ok(tables) => ToolOutcome::ok(json!({
            "database_path": ctx.data.location().to_string(),
            "table_count": tables.len(),
            "tables": tables,
        })),
        Err(err) => data_failure("Error getting table info", &err),
    }
}

fn data_failure(context: &str, err: &DataError) -> ToolOutcome {
    error!(error = %err, "{context}");
    ToolOutcome::failed(json!({
        "status": "error",
        "error": format!("{context}: {err}"),
    }))
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    optional_str(args, key)?.ok_or_else(|| format!("Missing required argument: {key}"))
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str())),
        Some(_) => Err(format!("Argument {key} must be a string")),
    }
}

fn optional_u64(args: &Value, key: &str) -> Result<Option<u64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| format!("Argument {key} must be a non-negative integer")),
    }
}
