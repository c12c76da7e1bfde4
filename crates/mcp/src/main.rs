//! duckwx MCP Server
//!
//! An MCP (Model Context Protocol) server that exposes the duckwx weather
//! tools over JSON-RPC 2.0 on stdio. Any MCP-compatible AI client can
//! connect by launching this binary and communicating over stdin / stdout.
//!
//! ## Supported tools
//! | Tool                       | Purpose                                   |
//! |----------------------------|-------------------------------------------|
//! | `fetch_weather_data`       | run the Open-Meteo ingestion pipeline     |
//! | `query_weather_data`       | most recent weather records               |
//! | `weather_analytics`        | summary / trends / conditions analysis    |
//! | `execute_sql_query`        | guarded read-only SQL                     |
//! | `discover_database_schema` | tables, columns and sample rows           |
//! | `analyze_data_quality`     | per-column completeness metrics           |
//! | `get_table_info`           | database location and row counts          |
//!
//! ## Transport
//! The server reads newline-delimited JSON from stdin and writes
//! newline-delimited JSON to stdout. Each line is one JSON-RPC 2.0 message.
//! Notifications (messages without an `id`) are silently ignored. Logs go to
//! stderr so they never interleave with protocol traffic.

mod tools;

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use duckwx_engine::{DataManager, EngineConfig};
use duckwx_ingest::WeatherSource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::tools::ToolContext;

// ── JSON-RPC 2.0 types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Request {
    #[allow(dead_code)]
    jsonrpc: String,
    /// Absent for notifications; present for requests.
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

impl Response {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("failed to load .env: {err}");
        }
    }
    let _log_guard = init_tracing();

    let ctx = match build_context() {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(error = %err, "failed to initialise data manager");
            return ExitCode::FAILURE;
        }
    };
    info!(
        database = %ctx.data.location(),
        isolation = ?ctx.data.isolation(),
        "duckwx MCP server ready"
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) if l.trim().is_empty() => continue,
            Ok(l) => l,
            Err(err) => {
                warn!(error = %err, "stdin closed with error");
                break;
            }
        };

        if let Some(resp) = handle_line(&ctx, &line) {
            let serialized = serde_json::to_string(&resp).unwrap_or_else(|_| {
                r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal serialization error"}}"#.to_string()
            });
            let _ = writeln!(out, "{serialized}");
            let _ = out.flush();
        }
    }

    ctx.data.close();
    ExitCode::SUCCESS
}

fn init_tracing() -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

fn build_context() -> duckwx_engine::DataResult<ToolContext> {
    let config = EngineConfig::from_env()?;
    Ok(ToolContext {
        data: DataManager::from_config(&config)?,
        weather: WeatherSource::from_env(),
    })
}

// ── Message dispatch ─────────────────────────────────────────────────────────

fn handle_line(ctx: &ToolContext, line: &str) -> Option<Response> {
    let req: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            return Some(Response::err(
                Value::Null,
                -32700,
                format!("Parse error: {e}"),
            ));
        }
    };

    // Notifications have no `id` and require no response.
    let id = req.id.clone()?;

    Some(match req.method.as_str() {
        "initialize" => Response::ok(id, handle_initialize()),
        "ping" => Response::ok(id, json!({})),
        "tools/list" => Response::ok(id, tools::definitions()),
        "tools/call" => match handle_tools_call(ctx, &req.params) {
            Ok(v) => Response::ok(id, v),
            Err(e) => Response::err(id, -32602, e),
        },
        unknown => Response::err(id, -32601, format!("Method not found: {unknown}")),
    })
}

// ── MCP method handlers ───────────────────────────────────────────────────────

fn handle_initialize() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "serverInfo": {
            "name": "duckwx-mcp",
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {
            "tools": {}
        }
    })
}

fn handle_tools_call(ctx: &ToolContext, params: &Value) -> Result<Value, String> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "Missing required parameter: name".to_string())?;

    let args = params.get("arguments").unwrap_or(&Value::Null);
    info!(tool = name, "tools/call");

    tools::call(ctx, name, args).map(tools::ToolOutcome::into_result)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
