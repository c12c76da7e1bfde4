//! Data access layer for duckwx.
//!
//! [`DataManager`] gives mode-aware, lock-disciplined access to a single
//! DuckDB database and returns query results as ordered JSON rows. The
//! remaining modules build the read-side tools on top of it: a guard for
//! free-form SQL, schema discovery, data quality metrics and the fixed
//! weather analytics.

pub mod analytics;
pub mod config;
mod db_manager;
mod error;
pub mod identifiers;
pub mod quality;
pub mod schema;
pub mod sql_guard;
mod types;
pub mod values;

pub use analytics::{recent_weather, run_analysis, AnalysisType, WEATHER_TABLE};
pub use config::EngineConfig;
pub use db_manager::{DataManager, Session};
pub use error::{DataError, DataResult};
pub use quality::{analyze_table, QualityReport, DEFAULT_QUALITY_TABLE};
pub use schema::{discover_schema, table_info, TableSchema, TableSummary};
pub use sql_guard::guard_read_query;
pub use types::{AccessMode, DatabaseLocation, IsolationPolicy, Row, IN_MEMORY};
