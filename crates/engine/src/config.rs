use std::path::PathBuf;

use crate::types::{DatabaseLocation, IsolationPolicy};
use crate::{DataError, DataResult};

pub const DB_PATH_ENV: &str = "DUCKWX_DB_PATH";
pub const ISOLATION_ENV: &str = "DUCKWX_ISOLATION";

/// Directory used when no database path is configured.
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_DB_FILE: &str = "analytics.duckdb";

/// Engine settings resolved from the environment.
///
/// `location` is `None` when `DUCKWX_DB_PATH` is unset, in which case the
/// manager falls back to `./data/analytics.duckdb`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub location: Option<DatabaseLocation>,
    pub isolation: IsolationPolicy,
}

impl EngineConfig {
    pub fn from_env() -> DataResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DataResult<Self> {
        let location = lookup(DB_PATH_ENV)
            .filter(|value| !value.trim().is_empty())
            .map(|value| DatabaseLocation::parse(value.trim()));

        let isolation = match lookup(ISOLATION_ENV).filter(|v| !v.trim().is_empty()) {
            Some(value) => IsolationPolicy::parse(&value).ok_or_else(|| {
                DataError::Config(format!(
                    "{ISOLATION_ENV} must be 'strict' or 'concurrent', got {value:?}"
                ))
            })?,
            None => IsolationPolicy::default(),
        };

        Ok(Self {
            location,
            isolation,
        })
    }
}

pub fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR).join(DEFAULT_DB_FILE)
}
