use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row: column name to value, in result column order.
pub type Row = IndexMap<String, Value>;

/// Sentinel path that selects a non-persistent database.
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    InMemory,
}

impl DatabaseLocation {
    /// Interprets `:memory:` as the in-memory sentinel, anything else as a file path.
    pub fn parse(value: &str) -> Self {
        if value == IN_MEMORY {
            Self::InMemory
        } else {
            Self::File(PathBuf::from(value))
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::InMemory => None,
        }
    }
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::InMemory => f.write_str(IN_MEMORY),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Whether read sessions take the manager lock in shared mode.
///
/// `Strict` keeps readers out while a writer is active; readers still run
/// alongside each other. `Concurrent` lets readers bypass the lock entirely,
/// so they may observe a database that a writer is in the middle of changing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationPolicy {
    #[default]
    Strict,
    Concurrent,
}

impl IsolationPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "concurrent" => Some(Self::Concurrent),
            _ => None,
        }
    }
}
