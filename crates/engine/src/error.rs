use thiserror::Error;

use crate::types::DatabaseLocation;

/// Errors produced by the data access layer.
#[derive(Error, Debug)]
pub enum DataError {
    /// The database could not be opened in the requested mode.
    #[error("failed to open database {location}: {source}")]
    Connection {
        location: DatabaseLocation,
        #[source]
        source: duckdb::Error,
    },

    /// The engine rejected or failed to execute a statement.
    #[error("query failed: {source} (query: {query})")]
    Query {
        query: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Statement refused by the SQL guard before reaching the engine.
    #[error("query rejected: {0}")]
    Rejected(String),

    #[error("unknown analysis type: {0}. Use 'summary', 'trends', or 'conditions'")]
    UnknownAnalysis(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DataError {
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }
}

pub type DataResult<T> = Result<T, DataError>;
