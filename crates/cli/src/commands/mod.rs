pub mod explore;
pub mod ingest;

use duckwx_engine::DataManager;
use duckwx_ingest::WeatherSource;
use serde_json::Value;

use crate::cli::Commands;

pub type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Runs one subcommand and returns the JSON document to print.
pub fn dispatch(data: &DataManager, source: &WeatherSource, command: Commands) -> CliResult<Value> {
    match command {
        Commands::Fetch { city } => ingest::run(data, source, &city),
        Commands::Query { limit } => explore::recent(data, limit),
        Commands::Sql { query, limit } => explore::sql(data, &query, limit),
        Commands::Schema => explore::schema(data),
        Commands::Quality { table } => explore::quality(data, &table),
        Commands::Analytics { kind } => explore::analytics(data, &kind),
        Commands::Info => explore::info(data),
    }
}
