use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Fetch, store and explore weather data in DuckDB")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database file, or :memory:. Falls back to DUCKWX_DB_PATH, then ./data/analytics.duckdb
    #[arg(short = 'd', long = "db", global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the weather ingestion pipeline
    Fetch {
        /// City label for the run
        #[arg(default_value = "London")]
        city: String,
    },
    /// Show the most recent weather records
    Query {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: u64,
    },
    /// Run a read-only SQL query
    Sql {
        query: String,
        /// Row limit appended when the query has none (0 disables it)
        #[arg(short = 'n', long, default_value_t = 100)]
        limit: u64,
    },
    /// List tables, columns and sample rows
    Schema,
    /// Per-column completeness metrics for a table
    Quality {
        #[arg(default_value = "weather_data.london_weather")]
        table: String,
    },
    /// Run a canned analysis: summary, trends or conditions
    Analytics {
        #[arg(default_value = "summary")]
        kind: String,
    },
    /// Database location and row counts
    Info,
}
