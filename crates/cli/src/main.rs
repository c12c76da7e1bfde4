mod cli;
mod commands;

use clap::Parser;
use duckwx_engine::{DataManager, DatabaseLocation, EngineConfig};
use duckwx_ingest::WeatherSource;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use commands::CliResult;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> CliResult<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env()?;
    if let Some(db) = cli.db.as_deref() {
        config.location = Some(DatabaseLocation::parse(db));
    }
    let data = DataManager::from_config(&config)?;
    let source = WeatherSource::from_env();

    let output = commands::dispatch(&data, &source, cli.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    data.close();
    Ok(())
}
