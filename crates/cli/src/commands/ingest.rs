use duckwx_engine::DataManager;
use duckwx_ingest::{run_weather_pipeline, WeatherSource};
use serde_json::{json, Value};
use tracing::info;

use super::CliResult;

pub fn run(data: &DataManager, source: &WeatherSource, city: &str) -> CliResult<Value> {
    info!(city, endpoint = %source.endpoint(), "fetching weather");
    let load = run_weather_pipeline(data, source)?;
    Ok(json!({
        "city": city,
        "load": load,
    }))
}
