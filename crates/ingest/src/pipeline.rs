use duckwx_engine::DataManager;
use tracing::info;

use crate::{fetch_forecast, load_forecast, IngestResult, LoadInfo, WeatherSource};

/// Fetches the forecast for `source` and loads it through `data`.
///
/// The HTTP fetch runs on a private current-thread runtime so callers can
/// stay synchronous; all database work happens after the fetch completes,
/// outside the runtime.
pub fn run_weather_pipeline(data: &DataManager, source: &WeatherSource) -> IngestResult<LoadInfo> {
    info!(resource = %source.resource, endpoint = %source.endpoint(), "running weather pipeline");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let payload = runtime.block_on(fetch_forecast(source))?;
    load_forecast(data, source, &payload)
}
