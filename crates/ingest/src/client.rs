use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::{IngestError, IngestResult, WeatherSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches one forecast document for `source`.
pub async fn fetch_forecast(source: &WeatherSource) -> IngestResult<Value> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let url = source.endpoint();
    debug!(%url, "fetching forecast");

    let response = client
        .get(&url)
        .query(&source.query_params())
        .send()
        .await?
        .error_for_status()?;
    let payload: Value = response.json().await?;

    if !payload.is_object() {
        return Err(IngestError::Payload(
            "forecast response is not a JSON object".into(),
        ));
    }
    Ok(payload)
}
