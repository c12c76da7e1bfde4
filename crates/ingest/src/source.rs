use serde::Serialize;

pub const DEFAULT_API_BASE: &str = "https://api.open-meteo.com/v1/";
pub const API_BASE_ENV: &str = "DUCKWX_WEATHER_API_BASE";

/// Declarative description of one forecast resource and where it lands.
///
/// The default targets London and loads into `weather_data.london_weather`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSource {
    pub base_url: String,
    pub dataset: String,
    pub resource: String,
    pub latitude: f64,
    pub longitude: f64,
    pub current: Vec<String>,
    pub hourly: Vec<String>,
    pub forecast_days: u8,
}

impl Default for WeatherSource {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            dataset: "weather_data".to_string(),
            resource: "london_weather".to_string(),
            latitude: 51.5074,
            longitude: -0.1278,
            current: vec![
                "temperature_2m".to_string(),
                "relative_humidity_2m".to_string(),
                "wind_speed_10m".to_string(),
            ],
            hourly: vec![
                "temperature_2m".to_string(),
                "relative_humidity_2m".to_string(),
            ],
            forecast_days: 3,
        }
    }
}

impl WeatherSource {
    /// Default source with the base URL taken from `DUCKWX_WEATHER_API_BASE`
    /// when it is set.
    pub fn from_env() -> Self {
        let mut source = Self::default();
        if let Some(base) = std::env::var(API_BASE_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            source.base_url = base.trim().to_string();
        }
        source
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/forecast", self.base_url.trim_end_matches('/'))
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("current", self.current.join(",")),
            ("hourly", self.hourly.join(",")),
            ("forecast_days", self.forecast_days.to_string()),
        ]
    }

    pub fn table(&self) -> String {
        format!("{}.{}", self.dataset, self.resource)
    }

    pub fn hourly_resource(&self) -> String {
        format!("{}__hourly", self.resource)
    }
}
