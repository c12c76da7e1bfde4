//! Weather ingestion pipeline.
//!
//! Fetches an Open-Meteo forecast described by a [`WeatherSource`], flattens
//! the document into columns and loads it into DuckDB through a
//! [`duckwx_engine::DataManager`] write session. Hourly series land in a
//! `<resource>__hourly` child table.

mod client;
mod error;
mod loader;
mod pipeline;
mod source;

pub use client::fetch_forecast;
pub use error::{IngestError, IngestResult};
pub use loader::{flatten_record, hourly_rows, load_forecast, LoadInfo, Record, NESTING_SEPARATOR};
pub use pipeline::run_weather_pipeline;
pub use source::{WeatherSource, API_BASE_ENV, DEFAULT_API_BASE};
