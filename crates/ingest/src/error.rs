use duckwx_engine::DataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("weather API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to start pipeline runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("unexpected weather payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Data(#[from] DataError),
}

pub type IngestResult<T> = Result<T, IngestError>;
