use thiserror::Error;

/// Errors surfaced by the prediction pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("data error: {0}")]
    Data(#[from] polars::prelude::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model error: {0}")]
    Model(#[from] ort::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
