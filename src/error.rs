use thiserror::Error;

#[derive(Error, Debug)]
pub enum AskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vanna error: {0}")]
    Vanna(String),

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::prelude::PolarsError> for AskError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        AskError::Polars(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AskError>;
