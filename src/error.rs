//! Error type shared by the library modules.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabusError {
    #[error("API request failed: {0}")]
    Api(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("{0}")]
    Processing(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid data format: {0}")]
    DataFormat(String),
    #[error("a rule named '{0}' is already registered")]
    DuplicateRule(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DatabusError>;
