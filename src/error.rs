use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Normalization error: {0}")]
    Normalization(String),

    #[error("Correction error: {0}")]
    Correction(String),

    #[error("Categorization error: {0}")]
    Categorization(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Merge failure: {0}")]
    Merge(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
