use thiserror::Error;

#[derive(Error, Debug)]
pub enum DrawError {
    #[error("batch size must be at least 1, got {0}")]
    InvalidBatchSize(usize),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to persist checkpoint: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed charge state: {0}")]
    MalformedCharges(String),
}

pub type DrawResult<T> = Result<T, DrawError>;
