use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Workbook download failed with status {status}")]
    SourceUnavailable { status: u16 },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected worksheet shape: {0}")]
    SheetShape(String),

    #[error("Workbook could not be decoded: {0}")]
    Workbook(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Unknown series: type '{indicator}' subtype '{variant}'")]
    UnknownSeries { indicator: String, variant: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// Errors caused by the caller's request rather than by ingestion or storage.
    pub fn is_client_error(&self) -> bool {
        matches!(self, IngestError::UnknownSeries { .. })
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
