use thiserror::Error;

/// Errors reported by a payment store adapter.
///
/// `Conflict` is the only variant the updater treats as retryable; an HTTP
/// adapter maps status 409 onto it, so `is_conflict` also accepts a raw 409.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Payment not found: {0}")]
    NotFound(String),
    #[error("Version conflict on payment {id}: submitted {submitted}, current {current:?}")]
    Conflict {
        id: String,
        submitted: u64,
        current: Option<u64>,
    },
    #[error("Invalid update action: {0}")]
    InvalidAction(String),
    #[error("Store responded with HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::Http { status: 409, .. }
        )
    }

    /// The HTTP status the failure corresponds to, for callers that map
    /// results onto responses.
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::NotFound(_) => 404,
            StoreError::Conflict { .. } => 409,
            StoreError::InvalidAction(_) => 400,
            StoreError::Http { status, .. } => *status,
            StoreError::Transport(_) => 502,
            StoreError::Serialization(_) | StoreError::InternalError(_) => 500,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::InternalError(Box::new(e))
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors from decoding gateway input and writing reports.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
