use thiserror::Error;

/// Failures that make a pulled message undeliverable. All of them are logged,
/// acknowledged, and dropped; none of them abort the batch.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("expected exactly one top-level device key, found {0}")]
    KeyCount(usize),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv write error: {0}")]
    Csv(#[from] csv::Error),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Transport-level failures. A pull failure is unrecoverable and shuts the
/// loop down; an acknowledge failure is logged and left to the transport's
/// own redelivery policy.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to pull messages: {0}")]
    Pull(String),

    #[error("failed to acknowledge {failed} of {total} messages")]
    Acknowledge { failed: usize, total: usize },
}

pub type SourceResult<T> = Result<T, SourceError>;
