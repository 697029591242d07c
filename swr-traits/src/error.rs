use thiserror::Error;

/// Transport-defined cause of a failed remote fetch.
///
/// Cloneable by design: the orchestration core carries the cause inside
/// emitted cache states, so every variant keeps an owned string payload
/// instead of wrapping non-cloneable transport errors directly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode remote payload: {0}")]
    Decode(String),

    #[error("Remote source error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;
