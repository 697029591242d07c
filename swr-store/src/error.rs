use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entry not found: {key}")]
    NotFound { key: String },

    #[error("Key is reserved for sync metadata: {0}")]
    ReservedKey(String),

    #[error("Store has not been initialized")]
    Uninitialized,

    #[error("Store is closed")]
    Closed,

    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
