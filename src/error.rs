use thiserror::Error;

/// Failure talking to the alert/user persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Failure delivering a notification. Transport-level errors are wrapped
/// here so the engine can handle them per alert instead of catching panics.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid recipient address: {0}")]
    BadRecipient(String),
    #[error("email dispatch failed: {0}")]
    Transport(String),
}

/// Fatal failure of a whole evaluation cycle. Per-alert problems never
/// surface here; only the inability to load the active set does.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load active alerts: {0}")]
    LoadAlerts(#[from] StoreError),
}
