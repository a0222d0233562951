use thiserror::Error;

/// Errors surfaced by the record store client.
///
/// `UniqueViolation` is split out from the generic API error because callers
/// doing optimistic inserts (patient code allocation) branch on it to retry
/// with a fresh candidate instead of failing outright.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {message}")]
    UniqueViolation { message: String },

    #[error("Store rejected credentials: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Store API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}
