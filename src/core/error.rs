use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Corrupt payload in row '{row_key}': {reason}")]
    CorruptPayload { row_key: String, reason: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl RegistryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn corrupt(row_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptPayload {
            row_key: row_key.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Only infrastructure failures are worth retrying; upserts are idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    pub fn is_corrupt_payload(&self) -> bool {
        matches!(self, Self::CorruptPayload { .. })
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
