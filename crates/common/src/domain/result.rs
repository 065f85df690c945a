use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Invalid card type: {0}")]
    InvalidCardType(String),

    #[error("Fusion failed for card {0}: {1}")]
    FusionError(String, String),

    #[error("Cache write failed for card {0}: {1}")]
    CacheWriteError(String, String),

    #[error("Reading store error: {0}")]
    ReadingStoreError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
