use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    // Client input errors, surfaced immediately and never retried
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Missing required fields: {0}")]
    MissingField(String),

    // Infrastructure errors on the synchronous path
    #[error("Publish error: {0}")]
    PublishError(#[source] anyhow::Error),

    #[error("Write error: {0}")]
    WriteError(#[source] anyhow::Error),

    // Asynchronous path, resolved through queue redelivery
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Load failed: {0}")]
    LoadFailed(String),

    #[error("Aggregation failed: {0}")]
    AggregationFailed(#[source] anyhow::Error),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    /// Client input errors are the caller's fault and must not be retried.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidPayload(_) | Self::MissingField(_))
    }
}
