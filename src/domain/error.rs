use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("order validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
