use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("expected {kind}: {reason}")]
    InvalidScalar { kind: &'static str, reason: String },
}

impl DomainError {
    pub fn invalid_scalar(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidScalar {
            kind,
            reason: reason.into(),
        }
    }
}
