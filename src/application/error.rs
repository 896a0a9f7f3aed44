use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{application::repos::RepoError, cache::CacheError, infra::error::InfraError};

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// A request-level problem with one query-string parameter.
///
/// Every variant names the offending key exactly as the client wrote it
/// (`sender.eqx`, `sort`, `anyof.sender.target`), so the 400 body can point at it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown parameter `{param}`")]
    UnknownParameter { param: String },
    #[error("invalid value for `{param}`: {reason}")]
    Malformed { param: String, reason: String },
    #[error("`{param}` is not allowed: {reason}")]
    Disallowed { param: String, reason: String },
    #[error("`{param}` was supplied more than once")]
    Duplicate { param: String },
}

impl QueryError {
    pub fn unknown(param: impl Into<String>) -> Self {
        Self::UnknownParameter {
            param: param.into(),
        }
    }

    pub fn malformed(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            param: param.into(),
            reason: reason.into(),
        }
    }

    pub fn disallowed(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Disallowed {
            param: param.into(),
            reason: reason.into(),
        }
    }

    pub fn duplicate(param: impl Into<String>) -> Self {
        Self::Duplicate {
            param: param.into(),
        }
    }

    /// The query-string key this error refers to.
    pub fn param(&self) -> &str {
        match self {
            QueryError::UnknownParameter { param }
            | QueryError::Malformed { param, .. }
            | QueryError::Disallowed { param, .. }
            | QueryError::Duplicate { param } => param,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// HTTP status an API response for this error carries.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Query(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Repo(RepoError::Unavailable(_)) | AppError::Repo(RepoError::Timeout) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Repo(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Infra(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_name_their_parameter() {
        let err = QueryError::disallowed("sender.eqx", "nope");
        assert_eq!(err.param(), "sender.eqx");
        assert_eq!(err.to_string(), "`sender.eqx` is not allowed: nope");
    }

    #[test]
    fn query_errors_map_to_bad_request() {
        let err = AppError::from(QueryError::unknown("foo"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn repo_timeouts_map_to_service_unavailable() {
        let err = AppError::from(RepoError::Timeout);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let err = AppError::from(RepoError::Persistence("disk".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_report_collects_source_chain() {
        let err = AppError::from(RepoError::Persistence("disk full".into()));
        let report =
            ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &err);
        assert_eq!(report.messages[0], "persistence error: disk full");
    }
}
