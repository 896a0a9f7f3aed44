use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::{AppError, ErrorReport};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAVAILABLE: &str = "unavailable";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    pub message: String,
}

/// JSON error returned by the public and admin APIs.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    parameter: Option<String>,
    message: String,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            parameter: None,
            message: message.into(),
            report: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = err.status_code();
        let mut api = match &err {
            AppError::Query(query) => {
                ApiError::bad_request(query.to_string()).with_parameter(query.param())
            }
            AppError::Validation(message) => ApiError::bad_request(message.clone()),
            _ if status == StatusCode::SERVICE_UNAVAILABLE => ApiError::new(
                status,
                codes::UNAVAILABLE,
                "Service temporarily unavailable",
            ),
            _ => ApiError::new(status, codes::INTERNAL, "Unexpected error occurred"),
        };
        api.report = Some(ErrorReport::from_error(
            "infra::http::api",
            api.status,
            &err,
        ));
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(
                "infra::http::api",
                self.status,
                format!("{}: {}", self.code, self.message),
            )
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                parameter: self.parameter,
                message: self.message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::error::QueryError;
    use crate::application::repos::RepoError;

    #[test]
    fn query_errors_carry_the_parameter() {
        let err = ApiError::from(AppError::from(QueryError::unknown("foo")));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.parameter.as_deref(), Some("foo"));
        assert_eq!(err.code, codes::BAD_REQUEST);
    }

    #[test]
    fn unavailable_backends_map_to_503() {
        let err = ApiError::from(AppError::from(RepoError::Timeout));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.parameter.is_none());
        assert_eq!(err.code, codes::UNAVAILABLE);

        let err = ApiError::from(AppError::from(RepoError::Persistence("disk".into())));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, codes::INTERNAL);
    }
}
