//! Request ids and response logging shared by the public and admin listeners.

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// The query a response answered. Public handlers attach it so failures can
/// be logged per resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRoute {
    pub resource: &'static str,
    pub endpoint: &'static str,
}

impl QueryRoute {
    pub const fn list(resource: &'static str) -> Self {
        Self {
            resource,
            endpoint: "list",
        }
    }

    pub const fn count(resource: &'static str) -> Self {
        Self {
            resource,
            endpoint: "count",
        }
    }

    pub const HEAD: QueryRoute = QueryRoute {
        resource: "head",
        endpoint: "head",
    };
}

/// Reuse the caller's `x-request-id` when it is a plain token, otherwise mint
/// one. The id is echoed on the response.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|id| is_plain_token(id))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn is_plain_token(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let started_at = Instant::now();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
    let (resource, endpoint) = response
        .extensions()
        .get::<QueryRoute>()
        .map_or(("-", "-"), |route| (route.resource, route.endpoint));

    if !status.is_client_error() && !status.is_server_error() {
        debug!(
            target: "tzquery::http::response",
            status = status.as_u16(),
            %method,
            %path,
            resource,
            endpoint,
            elapsed_ms,
            %request_id,
            "Request served"
        );
        return response;
    }

    let (source, chain) = response
        .extensions_mut()
        .remove::<ErrorReport>()
        .map_or(("unknown", Vec::new()), |report| (report.source, report.messages));
    let detail = chain.first().map_or("no diagnostic available", String::as_str);

    if status.is_server_error() {
        error!(
            target: "tzquery::http::response",
            status = status.as_u16(),
            %method,
            %path,
            %query,
            resource,
            endpoint,
            elapsed_ms,
            source,
            detail,
            ?chain,
            %request_id,
            "Request failed"
        );
    } else {
        warn!(
            target: "tzquery::http::response",
            status = status.as_u16(),
            %method,
            %path,
            %query,
            resource,
            endpoint,
            source,
            detail,
            %request_id,
            "Request rejected"
        );
    }

    response
}
