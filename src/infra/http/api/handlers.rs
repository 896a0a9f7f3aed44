//! Public query handlers.

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::application::error::AppError;
use crate::application::filter::FilterSchema;

use super::super::json_response;
use super::super::middleware::QueryRoute;
use super::error::ApiError;
use super::state::ApiState;

/// Split a raw query string into decoded key/value pairs, keeping repeats and order.
pub(crate) fn query_pairs(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|raw| {
        url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect()
    })
    .unwrap_or_default()
}

/// JSON body or error response, tagged with the query it answered.
fn respond(route: QueryRoute, result: Result<Bytes, AppError>) -> Response {
    let mut response = match result {
        Ok(body) => json_response(body),
        Err(err) => ApiError::from(err).into_response(),
    };
    response.extensions_mut().insert(route);
    response
}

pub(super) async fn list(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
    schema: &'static FilterSchema,
) -> Response {
    let pairs = query_pairs(query.as_deref());
    let result = state.queries.list(schema, &pairs).await;
    respond(QueryRoute::list(schema.resource), result)
}

pub(super) async fn count(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
    schema: &'static FilterSchema,
) -> Response {
    let pairs = query_pairs(query.as_deref());
    let result = state.queries.count(schema, &pairs).await;
    respond(QueryRoute::count(schema.resource), result)
}

pub(super) async fn head(State(state): State<ApiState>) -> Response {
    respond(QueryRoute::HEAD, state.queries.head().await)
}

pub(super) async fn health(State(state): State<ApiState>) -> Response {
    match state.queries.ping().await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}
