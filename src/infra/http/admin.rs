//! Operator endpoints: cache invalidation, cache statistics, health.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{CacheStats, CacheTrigger};

use super::api::error::ApiError;
use super::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct AdminState {
    pub trigger: Arc<CacheTrigger>,
    pub cache_enabled: bool,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/cache/invalidate", post(invalidate_cache))
        .route("/cache/stats", get(cache_stats))
        .route("/health", get(admin_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

/// At most one field may be set; an empty object flushes everything.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InvalidateRequest {
    level: Option<i64>,
    reverted_to: Option<i64>,
    prefix: Option<String>,
}

#[derive(Debug, Serialize)]
struct InvalidateResponse {
    invalidated: usize,
    entries: usize,
    level: Option<i64>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    enabled: bool,
    pending_events: usize,
    level: Option<i64>,
    #[serde(flatten)]
    stats: CacheStats,
}

async fn invalidate_cache(
    State(state): State<AdminState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: InvalidateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        InvalidateRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::bad_request(format!("invalid invalidation request: {err}")))?
    };

    let cache = state.trigger.consumer().cache();
    let before = cache.len();

    match request {
        InvalidateRequest {
            level: Some(level),
            reverted_to: None,
            prefix: None,
        } => state.trigger.block_applied(level),
        InvalidateRequest {
            level: None,
            reverted_to: Some(level),
            prefix: None,
        } => state.trigger.block_reverted(level),
        InvalidateRequest {
            level: None,
            reverted_to: None,
            prefix: Some(prefix),
        } => {
            if !prefix.starts_with('/') {
                return Err(
                    ApiError::bad_request("prefix must be a request path").with_parameter("prefix")
                );
            }
            state.trigger.flush(Some(prefix));
        }
        InvalidateRequest {
            level: None,
            reverted_to: None,
            prefix: None,
        } => state.trigger.flush(None),
        _ => {
            return Err(ApiError::bad_request(
                "set at most one of `level`, `reverted_to` or `prefix`",
            ));
        }
    }

    let entries = cache.len();
    let invalidated = before.saturating_sub(entries);
    info!(invalidated, entries, "Admin cache invalidation");

    Ok(Json(InvalidateResponse {
        invalidated,
        entries,
        level: state.trigger.consumer().level(),
    })
    .into_response())
}

async fn cache_stats(State(state): State<AdminState>) -> Json<StatsResponse> {
    let consumer = state.trigger.consumer();
    Json(StatsResponse {
        enabled: state.cache_enabled,
        pending_events: state.trigger.queue().len(),
        level: consumer.level(),
        stats: consumer.cache().stats(),
    })
}

async fn admin_health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
