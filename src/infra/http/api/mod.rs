pub mod error;
mod handlers;
mod state;

pub use state::ApiState;

use axum::{
    Router,
    extract::{RawQuery, State},
    middleware as axum_middleware,
    routing::get,
};

use crate::application::query::{HEAD_PATH, count_path};
use crate::application::resources;
use crate::infra::http::middleware::{log_responses, set_request_context};

/// Public read API: one list and one count route per resource, plus head and health.
pub fn build_api_router(state: ApiState) -> Router {
    let mut router: Router<ApiState> = Router::new()
        .route(HEAD_PATH, get(handlers::head))
        .route("/health", get(handlers::health));

    for &schema in resources::ALL {
        router = router
            .route(
                schema.path,
                get(move |state: State<ApiState>, query: RawQuery| {
                    handlers::list(state, query, schema)
                }),
            )
            .route(
                &count_path(schema),
                get(move |state: State<ApiState>, query: RawQuery| {
                    handlers::count(state, query, schema)
                }),
            );
    }

    router
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
