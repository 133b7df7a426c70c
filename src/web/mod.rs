//! HTTP surface of the registry.
//!
//! `GET /count` and `GET /find?name=` expose the query service;
//! `PUT /objects/:name` registers or replaces an object; `GET /health` is a
//! liveness probe.

pub mod error;
pub mod handlers;

use crate::query::QueryService;
use crate::registry::RetryPolicy;
use axum::Router;
use axum::routing::{get, put};
use tower_http::trace::TraceLayer;

pub use error::{ErrorResponse, WebError};
pub use handlers::{CORRUPT_ROWS_HEADER, RegisterObjectRequest};

#[derive(Clone)]
pub struct AppState {
    pub queries: QueryService,
    pub retry: RetryPolicy,
}

impl AppState {
    pub fn new(queries: QueryService, retry: RetryPolicy) -> Self {
        Self { queries, retry }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/count", get(handlers::count))
        .route("/find", get(handlers::find))
        .route("/objects/:name", put(handlers::register))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
