//! HTTP front-end (C7, §4.7): one handler per route in §6, each a thin
//! translation from JSON/path/query into one `Engine` call.

mod handlers;

pub use handlers::*;

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::Engine;
use crate::metrics;

/// Build the router exposing exactly the six routes named in §6 plus the
/// ambient `/metrics` endpoint (§4.9 — observability is not a scoped-out
/// feature).
pub fn build_router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route(
            "/blocks",
            post(submit_block_handler).get(list_blocks_handler),
        )
        .route("/balance/{address}", get(balance_handler))
        .route("/rollback", post(rollback_handler))
        .route("/reset", post(reset_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(track_request_latency))
        .layer(cors)
        .with_state(engine)
}

async fn track_request_latency(request: Request<Body>, next: Next) -> Response {
    let route = request.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(request).await;
    metrics::REQUEST_DURATION
        .with_label_values(&[&route])
        .observe(start.elapsed().as_secs_f64());
    response
}
