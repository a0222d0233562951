// libs/booking-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn booking_routes(state: Arc<AppConfig>) -> Router {
    // Intake is public: prospective patients have no account yet.
    let public_routes = Router::new()
        .route("/", post(handlers::submit_booking_request));

    // Everything else is staff-only.
    let protected_routes = Router::new()
        .route("/", get(handlers::list_booking_requests))
        .route("/{request_id}", get(handlers::get_booking_request))
        .route("/{request_id}/accept", post(handlers::accept_booking_request))
        .route("/{request_id}/reject", post(handlers::reject_booking_request))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
