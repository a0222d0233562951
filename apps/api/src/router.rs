use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use booking_cell::router::booking_routes;
use patient_cell::router::patient_routes;
use provider_cell::router::provider_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Meridian Clinic API is running!" }))
        .nest("/booking-requests", booking_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/patients", patient_routes(state.clone()))
        .nest("/providers", provider_routes(state.clone()))
}
