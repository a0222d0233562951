// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::RolePermissionGate;

use crate::models::{
    AcceptBookingRequest, BookingError, BookingListQuery, RejectBookingRequest,
    SubmitBookingRequest,
};
use crate::services::{BookingOrchestrator, BookingRequestService};

fn map_booking_error(error: BookingError) -> AppError {
    match error {
        BookingError::RequestNotFound => {
            AppError::NotFound("Booking request not found".to_string())
        },
        BookingError::AlreadyProcessed { .. } => AppError::BadRequest(error.to_string()),
        BookingError::Forbidden(message) => AppError::Forbidden(message),
        BookingError::ValidationError(message) => AppError::ValidationError(message),
        BookingError::NoEligibleProvider { .. } => AppError::NotFound(error.to_string()),
        BookingError::ProviderNotFound(provider_id) => {
            AppError::NotFound(format!("Provider {} not found", provider_id))
        },
        BookingError::ProviderInactive(provider_id) => {
            AppError::BadRequest(format!("Provider {} is not active", provider_id))
        },
        BookingError::ConflictDetected { interval } => AppError::Conflict {
            message: "Requested time overlaps an existing appointment".to_string(),
            details: Some(json!(interval)),
        },
        // Retryable: the store was briefly too contended to hand out a
        // patient code. Nothing about the collision leaks to the caller.
        BookingError::AllocationExhausted { .. } => AppError::ServiceUnavailable(
            "Patient registration is briefly busy, please retry".to_string(),
        ),
        BookingError::DatabaseError(message) => AppError::Internal(message),
    }
}

/// Public intake endpoint. No bearer token: prospective patients submit
/// directly from the clinic's website.
#[axum::debug_handler]
pub async fn submit_booking_request(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<SubmitBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let request_service = BookingRequestService::new(&state);

    let booking_request = request_service
        .submit(request)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "request": booking_request,
        "message": "Booking request received"
    })))
}

#[axum::debug_handler]
pub async fn list_booking_requests(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let request_service = BookingRequestService::new(&state);

    let requests = request_service
        .list(query, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "count": requests.len(),
        "requests": requests
    })))
}

#[axum::debug_handler]
pub async fn get_booking_request(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let request_service = BookingRequestService::new(&state);

    let booking_request = request_service
        .get(request_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "request": booking_request
    })))
}

/// Turns a pending request into a patient plus a booked appointment. The
/// capability check lives inside the orchestrator, so there is no gate call
/// here.
#[axum::debug_handler]
pub async fn accept_booking_request(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
    Json(overrides): Json<AcceptBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let orchestrator = BookingOrchestrator::new(&state, Arc::new(RolePermissionGate));

    let acceptance = orchestrator
        .accept(request_id, overrides, &user, token)
        .await
        .map_err(map_booking_error)?;

    let mut body = json!({
        "success": true,
        "request_id": acceptance.request_id,
        "patient": acceptance.patient,
        "appointment": acceptance.appointment
    });
    if let Some(warning) = &acceptance.warning {
        body["warning"] = json!(warning);
    }

    Ok(Json(body))
}

#[axum::debug_handler]
pub async fn reject_booking_request(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<RejectBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let orchestrator = BookingOrchestrator::new(&state, Arc::new(RolePermissionGate));

    let booking_request = orchestrator
        .reject(request_id, payload, &user, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "request": booking_request,
        "message": "Booking request rejected"
    })))
}
