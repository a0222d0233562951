// libs/appointment-cell/src/handlers.rs
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
use shared_utils::{GateAction, PermissionGate, RolePermissionGate};

use crate::models::{
    AppointmentError, AppointmentSearchQuery, CreateAppointmentRequest,
    UpdateAppointmentRequest, UpdateStatusRequest,
};
use crate::services::scheduling::AppointmentSchedulingService;

fn map_appointment_error(error: AppointmentError) -> AppError {
    match error {
        AppointmentError::NotFound => {
            AppError::NotFound("Appointment not found".to_string())
        },
        AppointmentError::ProviderNotFound(provider_id) => {
            AppError::NotFound(format!("Provider {} not found", provider_id))
        },
        AppointmentError::ProviderInactive(provider_id) => {
            AppError::BadRequest(format!("Provider {} is not active", provider_id))
        },
        AppointmentError::PatientNotFound(patient_id) => {
            AppError::NotFound(format!("Patient {} not found", patient_id))
        },
        AppointmentError::ConflictDetected { interval } => AppError::Conflict {
            message: "Requested time overlaps an existing appointment".to_string(),
            details: Some(json!(interval)),
        },
        AppointmentError::InvalidTime(message) => AppError::ValidationError(message),
        AppointmentError::ValidationError(message) => AppError::ValidationError(message),
        AppointmentError::InvalidStatusTransition { .. } => {
            AppError::BadRequest(error.to_string())
        },
        AppointmentError::DatabaseError(message) => AppError::Internal(message),
    }
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let gate = RolePermissionGate;
    gate.authorize(&user, GateAction::ManageAppointments).await?;

    let scheduling_service = AppointmentSchedulingService::new(&state);

    let appointment = scheduling_service
        .create_appointment(request, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let scheduling_service = AppointmentSchedulingService::new(&state);

    let appointments = scheduling_service
        .search_appointments(query, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "count": appointments.len(),
        "appointments": appointments
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let scheduling_service = AppointmentSchedulingService::new(&state);

    let appointment = scheduling_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let gate = RolePermissionGate;
    gate.authorize(&user, GateAction::ManageAppointments).await?;

    let scheduling_service = AppointmentSchedulingService::new(&state);

    let appointment = scheduling_service
        .update_appointment(appointment_id, request, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let gate = RolePermissionGate;
    gate.authorize(&user, GateAction::ManageAppointments).await?;

    let scheduling_service = AppointmentSchedulingService::new(&state);

    let appointment = scheduling_service
        .transition_status(appointment_id, request.status, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let gate = RolePermissionGate;
    gate.authorize(&user, GateAction::ManageAppointments).await?;

    let scheduling_service = AppointmentSchedulingService::new(&state);

    let appointment = scheduling_service
        .cancel_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}
