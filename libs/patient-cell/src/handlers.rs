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
use shared_utils::gate::{GateAction, PermissionGate, RolePermissionGate};

use crate::models::{PatientError, PatientSearchQuery, RegisterPatientRequest};
use crate::services::{PatientRegistrationService, PatientService};

fn map_patient_error(e: PatientError) -> AppError {
    match e {
        PatientError::NotFound => AppError::NotFound("Patient not found".to_string()),
        PatientError::AllocationExhausted { .. } => AppError::ServiceUnavailable(
            "Patient registration is briefly busy, please retry".to_string(),
        ),
        PatientError::ValidationError(msg) => AppError::ValidationError(msg),
        PatientError::CodeCollision { .. } => AppError::Internal(e.to_string()),
        PatientError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn register_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RegisterPatientRequest>,
) -> Result<Json<Value>, AppError> {
    RolePermissionGate
        .authorize(&user, GateAction::RegisterPatients)
        .await?;

    let service = PatientRegistrationService::new(&config);

    let patient = service
        .register(request, auth.token())
        .await
        .map_err(map_patient_error)?;

    Ok(Json(json!({
        "success": true,
        "patient": patient
    })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(&config);

    let patient = service
        .get_patient(patient_id, auth.token())
        .await
        .map_err(map_patient_error)?;

    Ok(Json(json!({
        "success": true,
        "patient": patient
    })))
}

#[axum::debug_handler]
pub async fn search_patients(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(&config);

    let patients = service
        .search_patients(query, auth.token())
        .await
        .map_err(map_patient_error)?;

    Ok(Json(json!({
        "success": true,
        "total": patients.len(),
        "patients": patients
    })))
}
