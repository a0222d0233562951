// libs/appointment-cell/src/services/scheduling.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;
use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use provider_cell::models::ProviderError;
use provider_cell::services::assigner::FallbackAssigner;

use crate::models::{
    parse_clock_time, parse_time_window, Appointment, AppointmentError,
    AppointmentSearchQuery, AppointmentStatus, CreateAppointmentRequest,
    UpdateAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::slots::ProviderSlotLocks;

pub struct AppointmentSchedulingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    provider_assigner: FallbackAssigner,
}

impl AppointmentSchedulingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let conflict_service = ConflictDetectionService::new(Arc::clone(&supabase));
        let lifecycle_service = AppointmentLifecycleService::new();
        let provider_assigner = FallbackAssigner::new(config);

        Self {
            supabase,
            conflict_service,
            lifecycle_service,
            provider_assigner,
        }
    }

    /// Book a new appointment. The overlap check and the insert run under the
    /// provider's slot lock, so two concurrent bookings for the same provider
    /// cannot both pass the check.
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for patient {} with provider {}",
              request.patient_id, request.provider_id);

        let (start_time, end_time) = parse_time_window(&request.start_time, &request.end_time)?;

        let provider = self.provider_assigner
            .resolve_pinned(request.provider_id, auth_token)
            .await
            .map_err(|e| map_provider_error(request.provider_id, e))?;

        self.verify_patient_exists(request.patient_id, auth_token).await?;

        let _slot = ProviderSlotLocks::acquire(provider.id).await;

        let conflict_report = self.conflict_service.check_conflicts(
            provider.id,
            request.date,
            start_time,
            end_time,
            None,
            auth_token,
        ).await?;

        if let Some(interval) = conflict_report.conflict {
            return Err(AppointmentError::ConflictDetected { interval });
        }

        let now = Utc::now();
        let appointment_data = json!({
            "provider_id": provider.id,
            "patient_id": request.patient_id,
            "date": request.date.to_string(),
            "start_time": start_time.format("%H:%M:%S").to_string(),
            "end_time": end_time.format("%H:%M:%S").to_string(),
            "appointment_type": request.appointment_type.to_string(),
            "status": AppointmentStatus::Scheduled.to_string(),
            "notes": request.notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError("Failed to create appointment".to_string()));
        }

        let appointment: Appointment = serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse created appointment: {}", e)))?;

        info!("Appointment {} booked for provider {} on {} {}-{}",
              appointment.id, provider.id, appointment.date,
              appointment.start_time, appointment.end_time);
        Ok(appointment)
    }

    /// Update an existing appointment. Reschedules re-run the overlap check
    /// against everyone except the appointment itself, under the effective
    /// provider's slot lock.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        if self.lifecycle_service.is_terminal(current.status) {
            return Err(AppointmentError::ValidationError(format!(
                "Cannot modify a {} appointment",
                current.status
            )));
        }

        let mut update_data = serde_json::Map::new();

        if request.reschedules() {
            let effective_provider = request.provider_id.unwrap_or(current.provider_id);
            let effective_date = request.date.unwrap_or(current.date);
            let effective_start = match &request.start_time {
                Some(raw) => parse_clock_time(raw)?,
                None => current.start_time,
            };
            let effective_end = match &request.end_time {
                Some(raw) => parse_clock_time(raw)?,
                None => current.end_time,
            };

            if effective_end <= effective_start {
                return Err(AppointmentError::InvalidTime(format!(
                    "End time {} must be after start time {}",
                    effective_end, effective_start
                )));
            }

            if effective_provider != current.provider_id {
                self.provider_assigner
                    .resolve_pinned(effective_provider, auth_token)
                    .await
                    .map_err(|e| map_provider_error(effective_provider, e))?;
            }

            let _slot = ProviderSlotLocks::acquire(effective_provider).await;

            let conflict_report = self.conflict_service.check_conflicts(
                effective_provider,
                effective_date,
                effective_start,
                effective_end,
                Some(appointment_id),
                auth_token,
            ).await?;

            if let Some(interval) = conflict_report.conflict {
                return Err(AppointmentError::ConflictDetected { interval });
            }

            update_data.insert("provider_id".to_string(), json!(effective_provider));
            update_data.insert("date".to_string(), json!(effective_date.to_string()));
            update_data.insert("start_time".to_string(), json!(effective_start.format("%H:%M:%S").to_string()));
            update_data.insert("end_time".to_string(), json!(effective_end.format("%H:%M:%S").to_string()));

            if let Some(appointment_type) = request.appointment_type {
                update_data.insert("appointment_type".to_string(), json!(appointment_type.to_string()));
            }
            if let Some(notes) = request.notes {
                update_data.insert("notes".to_string(), json!(notes));
            }

            return self.patch_appointment(appointment_id, update_data, auth_token).await;
        }

        if let Some(appointment_type) = request.appointment_type {
            update_data.insert("appointment_type".to_string(), json!(appointment_type.to_string()));
        }
        if let Some(notes) = request.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }

        if update_data.is_empty() {
            return Ok(current);
        }

        self.patch_appointment(appointment_id, update_data, auth_token).await
    }

    /// Move an appointment through its lifecycle.
    pub async fn transition_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Transitioning appointment {} to {}", appointment_id, new_status);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        self.lifecycle_service.validate_status_transition(current.status, new_status)?;

        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(new_status.to_string()));

        let updated = self.patch_appointment(appointment_id, update_data, auth_token).await?;

        info!("Appointment {} moved from {} to {}", appointment_id, current.status, new_status);
        Ok(updated)
    }

    /// Cancel an appointment, releasing its slot for other bookings.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.transition_status(appointment_id, AppointmentStatus::Cancelled, auth_token).await
    }

    /// Get appointment by ID
    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        let appointment: Appointment = serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))?;

        Ok(appointment)
    }

    /// Search appointments with filters
    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments with filters: {:?}", query);

        let mut query_parts = Vec::new();

        if let Some(provider_id) = query.provider_id {
            query_parts.push(format!("provider_id=eq.{}", provider_id));
        }
        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(date) = query.date {
            query_parts.push(format!("date=eq.{}", date));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }

        let mut path = format!("/rest/v1/appointments?{}&order=date.desc,start_time.asc",
                              query_parts.join("&"));

        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = query.offset {
            path.push_str(&format!("&offset={}", offset));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))?;

        Ok(appointments)
    }

    /// Public method to check appointment conflicts (for callers outside this cell)
    pub async fn check_conflicts(
        &self,
        provider_id: Uuid,
        date: chrono::NaiveDate,
        start_time: chrono::NaiveTime,
        end_time: chrono::NaiveTime,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<crate::models::ConflictReport, AppointmentError> {
        self.conflict_service
            .check_conflicts(provider_id, date, start_time, end_time, exclude_appointment_id, auth_token)
            .await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn verify_patient_exists(&self, patient_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::PatientNotFound(patient_id));
        }

        Ok(())
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        mut update_data: serde_json::Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        let updated: Appointment = serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse updated appointment: {}", e)))?;

        Ok(updated)
    }
}

fn map_provider_error(provider_id: Uuid, error: ProviderError) -> AppointmentError {
    match error {
        ProviderError::NotFound => AppointmentError::ProviderNotFound(provider_id),
        ProviderError::Inactive(id) => AppointmentError::ProviderInactive(id),
        other => AppointmentError::DatabaseError(other.to_string()),
    }
}
