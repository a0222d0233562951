// libs/booking-cell/src/services/requests.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use appointment_cell::models::parse_time_window;
use patient_cell::models::RegisterPatientRequest;
use patient_cell::services::registration::validate_registration;

use crate::models::{
    BookingError, BookingListQuery, BookingRequest, SubmitBookingRequest,
};

pub struct BookingRequestService {
    supabase: SupabaseClient,
}

impl BookingRequestService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Store a request from the public booking form. Runs without a user
    /// token; the store is reached with the service's anon credentials.
    pub async fn submit(&self, request: SubmitBookingRequest) -> Result<BookingRequest, BookingError> {
        debug!("Receiving public booking request for {}", request.requested_date);

        let (start_time, end_time) = parse_time_window(&request.start_time, &request.end_time)
            .map_err(|e| BookingError::ValidationError(e.to_string()))?;

        // The prospective-patient fields must already look like a valid
        // registration, otherwise acceptance is doomed from the start.
        let prospective = RegisterPatientRequest {
            full_name: request.full_name.clone(),
            contact_number: request.contact_number.clone(),
            email: request.email.clone(),
            gender: request.gender,
            region: request.region.clone(),
            date_of_birth: request.date_of_birth,
            notes: request.notes.clone(),
        };
        validate_registration(&prospective)
            .map_err(|e| BookingError::ValidationError(e.to_string()))?;

        let body = json!({
            "requested_date": request.requested_date.to_string(),
            "start_time": start_time.format("%H:%M:%S").to_string(),
            "end_time": end_time.format("%H:%M:%S").to_string(),
            "provider_id": request.provider_id,
            "full_name": request.full_name,
            "contact_number": request.contact_number,
            "email": request.email,
            "gender": request.gender.to_string(),
            "region": request.region,
            "date_of_birth": request.date_of_birth.map(|d| d.to_string()),
            "notes": request.notes,
            "status": "pending",
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/booking_requests",
            None,
            Some(body),
            Some(headers),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(BookingError::DatabaseError("Failed to store booking request".to_string()));
        }

        let stored: BookingRequest = serde_json::from_value(result[0].clone())
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse booking request: {}", e)))?;

        info!("Booking request {} stored for {}", stored.id, stored.requested_date);
        Ok(stored)
    }

    pub async fn get(&self, request_id: Uuid, auth_token: &str) -> Result<BookingRequest, BookingError> {
        debug!("Fetching booking request: {}", request_id);

        let path = format!("/rest/v1/booking_requests?id=eq.{}", request_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(BookingError::RequestNotFound);
        }

        let request: BookingRequest = serde_json::from_value(result[0].clone())
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse booking request: {}", e)))?;

        Ok(request)
    }

    pub async fn list(&self, query: BookingListQuery, auth_token: &str) -> Result<Vec<BookingRequest>, BookingError> {
        let mut query_parts = Vec::new();

        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }

        let mut path = format!("/rest/v1/booking_requests?{}&order=created_at.desc",
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
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let requests: Vec<BookingRequest> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<BookingRequest>, _>>()
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse booking requests: {}", e)))?;

        Ok(requests)
    }

    /// Flip a pending request to accepted, recording who processed it and the
    /// records it produced. The update is filtered on `status=eq.pending`, so
    /// of two concurrent accepts only one matches a row; the other gets
    /// `Ok(None)` and must undo its own writes.
    pub async fn mark_accepted(
        &self,
        request_id: Uuid,
        actor_id: &str,
        patient_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<BookingRequest>, BookingError> {
        let update = json!({
            "status": "accepted",
            "processed_by": actor_id,
            "processed_at": Utc::now().to_rfc3339(),
            "patient_id": patient_id,
            "appointment_id": appointment_id
        });

        self.mark(request_id, update, auth_token).await
    }

    /// Flip a pending request to rejected. Same single-winner filter as
    /// `mark_accepted`.
    pub async fn mark_rejected(
        &self,
        request_id: Uuid,
        actor_id: &str,
        auth_token: &str,
    ) -> Result<Option<BookingRequest>, BookingError> {
        let update = json!({
            "status": "rejected",
            "processed_by": actor_id,
            "processed_at": Utc::now().to_rfc3339()
        });

        self.mark(request_id, update, auth_token).await
    }

    async fn mark(
        &self,
        request_id: Uuid,
        update: Value,
        auth_token: &str,
    ) -> Result<Option<BookingRequest>, BookingError> {
        let path = format!(
            "/rest/v1/booking_requests?id=eq.{}&status=eq.pending",
            request_id
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update),
            Some(headers),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            // No pending row matched: either the id is unknown or someone
            // else already processed it.
            return Ok(None);
        }

        let updated: BookingRequest = serde_json::from_value(result[0].clone())
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse booking request: {}", e)))?;

        Ok(Some(updated))
    }
}
