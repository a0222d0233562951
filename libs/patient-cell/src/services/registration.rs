use std::time::Duration;

use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use chrono::Utc;

use shared_config::AppConfig;
use shared_database::{StoreError, supabase::SupabaseClient};

use crate::models::{Patient, PatientError, RegisterPatientRequest};
use crate::services::identity::PatientIdAllocator;

const MAX_ALLOCATION_ATTEMPTS: u32 = 3;
const ALLOCATION_BACKOFF_BASE_MS: u64 = 50;

/// Registers patients under the optimistic code-allocation scheme: allocate a
/// candidate code, try the insert, and treat a unique-key rejection as a lost
/// race. Each retry re-peeks the store so the fresh candidate accounts for
/// whoever won.
pub struct PatientRegistrationService {
    supabase: SupabaseClient,
    allocator: PatientIdAllocator,
}

impl PatientRegistrationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            allocator: PatientIdAllocator::new(config),
        }
    }

    pub async fn register(
        &self,
        request: RegisterPatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        validate_registration(&request)?;

        for attempt in 0..MAX_ALLOCATION_ATTEMPTS {
            let candidate = self.allocator.allocate(auth_token).await?;

            match self.insert_patient(&request, &candidate, auth_token).await {
                Ok(patient) => {
                    info!(
                        "Registered patient {} with code {}",
                        patient.id, patient.patient_code
                    );
                    return Ok(patient);
                }
                Err(PatientError::CodeCollision { code }) => {
                    let backoff =
                        Duration::from_millis(ALLOCATION_BACKOFF_BASE_MS * 2u64.pow(attempt));
                    warn!(
                        "Patient code {} was taken concurrently (attempt {}), backing off {:?}",
                        code,
                        attempt + 1,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }

        error!(
            "Patient code allocation exhausted after {} attempts",
            MAX_ALLOCATION_ATTEMPTS
        );
        Err(PatientError::AllocationExhausted {
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }

    async fn insert_patient(
        &self,
        request: &RegisterPatientRequest,
        patient_code: &str,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Inserting patient with candidate code {}", patient_code);

        let now = Utc::now().to_rfc3339();
        let patient_data = json!({
            "patient_code": patient_code,
            "full_name": request.full_name,
            "contact_number": request.contact_number,
            "email": request.email,
            "gender": request.gender,
            "region": request.region,
            "date_of_birth": request.date_of_birth,
            "notes": request.notes,
            "status": "active",
            "created_at": now,
            "updated_at": now
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/patients",
            Some(auth_token),
            Some(patient_data),
            Some(headers),
        ).await.map_err(|e| match e {
            StoreError::UniqueViolation { .. } => PatientError::CodeCollision {
                code: patient_code.to_string(),
            },
            other => PatientError::DatabaseError(other.to_string()),
        })?;

        if result.is_empty() {
            return Err(PatientError::DatabaseError(
                "Insert returned no representation".to_string(),
            ));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| PatientError::DatabaseError(e.to_string()))
    }
}

pub fn validate_registration(request: &RegisterPatientRequest) -> Result<(), PatientError> {
    if request.full_name.trim().is_empty() {
        return Err(PatientError::ValidationError(
            "Full name is required".to_string(),
        ));
    }
    if request.region.trim().is_empty() {
        return Err(PatientError::ValidationError(
            "Region is required".to_string(),
        ));
    }

    // Grouping characters are presentation only; E.164 bounds apply to the
    // digits that remain.
    let normalized: String = request
        .contact_number
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();
    let phone_regex = Regex::new(r"^\+?[1-9]\d{6,14}$").unwrap();
    if !phone_regex.is_match(&normalized) {
        return Err(PatientError::ValidationError(format!(
            "Invalid contact number: {}",
            request.contact_number
        )));
    }

    if let Some(email) = &request.email {
        let email_regex =
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
        if !email_regex.is_match(email) || email.len() > 254 {
            return Err(PatientError::ValidationError(format!(
                "Invalid email address: {}",
                email
            )));
        }
    }

    if let Some(dob) = request.date_of_birth {
        if dob > Utc::now().date_naive() {
            return Err(PatientError::ValidationError(
                "Date of birth cannot be in the future".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;
    use assert_matches::assert_matches;

    fn valid_request() -> RegisterPatientRequest {
        RegisterPatientRequest {
            full_name: "Maria Santos".to_string(),
            contact_number: "+639175550101".to_string(),
            email: Some("maria.santos@example.com".to_string()),
            gender: Gender::Female,
            region: "NCR".to_string(),
            date_of_birth: chrono::NaiveDate::from_ymd_opt(1990, 1, 1),
            notes: None,
        }
    }

    #[test]
    fn accepts_well_formed_registration() {
        assert!(validate_registration(&valid_request()).is_ok());
    }

    #[test]
    fn rejects_blank_name() {
        let mut request = valid_request();
        request.full_name = "  ".to_string();
        assert_matches!(
            validate_registration(&request),
            Err(PatientError::ValidationError(_))
        );
    }

    #[test]
    fn rejects_malformed_contact_number() {
        let mut request = valid_request();
        request.contact_number = "not-a-number".to_string();
        assert_matches!(
            validate_registration(&request),
            Err(PatientError::ValidationError(_))
        );
    }

    #[test]
    fn accepts_grouped_contact_number() {
        let mut request = valid_request();
        request.contact_number = "+63 917 555 0101".to_string();
        assert!(validate_registration(&request).is_ok());
    }

    #[test]
    fn rejects_future_date_of_birth() {
        let mut request = valid_request();
        request.date_of_birth = Some(Utc::now().date_naive() + chrono::Duration::days(30));
        assert_matches!(
            validate_registration(&request),
            Err(PatientError::ValidationError(_))
        );
    }

    #[test]
    fn email_is_optional() {
        let mut request = valid_request();
        request.email = None;
        assert!(validate_registration(&request).is_ok());
    }
}
