// libs/booking-cell/src/services/orchestrator.rs
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::{GateAction, PermissionGate};

use appointment_cell::models::{AppointmentError, AppointmentType, CreateAppointmentRequest};
use appointment_cell::services::scheduling::AppointmentSchedulingService;
use patient_cell::models::{PatientError, RegisterPatientRequest};
use patient_cell::services::patient::PatientService;
use patient_cell::services::registration::{validate_registration, PatientRegistrationService};
use provider_cell::models::{Provider, ProviderError, ProviderRole};
use provider_cell::services::assigner::FallbackAssigner;

use crate::models::{
    AcceptBookingRequest, BookingAcceptance, BookingError, BookingRequest,
    BookingRequestStatus, RejectBookingRequest,
};
use crate::services::requests::BookingRequestService;
use crate::services::saga::CompensationStack;

/// Roles that can take a clinical appointment when the requester did not pin
/// a provider.
const CLINICAL_ROLES: [ProviderRole; 3] = [
    ProviderRole::Doctor,
    ProviderRole::Consultant,
    ProviderRole::Nurse,
];

/// Turns one pending booking request into a committed patient + appointment,
/// or fails with no partial state. Every write after the patient insert is
/// covered by the compensation stack; the final request-status write is the
/// deliberate exception (see `accept`).
pub struct BookingOrchestrator {
    config: AppConfig,
    gate: Arc<dyn PermissionGate>,
    requests: BookingRequestService,
    registration: PatientRegistrationService,
    scheduling: AppointmentSchedulingService,
    assigner: FallbackAssigner,
}

impl BookingOrchestrator {
    pub fn new(config: &AppConfig, gate: Arc<dyn PermissionGate>) -> Self {
        Self {
            config: config.clone(),
            gate,
            requests: BookingRequestService::new(config),
            registration: PatientRegistrationService::new(config),
            scheduling: AppointmentSchedulingService::new(config),
            assigner: FallbackAssigner::new(config),
        }
    }

    #[instrument(skip(self, overrides, actor, auth_token), fields(actor_id = %actor.id))]
    pub async fn accept(
        &self,
        request_id: Uuid,
        overrides: AcceptBookingRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<BookingAcceptance, BookingError> {
        info!("Accepting booking request {}", request_id);

        self.authorize(actor).await?;

        let request = self.requests.get(request_id, auth_token).await?;
        if request.status != BookingRequestStatus::Pending {
            return Err(BookingError::AlreadyProcessed { status: request.status });
        }

        // An invalid request gets rejected, not retried. The reject write is
        // best-effort: the caller's error is the validation failure either way.
        let prospective = merge_registration(&request, overrides);
        if let Err(validation) = self.validate_merged(&request, &prospective) {
            warn!("Booking request {} failed validation: {}", request_id, validation);
            if let Err(reject_error) = self.requests.mark_rejected(request_id, &actor.id, auth_token).await {
                warn!("Could not mark booking request {} rejected: {}", request_id, reject_error);
            }
            return Err(validation);
        }

        // Read-only preflight: a doomed request should not cost a patient
        // write. Both checks run again later, after the writes they protect.
        let preflight_provider = self.resolve_provider(&request, auth_token).await?;
        let preflight = self.scheduling.check_conflicts(
            preflight_provider.id,
            request.requested_date,
            request.start_time,
            request.end_time,
            None,
            auth_token,
        ).await.map_err(map_appointment_error)?;

        if let Some(interval) = preflight.conflict {
            return Err(BookingError::ConflictDetected { interval });
        }

        // First committed side effect. From here on every failure unwinds.
        let mut compensations = CompensationStack::new();

        let patient = self.registration.register(prospective, auth_token).await
            .map_err(map_patient_error)?;
        info!("Registered patient {} ({}) for booking request {}",
              patient.id, patient.patient_code, request_id);

        {
            let config = self.config.clone();
            let patient_id = patient.id;
            let token = auth_token.to_string();
            compensations.arm("delete orphaned patient", move || async move {
                PatientService::new(&config)
                    .delete_patient(patient_id, &token)
                    .await
                    .map_err(|e| format!("patient {}: {}", patient_id, e))
            });
        }

        // The fallback pool may have changed while the patient was being
        // registered; resolve again. Pinned providers are re-validated by the
        // appointment create below.
        let provider = match request.provider_id {
            Some(_) => preflight_provider,
            None => match self.assigner.assign(&CLINICAL_ROLES, request.requested_date, auth_token).await {
                Ok(provider) => provider,
                Err(e) => {
                    let mapped = map_fallback_error(&request, e);
                    compensations.unwind(&mapped.to_string()).await;
                    return Err(mapped);
                }
            },
        };

        // Conflict re-check and insert run under the provider's slot lock
        // inside the scheduling service.
        let create = CreateAppointmentRequest {
            provider_id: provider.id,
            patient_id: patient.id,
            date: request.requested_date,
            start_time: request.start_time.format("%H:%M").to_string(),
            end_time: request.end_time.format("%H:%M").to_string(),
            appointment_type: AppointmentType::Consultation,
            notes: request.notes.clone(),
        };

        let appointment = match self.scheduling.create_appointment(create, auth_token).await {
            Ok(appointment) => appointment,
            Err(e) => {
                let mapped = map_appointment_error(e);
                compensations.unwind(&mapped.to_string()).await;
                return Err(mapped);
            }
        };

        {
            let config = self.config.clone();
            let appointment_id = appointment.id;
            let token = auth_token.to_string();
            compensations.arm("cancel orphaned appointment", move || async move {
                AppointmentSchedulingService::new(&config)
                    .cancel_appointment(appointment_id, &token)
                    .await
                    .map(|_| ())
                    .map_err(|e| format!("appointment {}: {}", appointment_id, e))
            });
        }

        // Terminal step. Three outcomes:
        //   - the pending row flipped: done;
        //   - no pending row matched: a concurrent accept won, unwind ours;
        //   - the write itself failed: the records stand and the stale status
        //     is reported as a warning, because undoing a live appointment is
        //     worse than a stale bookkeeping field.
        match self.requests.mark_accepted(request_id, &actor.id, patient.id, appointment.id, auth_token).await {
            Ok(Some(_)) => {
                compensations.disarm();
                info!("Booking request {} accepted: patient {}, appointment {}",
                      request_id, patient.patient_code, appointment.id);
                Ok(BookingAcceptance {
                    request_id,
                    patient,
                    appointment,
                    warning: None,
                })
            }
            Ok(None) => {
                let failure = format!("booking request {} was processed concurrently", request_id);
                warn!("{}; rolling back this accept", failure);
                compensations.unwind(&failure).await;

                let status = match self.requests.get(request_id, auth_token).await {
                    Ok(current) => current.status,
                    Err(_) => BookingRequestStatus::Accepted,
                };
                Err(BookingError::AlreadyProcessed { status })
            }
            Err(e) => {
                warn!("Booking request {} accepted but the status write failed: {}", request_id, e);
                compensations.disarm();
                Ok(BookingAcceptance {
                    request_id,
                    patient,
                    appointment,
                    warning: Some(
                        "Booking accepted, but the request record still shows pending and needs a manual status correction".to_string(),
                    ),
                })
            }
        }
    }

    #[instrument(skip(self, payload, actor, auth_token), fields(actor_id = %actor.id))]
    pub async fn reject(
        &self,
        request_id: Uuid,
        payload: RejectBookingRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<BookingRequest, BookingError> {
        info!("Rejecting booking request {}", request_id);

        self.authorize(actor).await?;

        let request = self.requests.get(request_id, auth_token).await?;
        if request.status != BookingRequestStatus::Pending {
            return Err(BookingError::AlreadyProcessed { status: request.status });
        }

        if let Some(reason) = &payload.reason {
            info!("Booking request {} rejected by {}: {}", request_id, actor.id, reason);
        }

        match self.requests.mark_rejected(request_id, &actor.id, auth_token).await? {
            Some(updated) => Ok(updated),
            None => {
                let status = match self.requests.get(request_id, auth_token).await {
                    Ok(current) => current.status,
                    Err(_) => BookingRequestStatus::Rejected,
                };
                Err(BookingError::AlreadyProcessed { status })
            }
        }
    }

    async fn authorize(&self, actor: &User) -> Result<(), BookingError> {
        self.gate
            .authorize(actor, GateAction::ProcessBookingRequest)
            .await
            .map_err(|e| match e {
                AppError::Forbidden(message) | AppError::Auth(message) => {
                    BookingError::Forbidden(message)
                }
                other => BookingError::Forbidden(other.to_string()),
            })
    }

    fn validate_merged(
        &self,
        request: &BookingRequest,
        registration: &RegisterPatientRequest,
    ) -> Result<(), BookingError> {
        if request.end_time <= request.start_time {
            return Err(BookingError::ValidationError(format!(
                "End time {} must be after start time {}",
                request.end_time, request.start_time
            )));
        }

        validate_registration(registration)
            .map_err(|e| BookingError::ValidationError(e.to_string()))
    }

    async fn resolve_provider(
        &self,
        request: &BookingRequest,
        auth_token: &str,
    ) -> Result<Provider, BookingError> {
        match request.provider_id {
            Some(pinned) => {
                debug!("Booking request {} pins provider {}", request.id, pinned);
                self.assigner.resolve_pinned(pinned, auth_token).await.map_err(|e| match e {
                    ProviderError::NotFound => BookingError::ProviderNotFound(pinned),
                    ProviderError::Inactive(id) => BookingError::ProviderInactive(id),
                    other => BookingError::DatabaseError(other.to_string()),
                })
            }
            None => self
                .assigner
                .assign(&CLINICAL_ROLES, request.requested_date, auth_token)
                .await
                .map_err(|e| map_fallback_error(request, e)),
        }
    }
}

fn merge_registration(request: &BookingRequest, overrides: AcceptBookingRequest) -> RegisterPatientRequest {
    RegisterPatientRequest {
        full_name: overrides.full_name.unwrap_or_else(|| request.full_name.clone()),
        contact_number: overrides.contact_number.unwrap_or_else(|| request.contact_number.clone()),
        email: overrides.email.or_else(|| request.email.clone()),
        gender: overrides.gender.unwrap_or(request.gender),
        region: overrides.region.unwrap_or_else(|| request.region.clone()),
        date_of_birth: overrides.date_of_birth.or(request.date_of_birth),
        notes: overrides.notes.or_else(|| request.notes.clone()),
    }
}

fn map_patient_error(error: PatientError) -> BookingError {
    match error {
        PatientError::AllocationExhausted { attempts } => {
            BookingError::AllocationExhausted { attempts }
        }
        PatientError::ValidationError(message) => BookingError::ValidationError(message),
        other => BookingError::DatabaseError(other.to_string()),
    }
}

fn map_appointment_error(error: AppointmentError) -> BookingError {
    match error {
        AppointmentError::ConflictDetected { interval } => {
            BookingError::ConflictDetected { interval }
        }
        AppointmentError::ProviderNotFound(id) => BookingError::ProviderNotFound(id),
        AppointmentError::ProviderInactive(id) => BookingError::ProviderInactive(id),
        AppointmentError::InvalidTime(message) => BookingError::ValidationError(message),
        AppointmentError::ValidationError(message) => BookingError::ValidationError(message),
        other => BookingError::DatabaseError(other.to_string()),
    }
}

fn map_fallback_error(request: &BookingRequest, error: ProviderError) -> BookingError {
    match error {
        ProviderError::NoEligibleProvider { .. } => BookingError::NoEligibleProvider {
            date: request.requested_date,
        },
        other => BookingError::DatabaseError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use patient_cell::models::Gender;

    fn pending_request() -> BookingRequest {
        BookingRequest {
            id: Uuid::new_v4(),
            requested_date: NaiveDate::from_ymd_opt(2025, 6, 11).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            provider_id: None,
            full_name: "Maria Santos".to_string(),
            contact_number: "+639175550101".to_string(),
            email: None,
            gender: Gender::Female,
            region: "NCR".to_string(),
            date_of_birth: None,
            notes: None,
            status: BookingRequestStatus::Pending,
            processed_by: None,
            processed_at: None,
            patient_id: None,
            appointment_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn overrides_replace_stored_fields() {
        let request = pending_request();
        let overrides = AcceptBookingRequest {
            full_name: Some("Maria S. Santos".to_string()),
            contact_number: None,
            email: Some("maria@example.com".to_string()),
            gender: None,
            region: None,
            date_of_birth: None,
            notes: Some("walk-in verified".to_string()),
        };

        let merged = merge_registration(&request, overrides);

        assert_eq!(merged.full_name, "Maria S. Santos");
        assert_eq!(merged.contact_number, "+639175550101");
        assert_eq!(merged.email.as_deref(), Some("maria@example.com"));
        assert_eq!(merged.region, "NCR");
        assert_eq!(merged.notes.as_deref(), Some("walk-in verified"));
    }

    #[test]
    fn empty_overrides_keep_the_request_as_submitted() {
        let request = pending_request();
        let merged = merge_registration(&request, AcceptBookingRequest::default());

        assert_eq!(merged.full_name, request.full_name);
        assert_eq!(merged.contact_number, request.contact_number);
        assert_eq!(merged.gender, request.gender);
    }

    #[test]
    fn allocation_exhaustion_is_surfaced_as_retryable() {
        let mapped = map_patient_error(PatientError::AllocationExhausted { attempts: 3 });
        assert_matches::assert_matches!(
            mapped,
            BookingError::AllocationExhausted { attempts: 3 }
        );
    }
}
