// libs/booking-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use std::fmt;

use appointment_cell::models::{Appointment, ConflictingInterval};
use patient_cell::models::{Gender, Patient};

// ==============================================================================
// BOOKING REQUEST MODELS
// ==============================================================================

/// A prospective booking submitted through the public form. Mutated exactly
/// once, by the orchestrator, when staff accept or reject it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Uuid,
    pub requested_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Provider the requester asked for, if any. `None` means the clinic
    /// assigns one on acceptance.
    pub provider_id: Option<Uuid>,
    pub full_name: String,
    pub contact_number: String,
    pub email: Option<String>,
    pub gender: Gender,
    pub region: String,
    pub date_of_birth: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: BookingRequestStatus,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub patient_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl fmt::Display for BookingRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingRequestStatus::Pending => write!(f, "pending"),
            BookingRequestStatus::Accepted => write!(f, "accepted"),
            BookingRequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

// ==============================================================================
// REQUEST / QUERY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBookingRequest {
    pub full_name: String,
    pub contact_number: String,
    pub email: Option<String>,
    pub gender: Gender,
    pub region: String,
    pub date_of_birth: Option<NaiveDate>,
    pub requested_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub provider_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Staff corrections applied on acceptance. Every field overrides the stored
/// request value before the merged payload is validated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptBookingRequest {
    pub full_name: Option<String>,
    pub contact_number: Option<String>,
    pub email: Option<String>,
    pub gender: Option<Gender>,
    pub region: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectBookingRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingListQuery {
    pub status: Option<BookingRequestStatus>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

/// Outcome of a successful accept: the committed records, plus a warning when
/// the final request-status write failed and the bookkeeping is stale.
#[derive(Debug, Clone, Serialize)]
pub struct BookingAcceptance {
    pub request_id: Uuid,
    pub patient: Patient,
    pub appointment: Appointment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    #[error("Booking request not found")]
    RequestNotFound,

    #[error("Booking request is already {status}")]
    AlreadyProcessed { status: BookingRequestStatus },

    #[error("{0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No eligible provider available on {date}")]
    NoEligibleProvider { date: NaiveDate },

    #[error("Provider {0} not found")]
    ProviderNotFound(Uuid),

    #[error("Provider {0} is not active")]
    ProviderInactive(Uuid),

    #[error("Requested time overlaps an existing appointment")]
    ConflictDetected { interval: ConflictingInterval },

    #[error("Patient identifier allocation exhausted after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    #[error("Database error: {0}")]
    DatabaseError(String),
}
