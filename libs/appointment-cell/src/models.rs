// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use std::fmt;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    // Half-open window on the provider's clinic-local clock: start is
    // occupied, end is free.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::CheckedIn => write!(f, "checked_in"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Consultation,
    FollowUp,
    Procedure,
    Checkup,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::Consultation => write!(f, "consultation"),
            AppointmentType::FollowUp => write!(f, "follow_up"),
            AppointmentType::Procedure => write!(f, "procedure"),
            AppointmentType::Checkup => write!(f, "checkup"),
        }
    }
}

// ==============================================================================
// REQUEST / QUERY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub provider_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub appointment_type: Option<AppointmentType>,
    pub notes: Option<String>,
}

impl UpdateAppointmentRequest {
    /// True when the update moves the appointment on the calendar and the
    /// overlap check must run again.
    pub fn reschedules(&self) -> bool {
        self.provider_id.is_some()
            || self.date.is_some()
            || self.start_time.is_some()
            || self.end_time.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentSearchQuery {
    pub provider_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

/// The committed window a prospective appointment collided with. Serialized
/// into 409 responses so the caller can offer a different slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictingInterval {
    pub appointment_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    pub has_conflict: bool,
    pub conflict: Option<ConflictingInterval>,
}

impl ConflictReport {
    pub fn clear() -> Self {
        Self { has_conflict: false, conflict: None }
    }

    pub fn collision(interval: ConflictingInterval) -> Self {
        Self { has_conflict: true, conflict: Some(interval) }
    }
}

// ==============================================================================
// TIME PARSING
// ==============================================================================

/// Parses a clock time from user input. `HH:MM` is the documented form;
/// `HH:MM:SS` is accepted because the store echoes times back that way.
pub fn parse_clock_time(value: &str) -> Result<NaiveTime, AppointmentError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| AppointmentError::InvalidTime(format!("Expected HH:MM, got '{}'", value)))
}

pub fn parse_time_window(start: &str, end: &str) -> Result<(NaiveTime, NaiveTime), AppointmentError> {
    let start_time = parse_clock_time(start)?;
    let end_time = parse_clock_time(end)?;

    if end_time <= start_time {
        return Err(AppointmentError::InvalidTime(format!(
            "End time {} must be after start time {}",
            end, start
        )));
    }

    Ok((start_time, end_time))
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Provider {0} not found")]
    ProviderNotFound(Uuid),

    #[error("Provider {0} is not active")]
    ProviderInactive(Uuid),

    #[error("Patient {0} not found")]
    PatientNotFound(Uuid),

    #[error("Requested time overlaps an existing appointment")]
    ConflictDetected { interval: ConflictingInterval },

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),
}
