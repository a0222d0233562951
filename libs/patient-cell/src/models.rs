use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub patient_code: String,
    pub full_name: String,
    pub contact_number: String,
    pub email: Option<String>,
    pub gender: Gender,
    pub region: String,
    pub date_of_birth: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: PatientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn age(&self) -> Option<i32> {
        let today = Utc::now().date_naive();
        self.date_of_birth
            .map(|dob| today.years_since(dob).unwrap_or(0) as i32)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
    Other,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Female => write!(f, "female"),
            Gender::Male => write!(f, "male"),
            Gender::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Active,
    Inactive,
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatientStatus::Active => write!(f, "active"),
            PatientStatus::Inactive => write!(f, "inactive"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPatientRequest {
    pub full_name: String,
    pub contact_number: String,
    pub email: Option<String>,
    pub gender: Gender,
    pub region: String,
    pub date_of_birth: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSearchQuery {
    pub code: Option<String>,
    pub name: Option<String>,
    pub status: Option<PatientStatus>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Patient code {code} was committed by a concurrent registration")]
    CodeCollision { code: String },

    #[error("Could not allocate a unique patient code after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
