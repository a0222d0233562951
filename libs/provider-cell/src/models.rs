// libs/provider-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub full_name: String,
    pub role: ProviderRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    Doctor,
    Consultant,
    Nurse,
    Receptionist,
}

impl fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderRole::Doctor => write!(f, "doctor"),
            ProviderRole::Consultant => write!(f, "consultant"),
            ProviderRole::Nurse => write!(f, "nurse"),
            ProviderRole::Receptionist => write!(f, "receptionist"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSearchQuery {
    pub role: Option<ProviderRole>,
    pub active: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not found")]
    NotFound,

    #[error("No eligible provider for roles [{roles}] on {date}")]
    NoEligibleProvider { roles: String, date: NaiveDate },

    #[error("Provider {0} is not active")]
    Inactive(Uuid),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
