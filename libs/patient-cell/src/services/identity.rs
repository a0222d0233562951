use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::PatientError;

pub const PATIENT_CODE_PREFIX: &str = "PT-";

/// Produces candidate patient codes (`PT-00042`) by peeking the highest code
/// already committed. Allocation is optimistic: this service never inserts,
/// and two concurrent callers can receive the same candidate. The unique
/// constraint on `patient_code` is the arbiter; the registration service owns
/// the retry loop around it.
pub struct PatientIdAllocator {
    supabase: SupabaseClient,
}

impl PatientIdAllocator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn allocate(&self, auth_token: &str) -> Result<String, PatientError> {
        let path = "/rest/v1/patients?select=patient_code&order=patient_code.desc&limit=1";

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let next = match result.first().and_then(|row| row["patient_code"].as_str()) {
            Some(code) => parse_sequence(code)? + 1,
            None => 1,
        };

        let candidate = format_code(next);
        debug!("Allocated candidate patient code {}", candidate);
        Ok(candidate)
    }
}

// Zero-padded to five digits so ordering stays lexicographic below 100000.
fn format_code(sequence: u32) -> String {
    format!("{}{:05}", PATIENT_CODE_PREFIX, sequence)
}

fn parse_sequence(code: &str) -> Result<u32, PatientError> {
    code.strip_prefix(PATIENT_CODE_PREFIX)
        .and_then(|digits| digits.parse::<u32>().ok())
        .ok_or_else(|| {
            PatientError::DatabaseError(format!("Malformed patient code in store: {}", code))
        })
}
