use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Patient, PatientError, PatientSearchQuery};

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Fetching patient profile: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(PatientError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| PatientError::DatabaseError(e.to_string()))
    }

    pub async fn search_patients(
        &self,
        query: PatientSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Patient>, PatientError> {
        debug!("Searching patients with query: {:?}", query);

        let mut query_parts = vec![];

        if let Some(code) = query.code {
            query_parts.push(format!("patient_code=eq.{}", code));
        }
        if let Some(name) = query.name {
            query_parts.push(format!("full_name=ilike.%{}%", name));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }

        let limit = query.limit.unwrap_or(50);
        let offset = query.offset.unwrap_or(0);
        query_parts.push(format!("order=patient_code.asc&limit={}&offset={}", limit, offset));

        let path = format!("/rest/v1/patients?{}", query_parts.join("&"));

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PatientError::DatabaseError(e.to_string()))
    }

    /// Hard-deletes a patient row. Only the booking saga calls this, to undo
    /// a registration whose appointment never materialized; there is no HTTP
    /// surface for it.
    pub async fn delete_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<(), PatientError> {
        info!("Deleting patient record {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        // Asking for the representation turns the 204 into a row array, so we
        // can tell a real delete from a no-op.
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(headers),
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        if deleted.is_empty() {
            tracing::warn!("Delete of patient {} matched no rows", patient_id);
        }

        Ok(())
    }
}
