use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Provider, ProviderError, ProviderSearchQuery};

pub struct ProviderDirectoryService {
    supabase: SupabaseClient,
}

impl ProviderDirectoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Provider, ProviderError> {
        debug!("Fetching provider: {}", provider_id);

        let path = format!("/rest/v1/providers?id=eq.{}", provider_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ProviderError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))
    }

    pub async fn list_providers(
        &self,
        query: ProviderSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Provider>, ProviderError> {
        let mut query_parts: Vec<String> = Vec::new();

        if let Some(role) = query.role {
            query_parts.push(format!("role=eq.{}", role));
        }
        if let Some(active) = query.active {
            query_parts.push(format!("is_active=eq.{}", active));
        }
        query_parts.push("order=full_name.asc".to_string());

        let path = format!("/rest/v1/providers?{}", query_parts.join("&"));
        debug!("Listing providers: {}", path);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Provider>, _>>()
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))
    }
}
