use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Provider, ProviderError, ProviderRole};

/// Resolves which provider takes an appointment when the request does not pin
/// one. First-available policy: lowest provider id among active providers
/// whose role is eligible. Existing load on the day is not considered, so one
/// provider can absorb every fallback booking.
pub struct FallbackAssigner {
    supabase: SupabaseClient,
}

impl FallbackAssigner {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn assign(
        &self,
        eligible_roles: &[ProviderRole],
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Provider, ProviderError> {
        if eligible_roles.is_empty() {
            return Err(ProviderError::NoEligibleProvider {
                roles: String::new(),
                date,
            });
        }

        let roles_filter = eligible_roles
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let path = format!(
            "/rest/v1/providers?is_active=eq.true&role=in.({})&order=id.asc&limit=1",
            roles_filter
        );
        debug!("Resolving fallback provider: {}", path);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            warn!("No eligible provider for roles [{}] on {}", roles_filter, date);
            return Err(ProviderError::NoEligibleProvider {
                roles: roles_filter,
                date,
            });
        }

        let provider: Provider = serde_json::from_value(result[0].clone())
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        info!(
            "Assigned fallback provider {} ({}) for {}",
            provider.id, provider.role, date
        );
        Ok(provider)
    }

    /// Validates a provider pinned by the booking request: it must exist and
    /// be active to take the slot.
    pub async fn resolve_pinned(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Provider, ProviderError> {
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

        let provider: Provider = serde_json::from_value(result[0].clone())
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if !provider.is_active {
            return Err(ProviderError::Inactive(provider.id));
        }

        Ok(provider)
    }
}
