// libs/provider-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{ProviderError, ProviderSearchQuery};
use crate::services::directory::ProviderDirectoryService;

fn map_provider_error(e: ProviderError) -> AppError {
    match e {
        ProviderError::NotFound => AppError::NotFound("Provider not found".to_string()),
        ProviderError::NoEligibleProvider { .. } => AppError::NotFound(e.to_string()),
        ProviderError::Inactive(_) => AppError::BadRequest(e.to_string()),
        ProviderError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn list_providers(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ProviderSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ProviderDirectoryService::new(&state);

    let providers = service
        .list_providers(query, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "count": providers.len(),
        "providers": providers
    })))
}

#[axum::debug_handler]
pub async fn get_provider(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    debug!("User {} fetching provider {}", user.id, provider_id);

    let service = ProviderDirectoryService::new(&state);

    let provider = service
        .get_provider(provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "provider": provider
    })))
}
