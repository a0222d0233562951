use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use provider_cell::router::provider_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn test_config(store_url: &str) -> AppConfig {
    TestConfig::with_store_url(store_url).to_app_config()
}

fn create_test_app(config: AppConfig) -> Router {
    provider_routes(Arc::new(config))
}

#[tokio::test]
async fn list_providers_requires_auth() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server.uri()));

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn list_providers_returns_directory_rows() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let app = create_test_app(config.clone());

    let user = TestUser::receptionist("desk@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .and(query_param("order", "full_name.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::provider_row(Uuid::new_v4(), "Dr. Ana Reyes", "doctor", true),
            MockSupabaseResponses::provider_row(Uuid::new_v4(), "Nurse Io Cruz", "nurse", true),
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json_response["success"], true);
    assert_eq!(json_response["count"], 2);
    assert!(json_response["providers"].is_array());
}
