use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use patient_cell::models::{Gender, PatientError, RegisterPatientRequest};
use patient_cell::services::PatientRegistrationService;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn registration_payload() -> RegisterPatientRequest {
    RegisterPatientRequest {
        full_name: "Maria Santos".to_string(),
        contact_number: "+639175550101".to_string(),
        email: Some("maria.santos@example.com".to_string()),
        gender: Gender::Female,
        region: "NCR".to_string(),
        date_of_birth: chrono::NaiveDate::from_ymd_opt(1990, 1, 1),
        notes: None,
    }
}

async fn mount_code_peek(server: &MockServer, codes: &[&str]) {
    // The allocator peeks the highest committed code before every attempt.
    for code in codes {
        Mock::given(method("GET"))
            .and(path("/rest/v1/patients"))
            .and(query_param("select", "patient_code"))
            .and(query_param("order", "patient_code.desc"))
            .and(query_param("limit", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "patient_code": code }])),
            )
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn register_allocates_next_code_after_current_max() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    mount_code_peek(&mock_server, &["PT-00041"]).await;

    let patient_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .and(body_partial_json(json!({ "patient_code": "PT-00042" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::patient_row(patient_id, "PT-00042", "Maria Santos")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = PatientRegistrationService::new(&config);
    let patient = service
        .register(registration_payload(), "token")
        .await
        .expect("registration should succeed");

    assert_eq!(patient.patient_code, "PT-00042");
    assert_eq!(patient.id, patient_id);
}

#[tokio::test]
async fn register_starts_sequence_at_one_for_empty_store() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("select", "patient_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .and(body_partial_json(json!({ "patient_code": "PT-00001" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::patient_row(Uuid::new_v4(), "PT-00001", "Maria Santos")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = PatientRegistrationService::new(&config);
    let patient = service
        .register(registration_payload(), "token")
        .await
        .expect("registration should succeed");

    assert_eq!(patient.patient_code, "PT-00001");
}

#[tokio::test]
async fn register_retries_with_fresh_code_after_collision() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    // First peek sees PT-00041; a rival commits PT-00042 before our insert
    // lands, so the second peek sees the rival's row.
    mount_code_peek(&mock_server, &["PT-00041", "PT-00042"]).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .and(body_partial_json(json!({ "patient_code": "PT-00042" })))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::unique_violation_body("patients_patient_code_key"),
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .and(body_partial_json(json!({ "patient_code": "PT-00043" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::patient_row(Uuid::new_v4(), "PT-00043", "Maria Santos")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = PatientRegistrationService::new(&config);
    let patient = service
        .register(registration_payload(), "token")
        .await
        .expect("second attempt should win");

    assert_eq!(patient.patient_code, "PT-00043");
}

#[tokio::test]
async fn register_gives_up_after_three_collisions() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("select", "patient_code"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "patient_code": "PT-00041" }])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::unique_violation_body("patients_patient_code_key"),
        ))
        .expect(3)
        .mount(&mock_server)
        .await;

    let service = PatientRegistrationService::new(&config);
    let result = service.register(registration_payload(), "token").await;

    assert_matches!(
        result,
        Err(PatientError::AllocationExhausted { attempts: 3 })
    );
}

#[tokio::test]
async fn invalid_payload_never_reaches_store() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut payload = registration_payload();
    payload.contact_number = "call me maybe".to_string();

    let service = PatientRegistrationService::new(&config);
    let result = service.register(payload, "token").await;

    assert_matches!(result, Err(PatientError::ValidationError(_)));
}
