use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, AppointmentType, CreateAppointmentRequest,
    UpdateAppointmentRequest,
};
use appointment_cell::services::AppointmentSchedulingService;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn booking_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 11).unwrap()
}

fn clock(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn create_payload(provider_id: Uuid, patient_id: Uuid) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        provider_id,
        patient_id,
        date: booking_date(),
        start_time: "09:00".to_string(),
        end_time: "09:30".to_string(),
        appointment_type: AppointmentType::Consultation,
        notes: None,
    }
}

async fn mount_active_provider(server: &MockServer, provider_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .and(query_param("id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::provider_row(provider_id, "Dr. Elena Reyes", "doctor", true)
        ])))
        .mount(server)
        .await;
}

async fn mount_known_patient(server: &MockServer, patient_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": patient_id }])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn create_commits_when_slot_is_free() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let provider_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mount_active_provider(&mock_server, provider_id).await;
    mount_known_patient(&mock_server, patient_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "provider_id": provider_id,
            "patient_id": patient_id,
            "date": "2025-06-11",
            "start_time": "09:00:00",
            "end_time": "09:30:00",
            "status": "scheduled"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                appointment_id,
                provider_id,
                patient_id,
                "2025-06-11",
                "09:00:00",
                "09:30:00",
                "scheduled",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = AppointmentSchedulingService::new(&config);
    let appointment = service
        .create_appointment(create_payload(provider_id, patient_id), "token")
        .await
        .expect("booking should succeed");

    assert_eq!(appointment.id, appointment_id);
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.start_time, clock(9, 0));
    assert_eq!(appointment.end_time, clock(9, 30));
}

#[tokio::test]
async fn create_rejects_overlap_before_insert() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let provider_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let committed_id = Uuid::new_v4();

    mount_active_provider(&mock_server, provider_id).await;
    mount_known_patient(&mock_server, patient_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                committed_id,
                provider_id,
                Uuid::new_v4(),
                "2025-06-11",
                "09:15:00",
                "09:45:00",
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    // No insert may happen once the overlap is found.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = AppointmentSchedulingService::new(&config);
    let error = service
        .create_appointment(create_payload(provider_id, patient_id), "token")
        .await
        .expect_err("overlap should be rejected");

    match error {
        AppointmentError::ConflictDetected { interval } => {
            assert_eq!(interval.appointment_id, committed_id);
            assert_eq!(interval.start_time, clock(9, 15));
            assert_eq!(interval.end_time, clock(9, 45));
        }
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn create_rejects_inactive_provider() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let provider_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .and(query_param("id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::provider_row(provider_id, "Dr. Elena Reyes", "doctor", false)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = AppointmentSchedulingService::new(&config);
    let error = service
        .create_appointment(create_payload(provider_id, patient_id), "token")
        .await
        .expect_err("inactive provider should be rejected");

    assert_matches!(error, AppointmentError::ProviderInactive(id) if id == provider_id);
}

#[tokio::test]
async fn create_rejects_inverted_window_without_touching_store() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let mut request = create_payload(Uuid::new_v4(), Uuid::new_v4());
    request.start_time = "10:00".to_string();
    request.end_time = "09:30".to_string();

    let service = AppointmentSchedulingService::new(&config);
    let error = service
        .create_appointment(request, "token")
        .await
        .expect_err("inverted window should be rejected");

    assert_matches!(error, AppointmentError::InvalidTime(_));
    // No store mocks were mounted, so any request would have failed loudly.
}

#[tokio::test]
async fn reschedule_rechecks_conflicts_excluding_itself() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let provider_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                appointment_id,
                provider_id,
                patient_id,
                "2025-06-11",
                "09:00:00",
                "09:30:00",
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", format!("eq.{}", provider_id)))
        .and(query_param("id", format!("neq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({
            "start_time": "10:00:00",
            "end_time": "10:30:00"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                appointment_id,
                provider_id,
                patient_id,
                "2025-06-11",
                "10:00:00",
                "10:30:00",
                "scheduled",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let update = UpdateAppointmentRequest {
        provider_id: None,
        date: None,
        start_time: Some("10:00".to_string()),
        end_time: Some("10:30".to_string()),
        appointment_type: None,
        notes: None,
    };

    let service = AppointmentSchedulingService::new(&config);
    let appointment = service
        .update_appointment(appointment_id, update, "token")
        .await
        .expect("reschedule should succeed");

    assert_eq!(appointment.start_time, clock(10, 0));
    assert_eq!(appointment.end_time, clock(10, 30));
}

#[tokio::test]
async fn terminal_appointment_cannot_be_modified() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                appointment_id,
                Uuid::new_v4(),
                Uuid::new_v4(),
                "2025-06-11",
                "09:00:00",
                "09:30:00",
                "completed",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let update = UpdateAppointmentRequest {
        provider_id: None,
        date: None,
        start_time: Some("10:00".to_string()),
        end_time: Some("10:30".to_string()),
        appointment_type: None,
        notes: None,
    };

    let service = AppointmentSchedulingService::new(&config);
    let error = service
        .update_appointment(appointment_id, update, "token")
        .await
        .expect_err("terminal appointments are frozen");

    assert_matches!(error, AppointmentError::ValidationError(_));
}

#[tokio::test]
async fn status_transitions_follow_the_lifecycle() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

    let appointment_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                appointment_id,
                provider_id,
                patient_id,
                "2025-06-11",
                "09:00:00",
                "09:30:00",
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({ "status": "checked_in" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                appointment_id,
                provider_id,
                patient_id,
                "2025-06-11",
                "09:00:00",
                "09:30:00",
                "checked_in",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = AppointmentSchedulingService::new(&config);

    // Scheduled cannot jump straight to completed.
    let error = service
        .transition_status(appointment_id, AppointmentStatus::Completed, "token")
        .await
        .expect_err("skipping the lifecycle should fail");
    assert_matches!(error, AppointmentError::InvalidStatusTransition { .. });

    // The documented next step works.
    let appointment = service
        .transition_status(appointment_id, AppointmentStatus::CheckedIn, "token")
        .await
        .expect("check-in should succeed");
    assert_eq!(appointment.status, AppointmentStatus::CheckedIn);
}
