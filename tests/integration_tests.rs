//! End-to-end coverage of the HTTP surface over a real bound socket, plus
//! the SOS failsafe against the same backend the service reads from.
//!
//! No agency keys are configured here, so arrival paths exercise the
//! credential and error-envelope behavior rather than live upstreams.

use railguard::agencies::AdapterRegistry;
use railguard::config::AppConfig;
use railguard::emergency::{GeoFix, SosButton, SosContext, StaticLocation};
use railguard::http::{build_router, AppState};
use railguard::store::{Backend, MemoryBackend};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

async fn spawn_service() -> (String, Arc<MemoryBackend>) {
    let registry = Arc::new(AdapterRegistry::from_config(&AppConfig::default()).unwrap());
    let backend = Arc::new(MemoryBackend::new());
    let state = AppState::new(registry, backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    (format!("http://{addr}"), backend)
}

fn incident_body(reporter: Uuid) -> Value {
    json!({
        "reporter_id": reporter,
        "city": "chicago",
        "incident_type": "harassment",
        "transit_line": "Red",
        "location_name": "Howard",
        "description": "person following riders between cars"
    })
}

fn ride_body(creator: Uuid, max_spots: u32) -> Value {
    json!({
        "creator_id": creator,
        "city": "chicago",
        "origin": "Howard",
        "destination": "Monroe",
        "departure_at": "2026-08-05T22:30:00Z",
        "max_spots": max_spots
    })
}

#[tokio::test]
async fn test_healthz() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_agencies_listing_is_stable_across_requests() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();

    let first: Value = client
        .get(format!("{base}/v1/agencies"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: Value = client
        .get(format!("{base}/v1/agencies"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let agencies = first["agencies"].as_array().unwrap();
    assert_eq!(agencies.len(), 9);
    // Keyless startup: nothing requiring credentials reports ready.
    let cta = agencies.iter().find(|a| a["id"] == "cta").unwrap();
    assert_eq!(cta["ready"], false);
    let septa = agencies.iter().find(|a| a["id"] == "septa").unwrap();
    assert_eq!(septa["ready"], true);

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_unknown_agency_is_404_with_envelope() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/v1/arrivals/bart?station=EMBR"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unknown_agency");
    assert!(body["error"]["details"]["supported"]
        .as_array()
        .unwrap()
        .iter()
        .any(|a| a == "cta"));
}

#[tokio::test]
async fn test_blank_station_is_invalid_params() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/v1/arrivals/cta?station=%20"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_params");
}

#[tokio::test]
async fn test_missing_credentials_are_503_not_smuggled_200() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/v1/arrivals/cta?station=30173"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "missing_credentials");
}

#[tokio::test]
async fn test_incident_lifecycle() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();
    let reporter = Uuid::new_v4();

    let resp = client
        .post(format!("{base}/v1/incidents"))
        .json(&incident_body(reporter))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["status"], "active");
    let id = created["id"].as_str().unwrap().to_string();

    let page: Value = client
        .get(format!("{base}/v1/incidents?city=chicago"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"].as_str().unwrap(), id);

    // Someone else cannot resolve the report.
    let resp = client
        .post(format!("{base}/v1/incidents/{id}/resolve"))
        .json(&json!({ "reporter_id": Uuid::new_v4() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "forbidden");

    let resp = client
        .post(format!("{base}/v1/incidents/{id}/resolve"))
        .json(&json!({ "reporter_id": reporter }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resolved: Value = resp.json().await.unwrap();
    assert_eq!(resolved["status"], "resolved");
}

#[tokio::test]
async fn test_incident_validation_rejects_empty_description() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();

    let mut body = incident_body(Uuid::new_v4());
    body["description"] = json!("   ");
    let resp = client
        .post(format!("{base}/v1/incidents"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_incident_pagination_invariants() {
    let (base, backend) = spawn_service().await;
    let client = reqwest::Client::new();
    let reporter = Uuid::new_v4();

    for _ in 0..25 {
        let body: railguard::store::models::NewIncident =
            serde_json::from_value(incident_body(reporter)).unwrap();
        backend.create_incident(body).await.unwrap();
    }

    let first: Value = client
        .get(format!("{base}/v1/incidents?city=chicago&page=0&limit=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["items"].as_array().unwrap().len(), 10);
    assert_eq!(first["total"], 25);
    assert_eq!(first["hasNextPage"], true);

    let last: Value = client
        .get(format!("{base}/v1/incidents?city=chicago&page=2&limit=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(last["items"].as_array().unwrap().len(), 5);
    assert_eq!(last["hasNextPage"], false);

    // Past the end: an empty page, never an error.
    let past: Value = client
        .get(format!("{base}/v1/incidents?city=chicago&page=9&limit=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(past["items"].as_array().unwrap().len(), 0);
    assert_eq!(past["hasNextPage"], false);
}

#[tokio::test]
async fn test_full_ride_rejects_fifth_member_visibly() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/v1/rides"))
        .json(&ride_body(Uuid::new_v4(), 4))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let ride: Value = resp.json().await.unwrap();
    let ride_id = ride["id"].as_str().unwrap().to_string();

    // The creator holds the first spot; three more joins fill the ride.
    for _ in 0..3 {
        let resp = client
            .post(format!("{base}/v1/rides/{ride_id}/join"))
            .json(&json!({ "user_id": Uuid::new_v4() }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }

    let resp = client
        .post(format!("{base}/v1/rides/{ride_id}/join"))
        .json(&json!({ "user_id": Uuid::new_v4() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "ride_full");

    let members: Value = client
        .get(format!("{base}/v1/rides/{ride_id}/members"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(members.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_double_join_conflicts_and_leave_frees_a_spot() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();
    let creator = Uuid::new_v4();

    let ride: Value = client
        .post(format!("{base}/v1/rides"))
        .json(&ride_body(creator, 2))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ride_id = ride["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{base}/v1/rides/{ride_id}/join"))
        .json(&json!({ "user_id": creator }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "already_joined");

    let rider = Uuid::new_v4();
    let resp = client
        .post(format!("{base}/v1/rides/{ride_id}/join"))
        .json(&json!({ "user_id": rider }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{base}/v1/rides/{ride_id}/leave"))
        .json(&json!({ "user_id": rider }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .post(format!("{base}/v1/rides/{ride_id}/join"))
        .json(&json!({ "user_id": Uuid::new_v4() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn test_ride_messages_require_membership() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();
    let creator = Uuid::new_v4();

    let ride: Value = client
        .post(format!("{base}/v1/rides"))
        .json(&ride_body(creator, 4))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ride_id = ride["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{base}/v1/rides/{ride_id}/messages"))
        .json(&json!({ "sender_id": Uuid::new_v4(), "body": "on my way" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .post(format!("{base}/v1/rides/{ride_id}/messages"))
        .json(&json!({ "sender_id": creator, "body": "meeting at the turnstiles" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let page: Value = client
        .get(format!("{base}/v1/rides/{ride_id}/messages"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["body"], "meeting at the turnstiles");
}

#[tokio::test]
async fn test_profile_round_trip() {
    let (base, _backend) = spawn_service().await;
    let client = reqwest::Client::new();
    let user_id = Uuid::new_v4();

    let resp = client
        .get(format!("{base}/v1/profiles/{user_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .put(format!("{base}/v1/profiles/{user_id}"))
        .json(&json!({
            "user_id": Uuid::new_v4(),
            "display_name": "Riley",
            "university": "UChicago",
            "verified": false,
            "updated_at": "2026-08-05T12:00:00Z"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let stored: Value = resp.json().await.unwrap();
    // The path id wins over the body's.
    assert_eq!(stored["user_id"].as_str().unwrap(), user_id.to_string());

    let fetched: Value = client
        .get(format!("{base}/v1/profiles/{user_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["display_name"], "Riley");
    assert_eq!(fetched["university"], "UChicago");
}

#[tokio::test]
async fn test_sos_activation_lands_in_the_service_feed() {
    let (base, backend) = spawn_service().await;
    let client = reqwest::Client::new();
    let reporter = Uuid::new_v4();

    let fix = GeoFix {
        latitude: 41.8986,
        longitude: -87.6213,
        accuracy: Some(8.0),
    };
    let mut button = SosButton::new(
        backend.clone() as Arc<dyn Backend>,
        Arc::new(StaticLocation(fix)),
        None,
    );
    let ctx = SosContext {
        reporter_id: reporter,
        city: "chicago".to_string(),
        transit_line: "Red".to_string(),
        location_name: "Grand".to_string(),
    };

    button.press();
    let report = button.hold_through(&ctx).await.unwrap();
    assert_eq!(report.incident_type, "emergency");

    let page: Value = client
        .get(format!("{base}/v1/incidents?city=chicago"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["incident_type"], "emergency");
    assert_eq!(page["items"][0]["latitude"], 41.8986);
}
