use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tower::ServiceExt;
use voicegate_server::{
    app,
    config::{AuthConfig, CorsPolicy, UploadsConfig},
    session::PageGate,
    AppState,
};
use voicegate_voice::{
    CredentialIssuer, LiveKitConfig, OsRoomNamer, RoomName, RoomNamer, VoiceError,
    DEFAULT_IDENTITY,
};

const TEST_KEY: &str = "devkey";
const TEST_SECRET: &str = "devsecret";

#[derive(Deserialize)]
struct Claims {
    sub: String,
    video: VideoClaims,
}

#[derive(Deserialize)]
struct VideoClaims {
    #[serde(rename = "roomJoin")]
    room_join: bool,
    room: String,
}

struct BrokenRandomness;

impl RoomNamer for BrokenRandomness {
    fn new_room_name(&self) -> Result<RoomName, VoiceError> {
        Err(VoiceError::RandomnessUnavailable(rand::Error::new(
            "entropy source unavailable",
        )))
    }
}

fn test_state(room_namer: Arc<dyn RoomNamer>) -> AppState {
    let livekit = LiveKitConfig::new("ws://localhost:7880", TEST_KEY, TEST_SECRET);
    AppState {
        issuer: Arc::new(CredentialIssuer::new(&livekit).unwrap()),
        room_namer,
        cors: CorsPolicy::Any,
        pages: Arc::new(PageGate::new(&AuthConfig::default())),
        uploads: UploadsConfig::default(),
    }
}

fn setup_app() -> Router {
    app(test_state(Arc::new(OsRoomNamer)))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn verify(token: &str) -> Claims {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(TEST_SECRET.as_bytes());
    decode::<Claims>(token, &key, &validation)
        .expect("token should verify with the configured secret")
        .claims
}

#[tokio::test]
async fn get_token_returns_room_scoped_credential() {
    let (status, json) = get_json(setup_app(), "/getToken").await;
    assert_eq!(status, StatusCode::OK);

    let room = json["roomName"].as_str().unwrap();
    assert!(RoomName::parse(room).is_some(), "unexpected room name {room}");
    assert_eq!(json["grant"]["room"], room);
    assert_eq!(json["grant"]["roomJoin"], true);
    assert_eq!(json["identity"], DEFAULT_IDENTITY);

    let claims = verify(json["accessToken"].as_str().unwrap());
    assert_eq!(claims.video.room, room);
    assert!(claims.video.room_join);
    assert_eq!(claims.sub, DEFAULT_IDENTITY);
}

#[tokio::test]
async fn get_token_uses_supplied_name() {
    let (status, json) = get_json(setup_app(), "/getToken?name=Ada").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["identity"], "Ada");
    assert_eq!(json["name"], "Ada");

    let claims = verify(json["accessToken"].as_str().unwrap());
    assert_eq!(claims.sub, "Ada");
}

#[tokio::test]
async fn get_token_rejects_overlong_name() {
    let uri = format!("/getToken?name={}", "a".repeat(129));
    let (status, json) = get_json(setup_app(), &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("128"));
}

#[tokio::test]
async fn randomness_failure_maps_to_server_error() {
    let app = app(test_state(Arc::new(BrokenRandomness)));

    let (status, json) = get_json(app.clone(), "/getToken").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "failed to issue access credential");

    // A failed request leaves the service able to answer the next one.
    let (status, _) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn concurrent_requests_get_independent_credentials() {
    let app = setup_app();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { get_json(app, "/getToken").await })
        })
        .collect();

    let mut rooms = HashSet::new();
    for result in futures_util::future::join_all(handles).await {
        let (status, json) = result.unwrap();
        assert_eq!(status, StatusCode::OK);

        let room = json["roomName"].as_str().unwrap().to_string();
        let claims = verify(json["accessToken"].as_str().unwrap());
        assert_eq!(claims.video.room, room);
        assert!(claims.video.room_join);
        rooms.insert(room);
    }

    assert_eq!(rooms.len(), 50, "every request must get its own room");
}

#[tokio::test]
async fn health_check_returns_ok() {
    let (status, json) = get_json(setup_app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "voicegate-token");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn index_reports_running() {
    let response = setup_app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"voicegate token service is running");
}
