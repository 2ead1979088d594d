use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{self, Request, StatusCode};
use tower::ServiceExt;

use rfctl_assignment::AssignmentCoordinator;
use rfctl_auth::AuthGateway;
use rfctl_crypto::{CredentialVault, MasterKey};
use rfctl_enrollment::EnrollmentService;
use rfctl_eventbus::EventBus;
use rfctl_model::{ChallengeConfig, FrequencySpec, PublicVisibility};
use rfctl_registry::AgentRegistry;
use rfctl_scheduler::Scheduler;
use rfctl_server::config::Config;
use rfctl_server::ratelimit::RateLimiters;
use rfctl_server::state::AppState;
use rfctl_server::ws::ConnectionRegistry;

async fn build_test_state() -> AppState {
    let store = Arc::new(rfctl_store::test_store().await);
    let key_path = tempfile::NamedTempFile::new().unwrap().path().to_owned();
    let vault = Arc::new(CredentialVault::new(MasterKey::load_or_generate(&key_path).unwrap()));
    let registry = AgentRegistry::new(Arc::clone(&store));
    let scheduler = Scheduler::new(Arc::clone(&store));
    let enrollment = EnrollmentService::new(Arc::clone(&store), registry.clone());
    let auth = AuthGateway::new(Arc::clone(&store), Arc::clone(&vault));
    let config = Config::default();
    let named_ranges = Arc::new(AppState::named_ranges_from_config(&config));

    AppState {
        store,
        vault,
        auth,
        registry,
        scheduler,
        assignment: AssignmentCoordinator::new(),
        enrollment,
        eventbus: Arc::new(EventBus::new()),
        connections: Arc::new(ConnectionRegistry::new()),
        rate_limiters: Arc::new(RateLimiters::new(config.auth.login, config.auth.admin_mutations, &config.agents)),
        named_ranges,
        config: Arc::new(config),
        config_path: Arc::new("rfctl.toml".into()),
    }
}

fn build_app(state: AppState) -> axum::Router {
    rfctl_server::api::router(state)
}

fn test_challenge_config() -> ChallengeConfig {
    ChallengeConfig {
        modulation: "nbfm".to_owned(),
        frequency: FrequencySpec::Fixed { frequency: 433_920_000 },
        min_delay: 30,
        max_delay: 60,
        flag: Some("flag{test}".to_owned()),
        flag_file_hash: None,
        public_view: PublicVisibility::default(),
        extra: serde_json::Map::new(),
    }
}

#[tokio::test]
async fn health_returns_200() {
    let app = build_app(build_test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn public_challenges_empty_list() {
    let app = build_app(build_test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/public/challenges").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn frequency_ranges_reflects_config() {
    let mut state = build_test_state().await;
    let mut config = (*state.config).clone();
    config
        .frequency_ranges
        .insert("ham-70cm".to_owned(), rfctl_server::config::RangeToml { min_hz: 430_000_000, max_hz: 440_000_000 });
    state.named_ranges = Arc::new(AppState::named_ranges_from_config(&config));
    state.config = Arc::new(config);

    let app = build_app(state);
    let response = app
        .oneshot(Request::builder().uri("/frequency-ranges").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let ranges = json.as_array().unwrap();
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0]["name"], "ham-70cm");
}

#[tokio::test]
async fn unauthenticated_admin_dashboard_is_rejected() {
    let app = build_app(build_test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/admin/dashboard").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agent_register_without_bearer_is_unauthorized() {
    let app = build_app(build_test_state().await);

    let register_body = serde_json::json!({"hostname": "rx-01", "ip": "10.0.0.5"});
    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/agents/register")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(register_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agent_task_without_bearer_is_unauthorized() {
    let app = build_app(build_test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/agents/listener-1/task")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rate_limit_allows_first_request_through() {
    let app = build_app(build_test_state().await);
    let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();

    let mut request = Request::builder()
        .method(http::Method::POST)
        .uri("/auth/login")
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({"username": "nobody", "password": "wrong"}).to_string()))
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));

    let response = app.oneshot(request).await.unwrap();

    // Unknown user: rejected for credentials, not for rate limiting.
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn challenge_create_without_csrf_tokens_is_rejected() {
    let app = build_app(build_test_state().await);
    let mut body = serde_json::to_value(test_challenge_config()).unwrap();
    body["challenge_id"] = serde_json::json!("chal-1");
    body["name"] = serde_json::json!("first");
    body["priority"] = serde_json::json!(1);

    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/challenges")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    // Admin mutations are CSRF-guarded ahead of session auth: a mutating
    // request with no double-submit tokens never reaches the session
    // check at all.
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn challenge_list_requires_session() {
    let app = build_app(build_test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/challenges").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
