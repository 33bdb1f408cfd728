//! In-process mock of the f13 backend used by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use f13_client::{
    ApiClient, ClientConfig, LoginNavigator, MemoryPersistence, SessionPersistence, SessionStore,
    UserSummary, VerificationType,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Barrier;

pub const CORRECT_ANSWER: &str = "4";

/// What the refresh endpoint answers.
#[derive(Debug, Clone)]
pub enum RefreshReply {
    Token(String),
    Status(u16),
    NoToken,
    Hang,
}

pub struct MockBackend {
    /// Access credential `/protected`, `/upload` and `/auth/me` accept.
    pub valid_token: Mutex<String>,
    pub refresh_reply: Mutex<RefreshReply>,
    pub refresh_delay: Mutex<Duration>,
    pub refresh_calls: AtomicUsize,
    pub refresh_auth: Mutex<Vec<String>>,
    /// Every Authorization header seen by `/protected`.
    pub protected_auth: Mutex<Vec<String>>,
    /// Answer 401 to every `/protected` call regardless of credential.
    pub always_unauthorized: Mutex<bool>,
    /// Hold rejected `/protected` calls until this many have arrived.
    pub unauthorized_barrier: Mutex<Option<Arc<Barrier>>>,
    /// Swap the client's credential while rejecting a request.
    pub rotate_on_reject: Mutex<Option<(Arc<SessionStore>, String)>>,
    pub question_calls: AtomicUsize,
    pub verified_ids: Mutex<Vec<String>>,
    /// Bodies posted to `/auth/login` and `/auth/register`.
    pub login_bodies: Mutex<Vec<Value>>,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            valid_token: Mutex::new("A2".to_string()),
            refresh_reply: Mutex::new(RefreshReply::Token("A2".to_string())),
            refresh_delay: Mutex::new(Duration::from_millis(50)),
            refresh_calls: AtomicUsize::new(0),
            refresh_auth: Mutex::new(Vec::new()),
            protected_auth: Mutex::new(Vec::new()),
            always_unauthorized: Mutex::new(false),
            unauthorized_barrier: Mutex::new(None),
            rotate_on_reject: Mutex::new(None),
            question_calls: AtomicUsize::new(0),
            verified_ids: Mutex::new(Vec::new()),
            login_bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn question_calls(&self) -> usize {
        self.question_calls.load(Ordering::SeqCst)
    }

    fn is_valid(&self, headers: &HeaderMap) -> bool {
        bearer(headers) == format!("Bearer {}", self.valid_token.lock())
    }
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn test_user() -> UserSummary {
    UserSummary {
        id: "u-1".to_string(),
        username: "miku".to_string(),
        email: None,
        avatar_url: None,
        bio: Some("hello".to_string()),
        status: "online".to_string(),
        verification_type: VerificationType::Blue,
        verification_badge: None,
        language: "uk".to_string(),
    }
}

fn unauthorized(message: &str) -> axum::response::Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

async fn protected(State(mock): State<Arc<MockBackend>>, headers: HeaderMap) -> impl IntoResponse {
    mock.protected_auth.lock().push(bearer(&headers));

    if *mock.always_unauthorized.lock() || !mock.is_valid(&headers) {
        let barrier = mock.unauthorized_barrier.lock().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        let rotation = mock.rotate_on_reject.lock().take();
        if let Some((store, token)) = rotation {
            store.set_access_token(token);
        }
        return unauthorized("Token has expired");
    }

    Json(json!({ "ok": true })).into_response()
}

async fn refresh(State(mock): State<Arc<MockBackend>>, headers: HeaderMap) -> impl IntoResponse {
    mock.refresh_calls.fetch_add(1, Ordering::SeqCst);
    mock.refresh_auth.lock().push(bearer(&headers));

    let delay = *mock.refresh_delay.lock();
    tokio::time::sleep(delay).await;

    let reply = mock.refresh_reply.lock().clone();
    match reply {
        RefreshReply::Token(token) => Json(json!({ "access_token": token })).into_response(),
        RefreshReply::Status(code) => (
            StatusCode::from_u16(code).unwrap(),
            Json(json!({ "error": "Invalid token" })),
        )
            .into_response(),
        RefreshReply::NoToken => Json(json!({ "ok": true })).into_response(),
        RefreshReply::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
    }
}

async fn echo(headers: HeaderMap) -> impl IntoResponse {
    Json(json!({ "authorization": bearer(&headers) }))
}

async fn broken() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "boom" })),
    )
}

async fn upload(State(mock): State<Arc<MockBackend>>, headers: HeaderMap) -> impl IntoResponse {
    if !mock.is_valid(&headers) {
        return unauthorized("Token has expired");
    }
    let content_types: Vec<String> = headers
        .get_all(header::CONTENT_TYPE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();
    Json(json!({ "content_types": content_types })).into_response()
}

async fn login(State(mock): State<Arc<MockBackend>>, Json(body): Json<Value>) -> impl IntoResponse {
    mock.login_bodies.lock().push(body.clone());

    if body["username"] == "miku" && body["password"] == "secret" {
        return Json(json!({
            "user": test_user(),
            "access_token": "A1",
            "refresh_token": "R1",
        }))
        .into_response();
    }
    unauthorized("Invalid credentials")
}

async fn register(State(mock): State<Arc<MockBackend>>, Json(body): Json<Value>) -> impl IntoResponse {
    mock.login_bodies.lock().push(body.clone());

    if body["username"] == "miku" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Username already taken" })),
        )
            .into_response();
    }
    let mut user = serde_json::to_value(test_user()).unwrap();
    user["username"] = body["username"].clone();
    user["email"] = body["email"].clone();
    (
        StatusCode::CREATED,
        Json(json!({
            "user": user,
            "access_token": "A2",
            "refresh_token": "R2",
        })),
    )
        .into_response()
}

async fn me(State(mock): State<Arc<MockBackend>>, headers: HeaderMap) -> impl IntoResponse {
    if !mock.is_valid(&headers) {
        return unauthorized("Token has expired");
    }
    let mut user = serde_json::to_value(test_user()).unwrap();
    user["bio"] = json!("updated from server");
    user["created_at"] = json!("2026-01-01T00:00:00");
    Json(user).into_response()
}

async fn question(State(mock): State<Arc<MockBackend>>) -> impl IntoResponse {
    let n = mock.question_calls.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({
        "id": format!("q-{n}"),
        "question": "2 + 2 = ?",
        "type": "math",
    }))
}

async fn verify(State(mock): State<Arc<MockBackend>>, Json(body): Json<Value>) -> impl IntoResponse {
    let id = body["question_id"].as_str().unwrap_or_default().to_string();
    let answer = body["answer"].as_str().unwrap_or_default().trim().to_lowercase();

    let already_seen = mock.verified_ids.lock().contains(&id);
    mock.verified_ids.lock().push(id);

    if already_seen {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid or expired question" })),
        )
            .into_response();
    }
    if answer == CORRECT_ANSWER {
        return Json(json!({ "success": true })).into_response();
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": "Incorrect answer" })),
    )
        .into_response()
}

async fn captcha_config() -> impl IntoResponse {
    Json(json!({ "enabled": true, "type": "simple" }))
}

/// Start the mock and return its `/api` base URL.
pub async fn spawn_backend() -> (String, Arc<MockBackend>) {
    let mock = Arc::new(MockBackend::new());
    let app = Router::new()
        .route("/api/protected", get(protected))
        .route("/api/echo", get(echo))
        .route("/api/broken", get(broken))
        .route("/api/upload", post(upload))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/me", get(me))
        .route("/api/captcha/question", get(question))
        .route("/api/captcha/verify", post(verify))
        .route("/api/captcha/config", get(captcha_config))
        .with_state(Arc::clone(&mock));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/api"), mock)
}

/// Records every login redirect.
#[derive(Default)]
pub struct RecordingNavigator {
    pub routes: Mutex<Vec<String>>,
}

impl LoginNavigator for RecordingNavigator {
    fn redirect_to_login(&self, route: &str) {
        self.routes.lock().push(route.to_string());
    }
}

pub struct Harness {
    pub client: Arc<ApiClient>,
    pub session: Arc<SessionStore>,
    pub navigator: Arc<RecordingNavigator>,
    pub mock: Arc<MockBackend>,
    pub persistence: Arc<MemoryPersistence>,
}

pub async fn harness() -> Harness {
    harness_with(|builder| builder).await
}

pub async fn harness_with<F>(configure: F) -> Harness
where
    F: FnOnce(f13_client::ClientConfigBuilder) -> f13_client::ClientConfigBuilder,
{
    harness_from(Arc::new(MemoryPersistence::new()), configure).await
}

pub async fn harness_from<F>(persistence: Arc<MemoryPersistence>, configure: F) -> Harness
where
    F: FnOnce(f13_client::ClientConfigBuilder) -> f13_client::ClientConfigBuilder,
{
    let (base_url, mock) = spawn_backend().await;
    let config = configure(ClientConfig::builder().base_url(base_url)).build();
    let session = Arc::new(SessionStore::open(
        config.storage_key.clone(),
        Arc::clone(&persistence) as Arc<dyn SessionPersistence>,
    ));
    let navigator = Arc::new(RecordingNavigator::default());
    let client = ApiClient::new(config, Arc::clone(&session))
        .unwrap()
        .with_navigator(Arc::clone(&navigator) as Arc<dyn LoginNavigator>);

    Harness {
        client: Arc::new(client),
        session,
        navigator,
        mock,
        persistence,
    }
}
