// Integration tests for the chat assistant API.
//
// HTTP-level tests using tower::ServiceExt::oneshot to exercise the full
// Axum router without starting a real TCP server. The database and the
// completion provider are replaced with in-memory stubs implementing the
// core ports, so every test runs hermetically.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, NaiveDate, Utc};
use http_body_util::BodyExt;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use api_lib::config::Config;
use api_lib::web::state::{AppState, RollingHistory};
use api_lib::web::{api_router, token};
use chat_core::domain::{ChatRole, ChatSessionLog, ChatTurn, SessionSummary, User, UserCredentials};
use chat_core::ports::{
    CompletionService, DatabaseService, FragmentStream, PortError, PortResult,
};
use chat_core::transcript::GATEWAY_APOLOGY;

// ─── Stub Database ───────────────────────────────────────────────────────────

struct StoredUser {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    dob: NaiveDate,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct StubDb {
    users: Mutex<Vec<StoredUser>>,
    logs: Mutex<Vec<ChatSessionLog>>,
}

impl StubDb {
    async fn user_count(&self) -> usize {
        self.users.lock().await.len()
    }

    async fn log_count(&self) -> usize {
        self.logs.lock().await.len()
    }
}

#[async_trait]
impl DatabaseService for StubDb {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        dob: NaiveDate,
    ) -> PortResult<User> {
        let mut users = self.users.lock().await;
        if users
            .iter()
            .any(|u| u.email == email || u.username == username)
        {
            return Err(PortError::Conflict("user already exists".to_string()));
        }
        let stored = StoredUser {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            dob,
            created_at: Utc::now(),
        };
        let user = User {
            id: stored.id,
            username: stored.username.clone(),
            email: stored.email.clone(),
            dob: stored.dob,
            created_at: stored.created_at,
        };
        users.push(stored);
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.users
            .lock()
            .await
            .iter()
            .find(|u| u.email == email)
            .map(|u| UserCredentials {
                id: u.id,
                username: u.username.clone(),
                email: u.email.clone(),
                password_hash: u.password_hash.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        self.users
            .lock()
            .await
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| User {
                id: u.id,
                username: u.username.clone(),
                email: u.email.clone(),
                dob: u.dob,
                created_at: u.created_at,
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn save_chat_log(&self, log: ChatSessionLog) -> PortResult<()> {
        self.logs.lock().await.push(log);
        Ok(())
    }

    async fn list_chat_logs(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<SessionSummary>> {
        let logs = self.logs.lock().await;
        let mut summaries: Vec<SessionSummary> = logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| SessionSummary {
                chat_session_id: l.chat_session_id.clone(),
                created_at: l.created_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.truncate(limit as usize);
        Ok(summaries)
    }

    async fn get_chat_log(
        &self,
        user_id: Uuid,
        chat_session_id: &str,
    ) -> PortResult<Vec<ChatTurn>> {
        self.logs
            .lock()
            .await
            .iter()
            .find(|l| l.user_id == user_id && l.chat_session_id == chat_session_id)
            .map(|l| l.history.clone())
            .ok_or_else(|| {
                PortError::NotFound(format!("Chat session {} not found", chat_session_id))
            })
    }
}

// ─── Stub Completion Provider ────────────────────────────────────────────────

/// Replays a scripted fragment sequence and records every call it receives.
struct StubCompletion {
    script: Vec<Result<String, String>>,
    calls: Mutex<Vec<(String, Vec<ChatTurn>)>>,
}

impl StubCompletion {
    fn new(fragments: &[&str]) -> Self {
        Self {
            script: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_after(fragments: &[&str]) -> Self {
        let mut script: Vec<Result<String, String>> =
            fragments.iter().map(|f| Ok(f.to_string())).collect();
        script.push(Err("provider exploded".to_string()));
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    async fn calls(&self) -> Vec<(String, Vec<ChatTurn>)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CompletionService for StubCompletion {
    async fn generate(&self, message: &str, history: &[ChatTurn]) -> PortResult<FragmentStream> {
        self.calls
            .lock()
            .await
            .push((message.to_string(), history.to_vec()));
        let items: Vec<Result<String, PortError>> = self
            .script
            .iter()
            .cloned()
            .map(|item| item.map_err(PortError::Gateway))
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

// ─── Test Harness ────────────────────────────────────────────────────────────

const TEST_SECRET: &str = "test-secret";

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: String::new(),
        log_level: tracing::Level::INFO,
        openai_api_key: None,
        chat_model: "test-model".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
    }
}

fn test_app(db: Arc<StubDb>, completion: Arc<StubCompletion>) -> Router {
    let state = Arc::new(AppState {
        db,
        completion,
        config: Arc::new(test_config()),
        memory: RollingHistory::new(),
    });
    api_router(state)
}

async fn send_json(app: &Router, method: &str, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    Response::from(app.clone().oneshot(request).await.unwrap()).await
}

async fn send_json_with_cookie(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: &str,
    body: serde_json::Value,
) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, cookie)
        .body(Body::from(body.to_string()))
        .unwrap();
    Response::from(app.clone().oneshot(request).await.unwrap()).await
}

async fn send_get(app: &Router, uri: &str, cookie: &str) -> Response {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    Response::from(app.clone().oneshot(request).await.unwrap()).await
}

/// A fully collected response: status, headers, and body bytes.
struct Response {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Vec<u8>,
}

impl Response {
    async fn from(response: axum::http::Response<Body>) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read response body")
            .to_bytes()
            .to_vec();
        Self {
            status,
            headers,
            body,
        }
    }

    fn text(&self) -> String {
        String::from_utf8(self.body.clone()).expect("response body is not UTF-8")
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    /// The session cookie set by this response, as a `Cookie` header value.
    fn session_cookie(&self) -> String {
        let set_cookie = self
            .headers
            .get(header::SET_COOKIE)
            .expect("response set no cookie")
            .to_str()
            .unwrap();
        set_cookie
            .split(';')
            .next()
            .expect("malformed Set-Cookie value")
            .to_string()
    }
}

async fn register(app: &Router, username: &str, email: &str, password: &str) -> Response {
    send_json(
        app,
        "POST",
        "/api/auth/register",
        serde_json::json!({
            "username": username,
            "email": email,
            "password": password,
            "dob": "2000-01-01",
        }),
    )
    .await
}

const BOUNDARY: &str = "test-boundary";

fn multipart_body(question: &str, file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"question\"\r\n\r\n{question}\r\n"
        )
        .as_bytes(),
    );
    if let Some((content_type, file_name, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn send_chat(
    app: &Router,
    cookie: &str,
    question: &str,
    file: Option<(&str, &str, &[u8])>,
) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::COOKIE, cookie)
        .body(Body::from(multipart_body(question, file)))
        .unwrap();
    Response::from(app.clone().oneshot(request).await.unwrap()).await
}

// ─── Auth Tests ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_then_login_succeeds_and_wrong_password_fails() {
    let db = Arc::new(StubDb::default());
    let app = test_app(db.clone(), Arc::new(StubCompletion::new(&[])));

    let registered = register(&app, "alice", "a@x.com", "secret1").await;
    assert_eq!(registered.status, StatusCode::OK);
    assert!(registered.session_cookie().starts_with("token="));

    let login = send_json(
        &app,
        "POST",
        "/api/auth/login",
        serde_json::json!({ "email": "a@x.com", "password": "secret1" }),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.json()["msg"], "Login successful");

    let bad_login = send_json(
        &app,
        "POST",
        "/api/auth/login",
        serde_json::json!({ "email": "a@x.com", "password": "wrong1" }),
    )
    .await;
    assert_eq!(bad_login.status, StatusCode::UNAUTHORIZED);
    assert_eq!(bad_login.json()["msg"], "Invalid credentials");
}

#[tokio::test]
async fn duplicate_email_never_creates_a_second_record() {
    let db = Arc::new(StubDb::default());
    let app = test_app(db.clone(), Arc::new(StubCompletion::new(&[])));

    assert_eq!(register(&app, "alice", "a@x.com", "secret1").await.status, StatusCode::OK);

    let duplicate = register(&app, "alice2", "a@x.com", "secret2").await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
    assert_eq!(duplicate.json()["msg"], "User already exists");
    assert_eq!(db.user_count().await, 1);
}

#[tokio::test]
async fn register_reports_every_invalid_field() {
    let app = test_app(
        Arc::new(StubDb::default()),
        Arc::new(StubCompletion::new(&[])),
    );

    let response = send_json(
        &app,
        "POST",
        "/api/auth/register",
        serde_json::json!({ "email": "not-an-email", "password": "short" }),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let errors = response.json()["errors"].as_array().unwrap().clone();
    // username, email, password, and dob are all unacceptable
    assert_eq!(errors.len(), 4);
}

#[tokio::test]
async fn check_login_resolves_the_profile_until_expiry() {
    let db = Arc::new(StubDb::default());
    let app = test_app(db.clone(), Arc::new(StubCompletion::new(&[])));

    let cookie = register(&app, "alice", "a@x.com", "secret1")
        .await
        .session_cookie();

    let checked = send_get(&app, "/api/auth/check-login", &cookie).await;
    assert_eq!(checked.status, StatusCode::OK);
    assert_eq!(checked.json()["user"]["username"], "alice");
    assert_eq!(checked.json()["user"]["email"], "a@x.com");

    // A token past its 3-hour lifetime is rejected.
    let user_id = db.get_user_by_email("a@x.com").await.unwrap().id;
    let expired_claims = token::Claims {
        sub: user_id,
        iat: (Utc::now() - chrono::Duration::hours(4)).timestamp(),
        exp: (Utc::now() - chrono::Duration::hours(1)).timestamp(),
    };
    let expired = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &expired_claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap();

    let rejected = send_get(&app, "/api/auth/check-login", &format!("token={expired}")).await;
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn check_login_without_a_cookie_is_unauthorized() {
    let app = test_app(
        Arc::new(StubDb::default()),
        Arc::new(StubCompletion::new(&[])),
    );

    let request = Request::builder()
        .method("GET")
        .uri("/api/auth/check-login")
        .body(Body::empty())
        .unwrap();
    let response = Response::from(app.oneshot(request).await.unwrap()).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["msg"], "No token, authorization denied");
}

#[tokio::test]
async fn logout_clears_the_cookie() {
    let app = test_app(
        Arc::new(StubDb::default()),
        Arc::new(StubCompletion::new(&[])),
    );

    let response = send_json(&app, "POST", "/api/auth/logout", serde_json::json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    let set_cookie = response
        .headers
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("token=;"));
    assert!(set_cookie.contains("Max-Age=0"));
}

// ─── Chat Streaming Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn chat_streams_the_answer_and_appends_both_turns_to_history() {
    let db = Arc::new(StubDb::default());
    let completion = Arc::new(StubCompletion::new(&["4"]));
    let app = test_app(db, completion.clone());

    let cookie = register(&app, "alice", "a@x.com", "secret1")
        .await
        .session_cookie();

    let response = send_chat(&app, &cookie, "2+2?", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response
        .headers
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(response.text(), "4");

    // With no file attached the provider message is the question verbatim,
    // and the first call sees an empty rolling history.
    let calls = completion.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "2+2?");
    assert!(calls[0].1.is_empty());

    // The follow-up call replays both sides of the first exchange.
    let follow_up = send_chat(&app, &cookie, "double it", None).await;
    assert_eq!(follow_up.status, StatusCode::OK);

    let calls = completion.calls().await;
    assert_eq!(calls.len(), 2);
    let replayed: Vec<(ChatRole, String)> = calls[1]
        .1
        .iter()
        .map(|turn| (turn.role, turn.text()))
        .collect();
    assert_eq!(
        replayed,
        vec![
            (ChatRole::User, "2+2?".to_string()),
            (ChatRole::Assistant, "4".to_string()),
        ]
    );
}

#[tokio::test]
async fn chat_reassembles_multi_fragment_answers() {
    let db = Arc::new(StubDb::default());
    let completion = Arc::new(StubCompletion::new(&["The answer ", "is ", "4."]));
    let app = test_app(db, completion.clone());

    let cookie = register(&app, "alice", "a@x.com", "secret1")
        .await
        .session_cookie();

    let response = send_chat(&app, &cookie, "2+2?", None).await;
    assert_eq!(response.text(), "The answer is 4.");

    // The reconstructed answer joins the rolling history as one turn.
    send_chat(&app, &cookie, "again?", None).await;
    let calls = completion.calls().await;
    assert_eq!(calls[1].1[1].text(), "The answer is 4.");
}

#[tokio::test]
async fn chat_prefixes_attached_file_text_to_the_question() {
    let completion = Arc::new(StubCompletion::new(&["ok"]));
    let app = test_app(Arc::new(StubDb::default()), completion.clone());

    let cookie = register(&app, "alice", "a@x.com", "secret1")
        .await
        .session_cookie();

    let response = send_chat(
        &app,
        &cookie,
        "summarize",
        Some(("text/plain", "notes.txt", b"T")),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let calls = completion.calls().await;
    assert_eq!(calls[0].0, "T\nsummarize");
}

#[tokio::test]
async fn chat_rejects_unsupported_file_types_before_any_provider_call() {
    let completion = Arc::new(StubCompletion::new(&["never sent"]));
    let app = test_app(Arc::new(StubDb::default()), completion.clone());

    let cookie = register(&app, "alice", "a@x.com", "secret1")
        .await
        .session_cookie();

    let response = send_chat(
        &app,
        &cookie,
        "what is this?",
        Some(("image/png", "cat.png", b"\x89PNG")),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "File type not supported.");
    assert!(completion.calls().await.is_empty());
}

#[tokio::test]
async fn chat_without_a_question_is_rejected() {
    let completion = Arc::new(StubCompletion::new(&["never sent"]));
    let app = test_app(Arc::new(StubDb::default()), completion.clone());

    let cookie = register(&app, "alice", "a@x.com", "secret1")
        .await
        .session_cookie();

    let response = send_chat(&app, &cookie, "   ", None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(completion.calls().await.is_empty());
}

#[tokio::test]
async fn chat_without_a_cookie_is_unauthorized() {
    let app = test_app(
        Arc::new(StubDb::default()),
        Arc::new(StubCompletion::new(&["never sent"])),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body("2+2?", None)))
        .unwrap();
    let response = Response::from(app.oneshot(request).await.unwrap()).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn provider_failure_mid_stream_degrades_to_the_apology() {
    let db = Arc::new(StubDb::default());
    let completion = Arc::new(StubCompletion::failing_after(&["part"]));
    let app = test_app(db, completion.clone());

    let cookie = register(&app, "alice", "a@x.com", "secret1")
        .await
        .session_cookie();

    let response = send_chat(&app, &cookie, "2+2?", None).await;
    // The stream had already started, so the failure arrives in-band.
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), format!("part{GATEWAY_APOLOGY}"));

    // The degraded answer is what the rolling history remembers.
    send_chat(&app, &cookie, "again?", None).await;
    let calls = completion.calls().await;
    assert_eq!(calls[1].1[1].text(), format!("part{GATEWAY_APOLOGY}"));
}

// ─── History Persistence Tests ───────────────────────────────────────────────

fn two_turn_history() -> serde_json::Value {
    serde_json::json!({
        "history": [
            { "role": "user", "parts": [{ "text": "2+2?" }] },
            { "role": "assistant", "parts": [{ "text": "4" }] },
        ]
    })
}

#[tokio::test]
async fn empty_history_is_rejected_and_writes_nothing() {
    let db = Arc::new(StubDb::default());
    let app = test_app(db.clone(), Arc::new(StubCompletion::new(&[])));

    let cookie = register(&app, "alice", "a@x.com", "secret1")
        .await
        .session_cookie();

    let response = send_json_with_cookie(
        &app,
        "POST",
        "/api/chat/save-history",
        &cookie,
        serde_json::json!({ "history": [] }),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "Chat history is invalid or empty.");
    assert_eq!(db.log_count().await, 0);
}

#[tokio::test]
async fn saved_history_round_trips_through_listing_and_retrieval() {
    let db = Arc::new(StubDb::default());
    let app = test_app(db.clone(), Arc::new(StubCompletion::new(&[])));

    let cookie = register(&app, "alice", "a@x.com", "secret1")
        .await
        .session_cookie();

    let saved = send_json_with_cookie(
        &app,
        "POST",
        "/api/chat/save-history",
        &cookie,
        two_turn_history(),
    )
    .await;
    assert_eq!(saved.status, StatusCode::OK);
    assert_eq!(saved.json()["msg"], "Chat history saved successfully");

    let listing = send_get(&app, "/api/chat/history", &cookie).await;
    assert_eq!(listing.status, StatusCode::OK);
    let sessions = listing.json()["chatHistory"].as_array().unwrap().clone();
    assert_eq!(sessions.len(), 1);
    let session_id = sessions[0]["chatSessionId"].as_str().unwrap().to_string();

    let fetched = send_get(&app, &format!("/api/chat/history/{session_id}"), &cookie).await;
    assert_eq!(fetched.status, StatusCode::OK);
    let history = fetched.json()["history"].as_array().unwrap().clone();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[0]["parts"][0]["text"], "2+2?");
    assert_eq!(history[1]["role"], "assistant");
    assert_eq!(history[1]["parts"][0]["text"], "4");
}

#[tokio::test]
async fn sessions_are_invisible_to_other_users() {
    let db = Arc::new(StubDb::default());
    let app = test_app(db.clone(), Arc::new(StubCompletion::new(&[])));

    let alice = register(&app, "alice", "a@x.com", "secret1")
        .await
        .session_cookie();
    let bob = register(&app, "bob", "b@x.com", "secret2")
        .await
        .session_cookie();

    let saved = send_json_with_cookie(
        &app,
        "POST",
        "/api/chat/save-history",
        &alice,
        two_turn_history(),
    )
    .await;
    assert_eq!(saved.status, StatusCode::OK);

    // Bob's listing contains none of Alice's sessions.
    let listing = send_get(&app, "/api/chat/history", &bob).await;
    assert!(listing.json()["chatHistory"].as_array().unwrap().is_empty());

    // Fetching Alice's session id as Bob reads as an unknown session.
    let alice_listing = send_get(&app, "/api/chat/history", &alice).await;
    let session_id = alice_listing.json()["chatHistory"][0]["chatSessionId"]
        .as_str()
        .unwrap()
        .to_string();
    let forbidden = send_get(&app, &format!("/api/chat/history/{session_id}"), &bob).await;
    assert_eq!(forbidden.status, StatusCode::NOT_FOUND);
    assert_eq!(forbidden.json()["error"], "Chat session not found");
}
