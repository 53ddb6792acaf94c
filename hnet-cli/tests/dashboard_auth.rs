//! Dashboard authentication against an in-process GraphQL mock.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use hnet_cli::account::{self, AccountOp};
use hnet_cli::auth::{
    AuthError, AuthSession, CredentialPrompt, Credentials, FileTokenStore, GraphqlClient,
    TokenStore,
};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Default)]
struct MockState {
    valid: HashSet<String>,
    issued: u32,
    logins: u32,
}

type Shared = Arc<Mutex<MockState>>;

fn issue(state: &mut MockState) -> String {
    state.issued += 1;
    let token = format!("jwt-{}", state.issued);
    state.valid.insert(token.clone());
    token
}

fn error(message: &str) -> Json<Value> {
    Json(json!({"data": null, "errors": [{"message": message}]}))
}

async fn graphql(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let query = body["query"].as_str().unwrap_or_default();
    let mut state = state.lock().unwrap();

    if query.contains("tokenAuth") {
        if body["variables"]["password"] != "hunter2" {
            return error("Please enter valid credentials");
        }
        state.logins += 1;
        let token = issue(&mut state);
        return Json(json!({"data": {"tokenAuth": {"token": token}}}));
    }

    if query.contains("refreshToken") {
        let old = body["variables"]["token"].as_str().unwrap_or_default();
        if !state.valid.contains(old) {
            return error("Error decoding signature");
        }
        let token = issue(&mut state);
        return Json(json!({"data": {"refreshToken": {"token": token}}}));
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("JWT "))
        .unwrap_or_default();
    if !state.valid.contains(token) {
        return error("Signature has expired");
    }
    Json(json!({"data": {"groups": [{"id": "1", "name": "lab", "deviceCount": 2}]}}))
}

async fn spawn_dashboard() -> (String, Shared) {
    let state: Shared = Arc::default();
    let app = Router::new()
        .route("/graphql", post(graphql))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/graphql", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (url, state)
}

struct FixedPrompt(&'static str);

impl CredentialPrompt for FixedPrompt {
    fn credentials(&self) -> Result<Credentials, AuthError> {
        Ok(Credentials {
            username: "user@example.com".into(),
            password: self.0.into(),
        })
    }
}

#[tokio::test]
async fn first_call_logs_in_and_caches_refreshed_token() {
    let (url, state) = spawn_dashboard().await;
    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path().join("webtoken"));
    let session = AuthSession::new(store, GraphqlClient::new(url).unwrap(), FixedPrompt("hunter2"));

    let out = account::run(&session, &AccountOp::ListGroups).await.unwrap();
    assert!(out.contains("lab"));

    // jwt-1 from login, jwt-2 from the refresh after the call
    assert_eq!(session.store().load().unwrap().as_deref(), Some("jwt-2"));
    assert_eq!(state.lock().unwrap().logins, 1);
}

#[tokio::test]
async fn expired_cached_token_logs_in_once_and_retries() {
    let (url, state) = spawn_dashboard().await;
    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(dir.path().join("webtoken"));
    store.save("jwt-from-last-week").unwrap();
    let session = AuthSession::new(store, GraphqlClient::new(url).unwrap(), FixedPrompt("hunter2"));

    let out = account::run(&session, &AccountOp::ListGroups).await.unwrap();

    assert!(out.contains("lab"));
    assert_eq!(state.lock().unwrap().logins, 1);
}

#[tokio::test]
async fn wrong_password_fails_login() {
    let (url, _state) = spawn_dashboard().await;
    let dir = tempfile::tempdir().unwrap();
    let session = AuthSession::new(
        FileTokenStore::new(dir.path().join("webtoken")),
        GraphqlClient::new(url).unwrap(),
        FixedPrompt("wrong"),
    );

    let err = session.interactive_login().await.unwrap_err();

    assert!(matches!(err, AuthError::LoginFailed(ref m) if m.contains("valid credentials")));
    assert_eq!(session.store().load().unwrap(), None);
}

#[cfg(unix)]
#[tokio::test]
async fn cached_token_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let (url, _state) = spawn_dashboard().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("webtoken");
    let session = AuthSession::new(
        FileTokenStore::new(path.clone()),
        GraphqlClient::new(url).unwrap(),
        FixedPrompt("hunter2"),
    );

    session.interactive_login().await.unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
