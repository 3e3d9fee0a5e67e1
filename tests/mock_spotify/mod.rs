#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use http::{HeaderMap, StatusCode};
use serde_json::json;
use spotify_pkce_auth::url::Url;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const VALID_CODE: &str = "abc123";

pub struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// How the token endpoint answers `grant_type=refresh_token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshBehavior {
    /// Issue a new access token and a rotated refresh token.
    Rotate,
    /// Issue a new access token only.
    OmitRefreshToken,
    /// Reject with `invalid_grant`.
    InvalidGrant,
}

/// Stand-in for `accounts.spotify.com` and `api.spotify.com`.
#[derive(Debug)]
pub struct MockSpotify {
    exchanges: AtomicUsize,
    refreshes: AtomicUsize,
    api_requests: AtomicUsize,
    issued: AtomicUsize,
    token_requests: Mutex<Vec<HashMap<String, String>>>,
    valid_access_tokens: Mutex<HashSet<String>>,
    refresh_behavior: Mutex<RefreshBehavior>,
}

impl MockSpotify {
    fn new() -> Self {
        Self {
            exchanges: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            api_requests: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
            token_requests: Mutex::new(Vec::new()),
            valid_access_tokens: Mutex::new(HashSet::new()),
            refresh_behavior: Mutex::new(RefreshBehavior::Rotate),
        }
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn api_requests(&self) -> usize {
        self.api_requests.load(Ordering::SeqCst)
    }

    /// Form bodies of all token endpoint requests, oldest first.
    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.token_requests.lock().expect("not poisoned").clone()
    }

    pub fn set_refresh_behavior(&self, behavior: RefreshBehavior) {
        *self.refresh_behavior.lock().expect("not poisoned") = behavior;
    }

    fn issue_access_token(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access_token = format!("AT{n}");
        self.valid_access_tokens
            .lock()
            .expect("not poisoned")
            .insert(access_token.clone());
        access_token
    }

    fn is_valid(&self, headers: &HeaderMap) -> bool {
        let Some(access_token) = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
        else {
            return false;
        };
        self.valid_access_tokens
            .lock()
            .expect("not poisoned")
            .contains(access_token)
    }
}

pub struct RunningMock {
    pub url: Url,
    pub state: Arc<MockSpotify>,
    _server: AbortOnDrop<()>,
}

pub async fn start() -> RunningMock {
    let state = Arc::new(MockSpotify::new());

    let router = Router::new()
        .route("/api/token", post(token))
        .route("/v1/me", get(me))
        .route("/v1/me/player/volume", put(volume))
        .route("/v1/plain", get(plain))
        .route("/v1/missing", get(missing))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("TcpListener");
    let addr = listener.local_addr().expect("local addr");

    let server_jh = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("Server to start successfully");
    });

    RunningMock {
        url: Url::parse(&format!("http://{addr}/")).expect("valid url"),
        state,
        _server: AbortOnDrop(server_jh),
    }
}

fn oauth_error(error: &str, description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error, "error_description": description })),
    )
        .into_response()
}

async fn token(
    State(state): State<Arc<MockSpotify>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state
        .token_requests
        .lock()
        .expect("not poisoned")
        .push(form.clone());

    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            state.exchanges.fetch_add(1, Ordering::SeqCst);
            if form.get("code").map(String::as_str) != Some(VALID_CODE) {
                return oauth_error("invalid_grant", "Invalid authorization code");
            }
            Json(json!({
                "access_token": state.issue_access_token(),
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "RT1",
                "scope": "user-read-email",
            }))
            .into_response()
        }
        Some("refresh_token") => {
            let n = state.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            // Keep the refresh in flight long enough for concurrent callers to pile up.
            tokio::time::sleep(Duration::from_millis(50)).await;
            let behavior = *state.refresh_behavior.lock().expect("not poisoned");
            match behavior {
                RefreshBehavior::InvalidGrant => oauth_error("invalid_grant", "Refresh token revoked"),
                RefreshBehavior::OmitRefreshToken => Json(json!({
                    "access_token": state.issue_access_token(),
                    "token_type": "Bearer",
                    "expires_in": 3600,
                }))
                .into_response(),
                RefreshBehavior::Rotate => Json(json!({
                    "access_token": state.issue_access_token(),
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "refresh_token": format!("RT-rotated-{n}"),
                }))
                .into_response(),
            }
        }
        _ => oauth_error("unsupported_grant_type", "Unsupported grant type"),
    }
}

async fn me(State(state): State<Arc<MockSpotify>>, headers: HeaderMap) -> Response {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    if !state.is_valid(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "status": 401, "message": "Invalid access token" } })),
        )
            .into_response();
    }
    Json(json!({ "id": "u1", "display_name": "Driver" })).into_response()
}

async fn volume(State(state): State<Arc<MockSpotify>>, headers: HeaderMap) -> Response {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    if !state.is_valid(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn plain(State(state): State<Arc<MockSpotify>>) -> Response {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, "not json").into_response()
}

async fn missing(State(state): State<Arc<MockSpotify>>) -> Response {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "status": 404, "message": "Not found" } })),
    )
        .into_response()
}
