/// HTTP Server Module
///
/// Provides the HTTP endpoints the mobile app talks to: the OAuth1 and
/// OAuth2 (PKCE) login handshakes, login-state queries, and starting or
/// stopping scheduled posting for a user.

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::auth::UserAuthStore;
use crate::config::Config;
use crate::oauth1;
use crate::scheduler::Scheduler;
use crate::store::UserStore;

const REQUEST_TOKEN_URL: &str = "https://api.x.com/oauth/request_token";
const ACCESS_TOKEN_URL: &str = "https://api.x.com/oauth/access_token";
const AUTHORIZE_URL: &str = "https://x.com/i/oauth2/authorize";
const TOKEN_URL: &str = "https://api.x.com/2/oauth2/token";

const OAUTH2_SCOPES: &str =
    "tweet.read tweet.write media.write users.read offline.access follows.read";

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: UserStore,
    pub auth: Arc<dyn UserAuthStore>,
    pub scheduler: Arc<Scheduler>,
    pub http_client: reqwest::Client,
    /// PKCE code verifiers keyed by user, pending OAuth2 completion
    pub code_verifiers: Arc<Mutex<HashMap<String, String>>>,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompleteOauth1Request {
    oauth_token: String,
    oauth_verifier: String,
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct CompleteOauth2Request {
    code: String,
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

/// Create and configure the HTTP server router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/loginIntent", get(login_intent))
        .route("/completeOauth1", post(complete_oauth1))
        .route("/loginIntentOauth2", get(login_intent_oauth2))
        .route("/completeOauth2", post(complete_oauth2))
        .route("/isUserLoggedIn", get(is_user_logged_in))
        .route("/startTweeting", get(start_tweeting))
        .route("/stopTweeting", get(stop_tweeting))
        .route("/isUserTweeting", get(is_user_tweeting))
        .route("/ping", get(ping))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// OAuth1 step 1: fetch a request token for the login flow
async fn login_intent(State(state): State<AppState>) -> Response {
    let authorization = match oauth1::authorization_header(
        "POST",
        REQUEST_TOKEN_URL,
        &state.config.consumer_key,
        &state.config.consumer_secret,
        None,
        &[("oauth_callback", state.config.oauth_callback.as_str())],
    ) {
        Ok(header) => header,
        Err(e) => {
            log::error!("Failed to sign request token call: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    let response = state
        .http_client
        .post(REQUEST_TOKEN_URL)
        .header("Authorization", authorization)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .send()
        .await;

    let body = match response {
        Ok(r) if r.status().is_success() => r.text().await.unwrap_or_default(),
        Ok(r) => {
            log::error!("Request token rejected (status {})", r.status());
            return (StatusCode::BAD_REQUEST, "Failed to get request token").into_response();
        }
        Err(e) => {
            log::error!("Request token call failed: {}", e);
            return (StatusCode::BAD_REQUEST, "Failed to get request token").into_response();
        }
    };

    match form_value(&body, "oauth_token") {
        Some(token) => (StatusCode::OK, token).into_response(),
        None => (StatusCode::BAD_REQUEST, "Failed to get request token").into_response(),
    }
}

/// OAuth1 step 2: exchange the verifier for the user's token pair
async fn complete_oauth1(
    State(state): State<AppState>,
    Json(request): Json<CompleteOauth1Request>,
) -> Response {
    let params = [
        ("oauth_token", request.oauth_token.as_str()),
        ("oauth_verifier", request.oauth_verifier.as_str()),
    ];

    let outcome: Result<()> = async {
        let response = state
            .http_client
            .post(ACCESS_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .context("Access token call failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Access token rejected (status {})", status);
        }

        let body = response.text().await.context("Unreadable response")?;
        let oauth_token = form_value(&body, "oauth_token").context("No oauth_token in response")?;
        let oauth_token_secret =
            form_value(&body, "oauth_token_secret").context("No oauth_token_secret in response")?;

        state
            .store
            .upsert_oauth1_tokens(&request.user_name, &oauth_token, &oauth_token_secret)
            .await
    }
    .await;

    match outcome {
        Ok(()) => (StatusCode::OK, "success").into_response(),
        Err(e) => {
            log::error!("OAuth1 completion failed for {}: {}", request.user_name, e);
            Redirect::to("bluebot://callback?auth1=error").into_response()
        }
    }
}

/// OAuth2 step 1: build the PKCE authorize URL for the user
async fn login_intent_oauth2(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    let user_name = match query.user_name {
        Some(name) => name,
        None => return (StatusCode::BAD_REQUEST, "Missing user_name").into_response(),
    };

    let verifier = pkce_verifier();
    let challenge = pkce_challenge(&verifier);
    let oauth_state = random_state();

    state
        .code_verifiers
        .lock()
        .await
        .insert(user_name, verifier);

    let params = [
        ("response_type", "code"),
        ("client_id", state.config.client_id.as_str()),
        ("redirect_uri", state.config.oauth_callback.as_str()),
        ("scope", OAUTH2_SCOPES),
        ("state", oauth_state.as_str()),
        ("code_challenge", challenge.as_str()),
        ("code_challenge_method", "S256"),
    ];

    let query_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, oauth1::percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    (
        StatusCode::OK,
        format!("{}?{}", AUTHORIZE_URL, query_string),
    )
        .into_response()
}

/// OAuth2 step 2: exchange the code for tokens using the saved verifier
async fn complete_oauth2(
    State(state): State<AppState>,
    Json(request): Json<CompleteOauth2Request>,
) -> Response {
    let verifier = state
        .code_verifiers
        .lock()
        .await
        .get(&request.user_name)
        .cloned();

    let verifier = match verifier {
        Some(v) => v,
        None => return Redirect::to("bluebot://callback?auth2=error").into_response(),
    };

    let params = [
        ("code", request.code.as_str()),
        ("grant_type", "authorization_code"),
        ("client_id", state.config.client_id.as_str()),
        ("redirect_uri", state.config.oauth_callback.as_str()),
        ("code_verifier", verifier.as_str()),
    ];

    let outcome: Result<()> = async {
        let response = state
            .http_client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .context("Token call failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Token grant rejected (status {})", status);
        }

        let grant: TokenGrant = response.json().await.context("Unparseable token grant")?;
        let expires_at = Utc::now().timestamp_millis() + grant.expires_in * 1000;

        state
            .store
            .upsert_oauth2_tokens(
                &request.user_name,
                &grant.access_token,
                &grant.refresh_token,
                expires_at,
            )
            .await
    }
    .await;

    match outcome {
        Ok(()) => (StatusCode::OK, "success").into_response(),
        Err(e) => {
            log::error!("OAuth2 completion failed for {}: {}", request.user_name, e);
            Redirect::to("bluebot://callback?auth2=error").into_response()
        }
    }
}

async fn is_user_logged_in(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    let user_name = match query.user_name {
        Some(name) => name,
        None => return (StatusCode::BAD_REQUEST, "send username").into_response(),
    };

    match state.auth.is_valid(&user_name).await {
        Ok(valid) => (StatusCode::OK, valid.to_string()).into_response(),
        Err(e) => {
            log::error!("Login check failed for {}: {}", user_name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

async fn start_tweeting(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    let user_name = match query.user_name {
        Some(name) => name,
        None => return (StatusCode::BAD_REQUEST, "send username").into_response(),
    };

    state.scheduler.register(&user_name).await;
    (StatusCode::OK, "started").into_response()
}

async fn stop_tweeting(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    let user_name = match query.user_name {
        Some(name) => name,
        None => return (StatusCode::BAD_REQUEST, "send username").into_response(),
    };

    state.scheduler.unregister(&user_name).await;
    (StatusCode::OK, "stopped").into_response()
}

async fn is_user_tweeting(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    let user_name = match query.user_name {
        Some(name) => name,
        None => return (StatusCode::BAD_REQUEST, "send username").into_response(),
    };

    let tweeting = state.scheduler.is_registered(&user_name).await;
    (StatusCode::OK, tweeting.to_string()).into_response()
}

async fn ping() -> &'static str {
    "pong"
}

/// Start the HTTP server
pub async fn start_server(state: AppState, port: u16) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .context("Failed to bind HTTP server")?;

    log::info!("HTTP server listening on port {}", port);

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}

/// Pull a single value out of a form-encoded response body
fn form_value(body: &str, key: &str) -> Option<String> {
    body.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

/// Random PKCE code verifier, 43-128 characters once encoded
fn pkce_verifier() -> String {
    let len = rand::thread_rng().gen_range(43..=96);
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 code challenge for a verifier
fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random state parameter for the authorize URL
fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes[..]);
    base64::engine::general_purpose::STANDARD
        .encode(bytes)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}
