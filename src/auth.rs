/// User authentication state and OAuth2 token refresh
///
/// Answers "is this user currently logged in" for the scheduler, refreshing
/// the access token transparently when it has expired, and hands out the
/// credential bundle the publisher needs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::store::UserStore;

const TOKEN_URL: &str = "https://api.x.com/2/oauth2/token";

/// Credentials needed to publish on a user's behalf
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub access_token: String,
    pub oauth_token: String,
    pub oauth_token_secret: String,
}

/// Authentication queries the scheduler makes about a user
#[async_trait]
pub trait UserAuthStore: Send + Sync {
    /// Whether the user is logged in, refreshing the access token if expired
    async fn is_valid(&self, user_name: &str) -> Result<bool>;

    /// The stored credential bundle; errors if the user has none
    async fn credentials_for(&self, user_name: &str) -> Result<UserCredentials>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

/// Database-backed auth store talking to the X token endpoint
pub struct TokenAuthStore {
    store: UserStore,
    http_client: reqwest::Client,
    client_id: String,
}

impl TokenAuthStore {
    pub fn new(store: UserStore, client_id: String) -> Self {
        Self {
            store,
            http_client: reqwest::Client::new(),
            client_id,
        }
    }

    /// Exchange the refresh token for a new access token and persist it
    async fn refresh_token(&self, user_name: &str, refresh_token: &str) -> Result<()> {
        let params = [
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
        ];

        let response = self
            .http_client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Token refresh rejected (status {}): {}", status, text);
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;

        let expires_at = Utc::now().timestamp_millis() + token.expires_in * 1000;

        self.store
            .upsert_oauth2_tokens(user_name, &token.access_token, &token.refresh_token, expires_at)
            .await?;

        log::info!("Refreshed access token for {}", user_name);
        Ok(())
    }
}

#[async_trait]
impl UserAuthStore for TokenAuthStore {
    async fn is_valid(&self, user_name: &str) -> Result<bool> {
        let user = match self.store.get(user_name).await? {
            Some(user) => user,
            None => return Ok(false),
        };

        if !user.has_complete_credentials() {
            return Ok(false);
        }

        let expires_at = user.expires_at.unwrap_or(0);
        if expires_at < Utc::now().timestamp_millis() {
            log::info!("Access token expired for {}, attempting refresh...", user_name);

            let refresh = user.refresh_token.unwrap_or_default();
            match self.refresh_token(user_name, &refresh).await {
                Ok(()) => return Ok(true),
                Err(e) => {
                    log::error!("Refresh failed for {}: {}", user_name, e);
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    async fn credentials_for(&self, user_name: &str) -> Result<UserCredentials> {
        let user = self
            .store
            .get(user_name)
            .await?
            .with_context(|| format!("No stored credentials for {}", user_name))?;

        Ok(UserCredentials {
            access_token: user
                .access_token
                .with_context(|| format!("No access token for {}", user_name))?,
            oauth_token: user
                .oauth_token
                .with_context(|| format!("No OAuth1 token for {}", user_name))?,
            oauth_token_secret: user
                .oauth_token_secret
                .with_context(|| format!("No OAuth1 token secret for {}", user_name))?,
        })
    }
}
