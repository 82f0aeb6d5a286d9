/// User credential store backed by PostgreSQL
///
/// Holds the OAuth1 token pair and OAuth2 token set for each user who has
/// completed a login. The OAuth completion routes and the token refresher
/// each write their own columns, so upserts merge rather than replace.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// A user's stored credentials, as persisted by the OAuth routes
///
/// Every column except the key is nullable because OAuth1 and OAuth2 logins
/// complete independently; a user is only publishable once both have run.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredUser {
    pub user_name: String,
    pub oauth_token: Option<String>,
    pub oauth_token_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

impl StoredUser {
    /// Whether every credential field required for posting is present
    pub fn has_complete_credentials(&self) -> bool {
        self.oauth_token.is_some()
            && self.oauth_token_secret.is_some()
            && self.access_token.is_some()
            && self.refresh_token.is_some()
            && self.expires_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct UserStore {
    pool: PgPool,
}

impl UserStore {
    /// Connect to the database
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    /// Create the users table if it doesn't exist
    pub async fn init_schema(&self) -> Result<()> {
        log::info!("Initializing user table...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_name TEXT PRIMARY KEY,
                oauth_token TEXT,
                oauth_token_secret TEXT,
                access_token TEXT,
                refresh_token TEXT,
                expires_at BIGINT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create users table")?;

        Ok(())
    }

    /// Fetch a user's stored credentials
    pub async fn get(&self, user_name: &str) -> Result<Option<StoredUser>> {
        let user = sqlx::query_as::<_, StoredUser>(
            r#"
            SELECT user_name, oauth_token, oauth_token_secret,
                   access_token, refresh_token, expires_at
            FROM users
            WHERE user_name = $1
            "#,
        )
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load user credentials")?;

        Ok(user)
    }

    /// Store the OAuth1 token pair for a user, leaving OAuth2 columns alone
    pub async fn upsert_oauth1_tokens(
        &self,
        user_name: &str,
        oauth_token: &str,
        oauth_token_secret: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_name, oauth_token, oauth_token_secret)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_name) DO UPDATE
            SET oauth_token = $2, oauth_token_secret = $3
            "#,
        )
        .bind(user_name)
        .bind(oauth_token)
        .bind(oauth_token_secret)
        .execute(&self.pool)
        .await
        .context("Failed to store OAuth1 tokens")?;

        Ok(())
    }

    /// Store the OAuth2 token set for a user, leaving OAuth1 columns alone
    pub async fn upsert_oauth2_tokens(
        &self,
        user_name: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_name, access_token, refresh_token, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_name) DO UPDATE
            SET access_token = $2, refresh_token = $3, expires_at = $4
            "#,
        )
        .bind(user_name)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to store OAuth2 tokens")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_user() -> StoredUser {
        StoredUser {
            user_name: "alice".to_string(),
            oauth_token: Some("tok".to_string()),
            oauth_token_secret: Some("secret".to_string()),
            access_token: Some("access".to_string()),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(1_700_000_000_000),
        }
    }

    #[test]
    fn test_complete_credentials() {
        assert!(full_user().has_complete_credentials());
    }

    #[test]
    fn test_missing_oauth1_field() {
        let user = StoredUser {
            oauth_token_secret: None,
            ..full_user()
        };
        assert!(!user.has_complete_credentials());
    }

    #[test]
    fn test_missing_oauth2_field() {
        let user = StoredUser {
            refresh_token: None,
            ..full_user()
        };
        assert!(!user.has_complete_credentials());
    }

    #[test]
    fn test_missing_expiry() {
        let user = StoredUser {
            expires_at: None,
            ..full_user()
        };
        assert!(!user.has_complete_credentials());
    }
}
