/// Configuration module for managing environment variables and API keys
///
/// This module loads and validates all required configuration values from
/// environment variables (typically from a .env file).

use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    /// OAuth2 client id for the X developer app
    pub client_id: String,

    /// OAuth1 consumer key/secret pair for media uploads and login
    pub consumer_key: String,
    pub consumer_secret: String,

    /// newsdata.io API key for fetching articles
    pub newsdata_api_key: String,

    /// OpenRouter API key for the digest model
    pub openrouter_api_key: String,

    /// PostgreSQL database URL for the user credential store
    pub database_url: String,

    /// News topic the digest is built around
    pub news_topic: String,

    /// OpenRouter model used to write the posts
    pub digest_model: String,

    /// Callback URI registered with the X developer app
    pub oauth_callback: String,

    /// Minimum hours between a user's posting batches
    pub post_interval_hours: u64,

    /// Minutes between scheduler ticks
    pub tick_interval_minutes: u64,

    /// Seconds to wait between consecutive posts in one batch
    pub inter_post_delay_secs: u64,

    /// Queue length below which a content fetch is triggered
    pub queue_low_water: usize,

    /// Maximum posts drained for one user in one tick
    pub drain_batch_size: usize,

    /// Port for the HTTP API
    pub server_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if any required environment variable is missing
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Ok(Config {
            client_id: env::var("CLIENT_ID").context("CLIENT_ID must be set")?,

            consumer_key: env::var("CONSUMER_KEY").context("CONSUMER_KEY must be set")?,

            consumer_secret: env::var("CONSUMER_SECRET").context("CONSUMER_SECRET must be set")?,

            newsdata_api_key: env::var("NEWSDATA_API_KEY")
                .context("NEWSDATA_API_KEY must be set")?,

            openrouter_api_key: env::var("OPENROUTER_API_KEY")
                .context("OPENROUTER_API_KEY must be set")?,

            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,

            news_topic: env::var("NEWS_TOPIC").unwrap_or_else(|_| "cricket".to_string()),

            digest_model: env::var("DIGEST_MODEL")
                .unwrap_or_else(|_| "google/gemma-3-27b-it:free".to_string()),

            oauth_callback: env::var("OAUTH_CALLBACK")
                .unwrap_or_else(|_| "bluebot://callback".to_string()),

            post_interval_hours: env::var("POST_INTERVAL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),

            tick_interval_minutes: env::var("TICK_INTERVAL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),

            inter_post_delay_secs: env::var("INTER_POST_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5 * 60),

            queue_low_water: env::var("QUEUE_LOW_WATER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),

            drain_batch_size: env::var("DRAIN_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),

            server_port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        })
    }

    /// Minimum milliseconds between a user's posting batches
    pub fn post_interval_ms(&self) -> i64 {
        (self.post_interval_hours * 60 * 60 * 1000) as i64
    }

    /// Validate that all required services are accessible
    pub async fn validate(&self) -> Result<()> {
        log::info!("Validating configuration...");

        // Test Postgres connection
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&self.database_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        // Test query
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .context("Database connection test query failed")?;

        log::info!("Configuration validated successfully");
        Ok(())
    }

    /// Configuration with placeholder keys for exercising components in tests
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            client_id: "test-client-id".to_string(),
            consumer_key: "test-consumer-key".to_string(),
            consumer_secret: "test-consumer-secret".to_string(),
            newsdata_api_key: "test-news-key".to_string(),
            openrouter_api_key: "test-openrouter-key".to_string(),
            database_url: "postgres://localhost/bluebot_test".to_string(),
            news_topic: "cricket".to_string(),
            digest_model: "google/gemma-3-27b-it:free".to_string(),
            oauth_callback: "bluebot://callback".to_string(),
            post_interval_hours: 8,
            tick_interval_minutes: 50,
            inter_post_delay_secs: 0,
            queue_low_water: 5,
            drain_batch_size: 5,
            server_port: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_interval_ms() {
        let config = Config::for_tests();
        assert_eq!(config.post_interval_ms(), 8 * 60 * 60 * 1000);
    }

    #[test]
    fn test_post_interval_ms_custom() {
        let config = Config {
            post_interval_hours: 1,
            ..Config::for_tests()
        };
        assert_eq!(config.post_interval_ms(), 3_600_000);
    }
}
