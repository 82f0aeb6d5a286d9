/// Bluebot
///
/// A posting service for X (Twitter) that writes and publishes posts on
/// behalf of logged-in users.
///
/// The service:
/// - Fetches recent news for a topic and has an LLM write posts about it
/// - Keeps a shared queue of candidate posts, topped up when it runs low
/// - Posts for each registered user on a fixed cadence, one post at a time
/// - Refreshes expired access tokens transparently before posting
/// - Exposes the OAuth login flows and start/stop controls over HTTP

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use bluebot::auth::{TokenAuthStore, UserAuthStore};
use bluebot::config::Config;
use bluebot::content::NewsDigest;
use bluebot::http_server::{self, AppState};
use bluebot::publisher::TwitterPublisher;
use bluebot::scheduler::Scheduler;
use bluebot::store::UserStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    pretty_env_logger::init();

    log::info!("Starting bluebot...");

    // Load configuration from environment
    let config = Config::from_env()?;

    // Validate configuration and connections
    config.validate().await?;

    let store = UserStore::connect(&config.database_url).await?;
    store.init_schema().await?;

    let auth: Arc<dyn UserAuthStore> =
        Arc::new(TokenAuthStore::new(store.clone(), config.client_id.clone()));
    let content = Arc::new(NewsDigest::new(&config));
    let publisher = Arc::new(TwitterPublisher::new(&config));

    let scheduler = Scheduler::new(
        config.clone(),
        content,
        publisher,
        auth.clone(),
    );

    let state = AppState {
        config: config.clone(),
        store,
        auth,
        scheduler,
        http_client: reqwest::Client::new(),
        code_verifiers: Arc::new(Mutex::new(HashMap::new())),
    };

    http_server::start_server(state, config.server_port).await
}
