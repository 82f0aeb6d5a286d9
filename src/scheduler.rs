/// Posting scheduler
///
/// Owns the pool of users who asked to post, a shared queue of unpublished
/// candidate posts, and the periodic tick that drives everything: for each
/// user past their cooldown, top up the queue if it's running low, drain a
/// bounded batch, and publish it one post at a time with a delay in between.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;

use crate::auth::UserAuthStore;
use crate::config::Config;
use crate::content::{CandidatePost, ContentSource};
use crate::publisher::Publisher;

/// A user in the posting pool
#[derive(Debug, Clone)]
pub struct ActiveUser {
    pub user_name: String,
    /// Epoch milliseconds of the last successful batch-opening post;
    /// zero for users who have never posted
    pub last_posted: i64,
}

pub struct Scheduler {
    config: Config,
    users: Mutex<Vec<ActiveUser>>,
    queue: Mutex<VecDeque<CandidatePost>>,
    running: AtomicBool,
    content: Arc<dyn ContentSource>,
    publisher: Arc<dyn Publisher>,
    auth: Arc<dyn UserAuthStore>,
}

impl Scheduler {
    pub fn new(
        config: Config,
        content: Arc<dyn ContentSource>,
        publisher: Arc<dyn Publisher>,
        auth: Arc<dyn UserAuthStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            users: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            content,
            publisher,
            auth,
        })
    }

    /// Add a user to the posting pool and make sure the tick loop is running
    ///
    /// Registering twice is a no-op, and a fresh user is due on the very next
    /// tick. This never posts by itself.
    pub async fn register(self: &Arc<Self>, user_name: &str) {
        {
            let mut users = self.users.lock().await;
            if !users.iter().any(|u| u.user_name == user_name) {
                users.push(ActiveUser {
                    user_name: user_name.to_string(),
                    last_posted: 0,
                });
                log::info!("Registered {} for scheduled posting", user_name);
            }
        }

        if !self.running.swap(true, Ordering::SeqCst) {
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.run_loop().await;
            });
            log::info!(
                "Posting scheduler started (tick every {} minutes)",
                self.config.tick_interval_minutes
            );
        }
    }

    /// Remove a user from the posting pool
    ///
    /// Unknown users are ignored. The tick loop keeps running even when the
    /// pool empties; a tick with nobody due does nothing.
    pub async fn unregister(&self, user_name: &str) {
        let mut users = self.users.lock().await;
        users.retain(|u| u.user_name != user_name);
    }

    pub async fn is_registered(&self, user_name: &str) -> bool {
        let users = self.users.lock().await;
        users.iter().any(|u| u.user_name == user_name)
    }

    async fn run_loop(self: Arc<Self>) {
        let mut interval =
            time::interval(Duration::from_secs(self.config.tick_interval_minutes * 60));

        // The first tick completes immediately; skip it so registration does
        // not trigger an instant posting round
        interval.tick().await;

        loop {
            interval.tick().await;
            self.run_tick().await;
        }
    }

    /// One scheduling round over every registered user
    pub async fn run_tick(&self) {
        let snapshot: Vec<ActiveUser> = self.users.lock().await.clone();

        for user in &snapshot {
            let now = Utc::now().timestamp_millis();
            if now - user.last_posted < self.config.post_interval_ms() {
                continue;
            }

            // Top up the shared queue when it runs low; a fetch failure
            // skips this user's whole turn until the next tick
            let queue_len = self.queue.lock().await.len();
            if queue_len < self.config.queue_low_water {
                match self.content.fetch_batch().await {
                    Ok(batch) => {
                        log::info!("Queued {} fresh candidate posts", batch.len());
                        self.queue.lock().await.extend(batch);
                    }
                    Err(e) => {
                        log::error!("Content fetch failed: {}", e);
                        continue;
                    }
                }
            }

            let batch: Vec<CandidatePost> = {
                let mut queue = self.queue.lock().await;
                let take = self.config.drain_batch_size.min(queue.len());
                queue.drain(..take).collect()
            };

            self.post_sequentially(&user.user_name, batch).await;
        }
    }

    /// Publish a batch one post at a time, spaced by the inter-post delay
    ///
    /// The user's cooldown resets as soon as the first post succeeds; later
    /// posts are attempted regardless of earlier outcomes and never retried.
    async fn post_sequentially(&self, user_name: &str, posts: Vec<CandidatePost>) {
        let total = posts.len();

        for (i, post) in posts.into_iter().enumerate() {
            let success = self.attempt_publish(user_name, &post).await;

            if success && i == 0 {
                let mut users = self.users.lock().await;
                if let Some(user) = users.iter_mut().find(|u| u.user_name == user_name) {
                    user.last_posted = Utc::now().timestamp_millis();
                }
            }

            if i < total - 1 {
                time::sleep(Duration::from_secs(self.config.inter_post_delay_secs)).await;
            }
        }
    }

    /// One publish attempt: auth check, credential load, then the publisher
    ///
    /// Every failure is absorbed here and reported as `false`; nothing in a
    /// batch can take the tick loop down.
    async fn attempt_publish(&self, user_name: &str, post: &CandidatePost) -> bool {
        match self.auth.is_valid(user_name).await {
            Ok(true) => {}
            Ok(false) => {
                log::error!("{} is not logged in, skipping post", user_name);
                return false;
            }
            Err(e) => {
                log::error!("Auth check failed for {}: {}", user_name, e);
                return false;
            }
        }

        let creds = match self.auth.credentials_for(user_name).await {
            Ok(creds) => creds,
            Err(e) => {
                log::error!("Could not load credentials for {}: {}", user_name, e);
                return false;
            }
        };

        let result = self.publisher.publish(post, &creds).await;
        if !result.success {
            log::warn!(
                "Publish attempt failed for {} (topic \"{}\")",
                user_name,
                post.topic
            );
        }
        result.success
    }
}
