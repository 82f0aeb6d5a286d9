/// Publishing module
///
/// Turns a candidate post into a live tweet for a user: uploads the image,
/// then submits the text with the media attached. Platform rejections come
/// back as a failed result rather than an error; the scheduler treats both
/// transport faults and rejections the same way.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::UserCredentials;
use crate::config::Config;
use crate::content::CandidatePost;
use crate::media;

const TWEET_URL: &str = "https://api.twitter.com/2/tweets";

/// Outcome of one publish attempt
#[derive(Debug, Clone)]
pub struct PublishResult {
    pub success: bool,
    /// Platform post id when the publish went through
    pub platform_ref: Option<String>,
}

impl PublishResult {
    fn failure() -> Self {
        Self {
            success: false,
            platform_ref: None,
        }
    }
}

/// Publishes candidate posts on a user's behalf
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, post: &CandidatePost, creds: &UserCredentials) -> PublishResult;
}

#[derive(Debug, Serialize)]
struct TweetRequest {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<TweetMedia>,
}

#[derive(Debug, Serialize)]
struct TweetMedia {
    media_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: Option<TweetData>,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

/// Publisher posting to the X v2 tweet endpoint
pub struct TwitterPublisher {
    http_client: reqwest::Client,
    consumer_key: String,
    consumer_secret: String,
}

impl TwitterPublisher {
    pub fn new(config: &Config) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
        }
    }
}

#[async_trait]
impl Publisher for TwitterPublisher {
    async fn publish(&self, post: &CandidatePost, creds: &UserCredentials) -> PublishResult {
        // Posts without an image are not publishable; bail before touching
        // the network
        let image_url = match &post.image_url {
            Some(url) => url,
            None => {
                log::error!("Post on \"{}\" has no image, skipping", post.topic);
                return PublishResult::failure();
            }
        };

        let media_id = match media::upload_image(
            &self.http_client,
            image_url,
            &self.consumer_key,
            &self.consumer_secret,
            &creds.oauth_token,
            &creds.oauth_token_secret,
        )
        .await
        {
            Ok(id) => id,
            Err(e) => {
                log::error!("Media upload failed: {}", e);
                return PublishResult::failure();
            }
        };

        let request = TweetRequest {
            text: tweet_text(post),
            media: Some(TweetMedia {
                media_ids: vec![media_id],
            }),
        };

        let response = match self
            .http_client
            .post(TWEET_URL)
            .header("Authorization", format!("Bearer {}", creds.access_token))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                log::error!("Tweet request failed: {}", e);
                return PublishResult::failure();
            }
        };

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 401 {
                log::error!("Unauthorized: access token expired or revoked");
            }
            let text = response.text().await.unwrap_or_default();
            log::error!("Tweet rejected (status {}): {}", status, text);
            return PublishResult::failure();
        }

        let tweet: Option<TweetResponse> = response.json().await.ok();
        let platform_ref = tweet.and_then(|t| t.data).map(|d| d.id);

        log::info!(
            "Tweeted on \"{}\"{}",
            post.topic,
            platform_ref
                .as_deref()
                .map(|id| format!(" (id {})", id))
                .unwrap_or_default()
        );

        PublishResult {
            success: true,
            platform_ref,
        }
    }
}

/// Tweet body: text followed by the hashtags, space separated
fn tweet_text(post: &CandidatePost) -> String {
    format!("{} {}", post.text, post.hashtags.join(" "))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(image_url: Option<&str>) -> CandidatePost {
        CandidatePost {
            topic: "cricket".to_string(),
            text: "A fine innings today".to_string(),
            hashtags: vec!["#cricket".to_string(), "#sport".to_string()],
            image_url: image_url.map(|u| u.to_string()),
        }
    }

    fn creds() -> UserCredentials {
        UserCredentials {
            access_token: "access".to_string(),
            oauth_token: "tok".to_string(),
            oauth_token_secret: "secret".to_string(),
        }
    }

    #[test]
    fn test_tweet_text_appends_hashtags() {
        assert_eq!(
            tweet_text(&post(None)),
            "A fine innings today #cricket #sport"
        );
    }

    #[test]
    fn test_tweet_text_without_hashtags() {
        let mut p = post(None);
        p.hashtags.clear();
        assert_eq!(tweet_text(&p), "A fine innings today");
    }

    #[tokio::test]
    async fn test_publish_without_image_fails_before_network() {
        let publisher = TwitterPublisher::new(&Config::for_tests());

        // No network is available here; the attempt must fail on the missing
        // image alone
        let result = publisher.publish(&post(None), &creds()).await;

        assert!(!result.success);
        assert!(result.platform_ref.is_none());
    }
}
