/// Content generation module
///
/// Builds batches of candidate posts by fetching recent news articles from
/// newsdata.io and having an OpenRouter model write one post per article.
/// The article images ride along so each post can carry a picture.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::Config;

const NEWS_URL: &str = "https://newsdata.io/api/1/latest";
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// How many articles feed one digest batch
const ARTICLES_PER_BATCH: usize = 5;

/// An unpublished candidate post produced by the digest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePost {
    pub topic: String,
    pub text: String,
    pub hashtags: Vec<String>,
    pub image_url: Option<String>,
}

/// Source of candidate post batches for the scheduler
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_batch(&self) -> Result<Vec<CandidatePost>>;
}

#[derive(Debug, Clone)]
struct Article {
    title: String,
    description: String,
    image_url: String,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<NewsArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsArticle {
    title: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
}

/// OpenRouter API request/response structures
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct DigestPost {
    #[serde(default)]
    tweet: String,
    #[serde(default)]
    hashtags: Vec<String>,
}

/// News-backed content source using an LLM to write the posts
pub struct NewsDigest {
    http_client: reqwest::Client,
    newsdata_api_key: String,
    openrouter_api_key: String,
    topic: String,
    model: String,
}

impl NewsDigest {
    pub fn new(config: &Config) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            newsdata_api_key: config.newsdata_api_key.clone(),
            openrouter_api_key: config.openrouter_api_key.clone(),
            topic: config.news_topic.clone(),
            model: config.digest_model.clone(),
        }
    }

    /// Fetch recent articles for the topic
    ///
    /// A news API failure degrades to an empty article list; the digest still
    /// runs, it just has nothing to attach images to.
    async fn fetch_articles(&self) -> Vec<Article> {
        let response = self
            .http_client
            .get(NEWS_URL)
            .query(&[
                ("apikey", self.newsdata_api_key.as_str()),
                ("q", self.topic.as_str()),
                ("language", "en"),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                log::error!("News fetch failed for topic \"{}\": {}", self.topic, e);
                return Vec::new();
            }
        };

        let news: NewsResponse = match response.json().await {
            Ok(n) => n,
            Err(e) => {
                log::error!("Failed to parse news response for \"{}\": {}", self.topic, e);
                return Vec::new();
            }
        };

        // Only articles carrying a title, description, and image are usable
        news.results
            .into_iter()
            .filter_map(|a| match (a.title, a.description, a.image_url) {
                (Some(title), Some(description), Some(image_url)) => Some(Article {
                    title,
                    description,
                    image_url,
                }),
                _ => None,
            })
            .take(ARTICLES_PER_BATCH)
            .collect()
    }

    fn build_prompt(&self, articles: &[Article]) -> String {
        let article_list = articles
            .iter()
            .map(|a| format!("- Title: {}\n  Description: {}", a.title, a.description))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are a helpful social media assistant.\n\n\
            Write {count} clear, complete, and engaging tweets under 280 characters about the topic \"{topic}\".\n\
            Each tweet should summarize the core message of one article so the reader understands the full context without needing to read the original source.\n\n\
            Avoid vague or incomplete statements.\n\
            Include 1 or 2 highly relevant hashtags at the end (no emojis).\n\
            Return strictly valid JSON like:\n\n\
            {{\n\
              \"{topic}\": [\n\
                {{\n\
                  \"tweet\": \"Text here\",\n\
                  \"hashtags\": [\"#tag1\", \"#tag2\"]\n\
                }},\n\
                ...\n\
              ]\n\
            }}\n\n\
            Articles:\n{articles}",
            count = ARTICLES_PER_BATCH,
            topic = self.topic,
            articles = article_list,
        )
    }
}

#[async_trait]
impl ContentSource for NewsDigest {
    async fn fetch_batch(&self) -> Result<Vec<CandidatePost>> {
        let articles = self.fetch_articles().await;
        log::info!(
            "Fetched {} articles for topic \"{}\"",
            articles.len(),
            self.topic
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: self.build_prompt(&articles),
            }],
        };

        let response = self
            .http_client
            .post(OPENROUTER_URL)
            .header(
                "Authorization",
                format!("Bearer {}", self.openrouter_api_key),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send digest request to OpenRouter")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenRouter error (status {}): {}", status, text);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenRouter response")?;

        let raw = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("No digest returned by the model")?;

        digest_to_posts(&self.topic, &raw, &articles)
    }
}

/// Turn the model's raw digest into candidate posts, pairing post i with
/// article i's image
fn digest_to_posts(topic: &str, raw: &str, articles: &[Article]) -> Result<Vec<CandidatePost>> {
    let cleaned = clean_model_json(raw);

    let mut parsed: HashMap<String, Vec<DigestPost>> =
        serde_json::from_str(&cleaned).context("Digest was not valid JSON")?;

    let digest = parsed.remove(topic).unwrap_or_default();

    Ok(digest
        .into_iter()
        .enumerate()
        .map(|(i, post)| CandidatePost {
            topic: topic.to_string(),
            text: post.tweet,
            hashtags: post.hashtags,
            image_url: articles.get(i).map(|a| a.image_url.clone()),
        })
        .collect())
}

/// Strip markdown code fences and trailing commas the model tends to emit
fn clean_model_json(raw: &str) -> String {
    let stripped = raw.trim().replace("```json", "").replace("```", "");

    let chars: Vec<char> = stripped.chars().collect();
    let mut out = String::with_capacity(stripped.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == ']' || chars[j] == '}') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn articles(urls: &[&str]) -> Vec<Article> {
        urls.iter()
            .map(|u| Article {
                title: "title".to_string(),
                description: "description".to_string(),
                image_url: u.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_clean_model_json_strips_fences() {
        let raw = "```json\n{\"cricket\": []}\n```";
        assert_eq!(clean_model_json(raw).trim(), "{\"cricket\": []}");
    }

    #[test]
    fn test_clean_model_json_strips_trailing_commas() {
        let raw = "{\"cricket\": [{\"tweet\": \"a\", \"hashtags\": [\"#x\",]},]}";
        let cleaned = clean_model_json(raw);
        assert!(serde_json::from_str::<serde_json::Value>(&cleaned).is_ok());
    }

    #[test]
    fn test_clean_model_json_keeps_interior_commas() {
        let raw = "{\"a\": [1, 2, 3]}";
        assert_eq!(clean_model_json(raw), "{\"a\": [1, 2, 3]}");
    }

    #[test]
    fn test_digest_to_posts_pairs_images_in_order() {
        let raw = r##"{"cricket": [
            {"tweet": "first", "hashtags": ["#one"]},
            {"tweet": "second", "hashtags": ["#two"]}
        ]}"##;
        let posts =
            digest_to_posts("cricket", raw, &articles(&["http://a/1.jpg", "http://a/2.jpg"]))
                .unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].text, "first");
        assert_eq!(posts[0].image_url.as_deref(), Some("http://a/1.jpg"));
        assert_eq!(posts[1].image_url.as_deref(), Some("http://a/2.jpg"));
    }

    #[test]
    fn test_digest_to_posts_without_article_has_no_image() {
        let raw = r#"{"cricket": [
            {"tweet": "first", "hashtags": []},
            {"tweet": "second", "hashtags": []}
        ]}"#;
        let posts = digest_to_posts("cricket", raw, &articles(&["http://a/1.jpg"])).unwrap();

        assert_eq!(posts[0].image_url.as_deref(), Some("http://a/1.jpg"));
        assert_eq!(posts[1].image_url, None);
    }

    #[test]
    fn test_digest_to_posts_missing_topic_is_empty() {
        let posts = digest_to_posts("cricket", r#"{"football": []}"#, &[]).unwrap();
        assert!(posts.is_empty());
    }

    #[test]
    fn test_digest_to_posts_rejects_garbage() {
        assert!(digest_to_posts("cricket", "not json at all", &[]).is_err());
    }

    #[test]
    fn test_digest_to_posts_fenced_output() {
        let raw = "```json\n{\"cricket\": [{\"tweet\": \"t\", \"hashtags\": [\"#c\"]}]}\n```";
        let posts = digest_to_posts("cricket", raw, &[]).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].hashtags, vec!["#c".to_string()]);
    }
}
