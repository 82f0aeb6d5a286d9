/// Image upload to the X v1.1 media endpoint
///
/// Downloads the article image and re-uploads it as multipart form data with
/// an OAuth 1.0a signed request, returning the media id to attach to a post.

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::oauth1;

const UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

/// Upload the image at `image_url` on behalf of the user holding the
/// OAuth1 token pair, returning the platform media id
pub async fn upload_image(
    http_client: &reqwest::Client,
    image_url: &str,
    consumer_key: &str,
    consumer_secret: &str,
    oauth_token: &str,
    oauth_token_secret: &str,
) -> Result<String> {
    let image = http_client
        .get(image_url)
        .send()
        .await
        .context("Failed to download image")?;

    let status = image.status();
    if !status.is_success() {
        anyhow::bail!("Image download rejected (status {})", status);
    }

    let bytes = image
        .bytes()
        .await
        .context("Failed to read image bytes")?;

    let authorization = oauth1::authorization_header(
        "POST",
        UPLOAD_URL,
        consumer_key,
        consumer_secret,
        Some((oauth_token, oauth_token_secret)),
        &[],
    )?;

    let form = Form::new().part("media", Part::bytes(bytes.to_vec()).file_name("image.jpg"));

    let response = http_client
        .post(UPLOAD_URL)
        .header("Authorization", authorization)
        .multipart(form)
        .send()
        .await
        .context("Failed to upload media")?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("Media upload rejected (status {}): {}", status, text);
    }

    let upload: MediaUploadResponse = response
        .json()
        .await
        .context("Failed to parse media upload response")?;

    Ok(upload.media_id_string)
}
