use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Body, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::places::GooglePlacesClient;

pub struct PhotoPayload {
    pub body: Body,
    pub content_type: String,
    pub content_length: Option<u64>,
}

#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch_photo(&self, reference: &str) -> AppResult<PhotoPayload>;
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, image: PhotoPayload, file_name: &str) -> AppResult<String>;
}

#[derive(Clone)]
pub struct PhotoRelay {
    source: Arc<dyn PhotoSource>,
    host: Option<Arc<dyn ImageHost>>,
}

impl PhotoRelay {
    pub fn new(source: Arc<dyn PhotoSource>, host: Option<Arc<dyn ImageHost>>) -> Self {
        Self { source, host }
    }

    pub async fn relay(&self, reference: Option<&str>, place_name: &str) -> Option<String> {
        let reference = reference?;
        let Some(host) = &self.host else {
            debug!(place = place_name, "image host not configured; skipping cover");
            return None;
        };

        let image = match self.source.fetch_photo(reference).await {
            Ok(image) => image,
            Err(err) => {
                warn!(?err, place = place_name, "failed to fetch place photo");
                return None;
            }
        };

        match host.upload(image, &upload_file_name(place_name)).await {
            Ok(url) => {
                info!(place = place_name, cover = %url, "uploaded cover image");
                Some(url)
            }
            Err(err) => {
                warn!(?err, place = place_name, "failed to upload cover image");
                None
            }
        }
    }
}

fn upload_file_name(place_name: &str) -> String {
    let slug: String = place_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "cover.jpg".to_string()
    } else {
        format!("{slug}.jpg")
    }
}

#[async_trait]
impl PhotoSource for GooglePlacesClient {
    async fn fetch_photo(&self, reference: &str) -> AppResult<PhotoPayload> {
        let response = self.photo_request(reference).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::Provider(format!(
                "photo endpoint returned {content_type:?} instead of an image"
            )));
        }
        let content_length = response.content_length();
        debug!(content_type = %content_type, ?content_length, "streaming place photo");
        Ok(PhotoPayload {
            body: Body::wrap_stream(response.bytes_stream()),
            content_type,
            content_length,
        })
    }
}

pub struct CloudinaryClient {
    http: Client,
    cloud_name: String,
    api_key: SecretString,
    api_secret: SecretString,
    base_url: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadError>,
}

#[derive(Deserialize)]
struct UploadError {
    message: Option<String>,
}

impl CloudinaryClient {
    pub fn new(
        http: Client,
        cloud_name: String,
        api_key: SecretString,
        api_secret: SecretString,
        base_url: &str,
    ) -> Self {
        Self {
            http,
            cloud_name,
            api_key,
            api_secret,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn sign(&self, timestamp: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("timestamp={timestamp}").as_bytes());
        hasher.update(self.api_secret.expose_secret().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl ImageHost for CloudinaryClient {
    async fn upload(&self, image: PhotoPayload, file_name: &str) -> AppResult<String> {
        let timestamp = Utc::now().timestamp();
        let part = match image.content_length {
            Some(length) => Part::stream_with_length(image.body, length),
            None => Part::stream(image.body),
        }
        .file_name(file_name.to_string())
        .mime_str(&image.content_type)?;

        let form = Form::new()
            .part("file", part)
            .text("api_key", self.api_key.expose_secret().to_string())
            .text("timestamp", timestamp.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", self.sign(timestamp));

        let url = format!("{}/{}/image/upload", self.base_url, self.cloud_name);
        debug!(url = %url, file_name, "uploading image");
        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        let parsed: UploadResponse = response.json().await?;

        match (parsed.secure_url, parsed.error) {
            (Some(secure_url), None) if status.is_success() => Ok(secure_url),
            (_, error) => Err(AppError::Provider(format!(
                "image upload failed ({status}): {}",
                error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "no secure_url in response".into())
            ))),
        }
    }
}
