use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};

#[async_trait]
pub trait CuisineProvider: Send + Sync {
    async fn first_match_categories(&self, name: &str, location: &str) -> AppResult<Vec<String>>;
}

#[derive(Clone)]
pub struct CuisineLookup {
    provider: Option<Arc<dyn CuisineProvider>>,
}

impl CuisineLookup {
    pub fn new(provider: Arc<dyn CuisineProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub async fn lookup(&self, name: &str, city: &str) -> Option<String> {
        let Some(provider) = &self.provider else {
            debug!(name, "cuisine lookup disabled; no provider configured");
            return None;
        };

        match provider.first_match_categories(name, city).await {
            Ok(categories) if !categories.is_empty() => {
                let joined = categories.join(", ");
                info!(name, city, cuisine = %joined, "found cuisine type");
                Some(joined)
            }
            Ok(_) => {
                warn!(name, city, "no cuisine type found");
                None
            }
            Err(err) => {
                warn!(?err, name, city, "cuisine lookup failed");
                None
            }
        }
    }
}

pub struct YelpClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    businesses: Vec<Business>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Business {
    #[serde(default)]
    categories: Vec<Category>,
}

#[derive(Deserialize)]
struct Category {
    title: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    description: Option<String>,
}

impl YelpClient {
    pub fn new(http: Client, api_key: SecretString, base_url: &str) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CuisineProvider for YelpClient {
    async fn first_match_categories(&self, name: &str, location: &str) -> AppResult<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/businesses/search", self.base_url))
            .query(&[("term", name), ("location", location), ("limit", "1")])
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;
        let parsed: SearchResponse = response.json().await?;

        if let Some(error) = parsed.error {
            return Err(AppError::Provider(format!(
                "yelp {}: {}",
                error.code.unwrap_or_else(|| "UNKNOWN".into()),
                error.description.unwrap_or_else(|| "Unknown error".into())
            )));
        }

        Ok(parsed
            .businesses
            .into_iter()
            .next()
            .map(|business| {
                business
                    .categories
                    .into_iter()
                    .filter_map(|category| category.title)
                    .collect()
            })
            .unwrap_or_default())
    }
}
