use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::errors::{AppError, AppResult};

const ID_PARAMS: &[&str] = &["ftid", "place_id"];
const QUERY_PARAM: &str = "q";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceLookup {
    pub place_id: Option<String>,
    pub query: String,
}

impl PlaceLookup {
    pub fn query_only(query: impl Into<String>) -> Self {
        Self {
            place_id: None,
            query: query.into(),
        }
    }
}

#[async_trait]
pub trait LinkExpander: Send + Sync {
    async fn expand(&self, short_url: &str) -> AppResult<String>;
}

pub struct HttpLinkExpander {
    http: Client,
}

impl HttpLinkExpander {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl LinkExpander for HttpLinkExpander {
    async fn expand(&self, short_url: &str) -> AppResult<String> {
        debug!(short_url, "expanding short link");
        let response = self.http.get(short_url).send().await?;
        let expanded = response.url().to_string();
        info!(expanded = %expanded, "expanded short link");
        Ok(expanded)
    }
}

#[derive(Clone)]
pub struct IdentifierResolver {
    expander: Arc<dyn LinkExpander>,
}

impl IdentifierResolver {
    pub fn new(expander: Arc<dyn LinkExpander>) -> Self {
        Self { expander }
    }

    pub async fn resolve(&self, input: &str) -> AppResult<PlaceLookup> {
        let input = input.trim();
        if !is_link(input) {
            return Ok(PlaceLookup::query_only(input));
        }

        let expanded = self.expander.expand(input).await.map_err(|err| match err {
            AppError::Transport(err) => {
                AppError::Resolution(format!("short link {input} is unreachable: {err}"))
            }
            other => other,
        })?;
        extract_place_lookup(&expanded)
    }
}

pub fn is_link(input: &str) -> bool {
    let lowered = input.trim_start().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

pub fn extract_place_lookup(expanded_url: &str) -> AppResult<PlaceLookup> {
    let parsed = Url::parse(expanded_url)
        .map_err(|err| AppError::Resolution(format!("malformed link {expanded_url}: {err}")))?;
    let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

    let place_id = ID_PARAMS
        .iter()
        .find_map(|key| params.get(*key).filter(|value| !value.trim().is_empty()))
        .cloned()
        .ok_or_else(|| {
            AppError::Resolution(format!("no place identifier in {expanded_url}"))
        })?;
    let query = params
        .get(QUERY_PARAM)
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| AppError::Resolution(format!("no place query in {expanded_url}")))?;

    debug!(place_id = %place_id, query = %query, "extracted place lookup from link");
    Ok(PlaceLookup {
        place_id: Some(place_id),
        query,
    })
}
