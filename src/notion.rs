use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use crate::errors::{AppError, AppResult};
use crate::model::{needs_enrichment, DatabaseEntry, EntryTarget, PlaceRecord, ENRICHMENT_MARKER};

pub const TITLE_PROPERTY: &str = "Name";
const PAGE_ICON: &str = "🍽️";
const QUERY_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Url(String),
    Select(String),
}

impl PropertyValue {
    pub fn text(&self) -> &str {
        match self {
            PropertyValue::Title(v)
            | PropertyValue::RichText(v)
            | PropertyValue::Url(v)
            | PropertyValue::Select(v) => v,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            PropertyValue::Title(v) => json!({"title": [{"text": {"content": v}}]}),
            PropertyValue::RichText(v) => json!({"rich_text": [{"text": {"content": v}}]}),
            PropertyValue::Url(v) => json!({"url": v}),
            PropertyValue::Select(v) => json!({"select": {"name": v}}),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageUpdate {
    pub properties: Vec<(&'static str, PropertyValue)>,
    pub cover: Option<String>,
}

impl PageUpdate {
    pub fn from_record(record: &PlaceRecord, cover: Option<String>) -> Self {
        let properties = vec![
            (TITLE_PROPERTY, PropertyValue::Title(record.name.clone())),
            ("City", PropertyValue::RichText(record.city_or_placeholder().to_string())),
            ("Country", PropertyValue::RichText(record.country_or_placeholder().to_string())),
            (
                "Cuisine Type",
                PropertyValue::RichText(record.cuisine_or_placeholder().to_string()),
            ),
            ("Google Maps", PropertyValue::Url(record.map_link_or_placeholder().to_string())),
            ("Price range", PropertyValue::Select(record.price.render())),
            ("Website", PropertyValue::Url(record.website_or_placeholder().to_string())),
        ];
        Self { properties, cover }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    pub fn properties_json(&self) -> Value {
        let map: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect();
        Value::Object(map)
    }

    fn to_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("properties".into(), self.properties_json());
        if let Some(url) = &self.cover {
            body.insert(
                "cover".into(),
                json!({"type": "external", "external": {"url": url}}),
            );
        }
        body
    }
}

#[async_trait]
pub trait WorkspaceDatabase: Send + Sync {
    async fn pending_entries(&self) -> AppResult<Vec<DatabaseEntry>>;
    async fn patch_page(&self, page_id: &str, update: &PageUpdate) -> AppResult<()>;
    async fn create_page(&self, update: &PageUpdate) -> AppResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Patched,
    Created,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Patched => "patched",
            SyncAction::Created => "created",
        }
    }
}

#[derive(Clone)]
pub struct DatabaseSync {
    database: Arc<dyn WorkspaceDatabase>,
}

impl DatabaseSync {
    pub fn new(database: Arc<dyn WorkspaceDatabase>) -> Self {
        Self { database }
    }

    pub async fn pending_entries(&self) -> AppResult<Vec<DatabaseEntry>> {
        self.database.pending_entries().await
    }

    pub async fn sync(&self, target: &EntryTarget, update: &PageUpdate) -> AppResult<SyncAction> {
        match target {
            EntryTarget::Existing(page_id) => {
                self.database.patch_page(page_id, update).await?;
                Ok(SyncAction::Patched)
            }
            EntryTarget::New => {
                let page_id = self.database.create_page(update).await?;
                debug!(page_id = %page_id, "created database row");
                Ok(SyncAction::Created)
            }
        }
    }
}

pub struct NotionClient {
    http: Client,
    api_key: SecretString,
    database_id: String,
    version: String,
    base_url: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<PageObject>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct PageObject {
    id: String,
    #[serde(default)]
    properties: HashMap<String, PropertyObject>,
}

#[derive(Deserialize)]
struct PropertyObject {
    title: Option<Vec<RichTextObject>>,
}

#[derive(Deserialize)]
struct RichTextObject {
    plain_text: Option<String>,
}

#[derive(Deserialize)]
struct CreatedPage {
    id: String,
}

impl PageObject {
    fn title(&self) -> String {
        let property = self
            .properties
            .get(TITLE_PROPERTY)
            .filter(|p| p.title.is_some())
            .or_else(|| self.properties.values().find(|p| p.title.is_some()));
        property
            .and_then(|p| p.title.as_ref())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.plain_text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

impl NotionClient {
    pub fn new(
        http: Client,
        api_key: SecretString,
        database_id: String,
        version: String,
        base_url: &str,
    ) -> Self {
        Self {
            http,
            api_key,
            database_id,
            version,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.api_key.expose_secret())
            .header("Notion-Version", &self.version)
    }

    async fn check(response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), detail = %detail, "notion request rejected");
        Err(AppError::Sync {
            status: status.as_u16(),
            detail,
        })
    }
}

#[async_trait]
impl WorkspaceDatabase for NotionClient {
    async fn pending_entries(&self) -> AppResult<Vec<DatabaseEntry>> {
        let url = format!("{}/databases/{}/query", self.base_url, self.database_id);
        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({
                "filter": {
                    "property": TITLE_PROPERTY,
                    "title": {"ends_with": ENRICHMENT_MARKER.to_string()}
                },
                "page_size": QUERY_PAGE_SIZE,
            });
            if let Some(next) = &cursor {
                body["start_cursor"] = json!(next);
            }

            let response = self
                .authorized(self.http.post(&url))
                .json(&body)
                .send()
                .await?;
            let page: QueryResponse = Self::check(response).await?.json().await?;
            for result in &page.results {
                let title = result.title();
                if needs_enrichment(&title) {
                    entries.push(DatabaseEntry::existing(result.id.clone(), title));
                } else {
                    debug!(page_id = %result.id, title = %title, "ignoring row without marker");
                }
            }

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        info!(count = entries.len(), "discovered rows awaiting enrichment");
        Ok(entries)
    }

    async fn patch_page(&self, page_id: &str, update: &PageUpdate) -> AppResult<()> {
        let url = format!("{}/pages/{}", self.base_url, page_id);
        let body = Value::Object(update.to_body());
        let response = self
            .authorized(self.http.patch(&url))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        info!(page_id, "updated database row");
        Ok(())
    }

    async fn create_page(&self, update: &PageUpdate) -> AppResult<String> {
        let url = format!("{}/pages", self.base_url);
        let mut body = update.to_body();
        body.insert("parent".into(), json!({"database_id": self.database_id}));
        body.insert("icon".into(), json!({"type": "emoji", "emoji": PAGE_ICON}));
        let response = self
            .authorized(self.http.post(&url))
            .json(&Value::Object(body))
            .send()
            .await?;
        let created: CreatedPage = Self::check(response).await?.json().await?;
        info!(page_id = %created.id, "created database row");
        Ok(created.id)
    }
}
