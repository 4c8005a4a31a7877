use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::cuisine::{CuisineLookup, YelpClient};
use crate::errors::{AppError, AppResult};
use crate::model::DatabaseEntry;
use crate::notion::{DatabaseSync, NotionClient, PageUpdate, SyncAction};
use crate::photos::{CloudinaryClient, ImageHost, PhotoRelay};
use crate::places::{GooglePlacesClient, PlaceNormalizer};
use crate::resolver::{HttpLinkExpander, IdentifierResolver};
use crate::runlog::RunLog;

const USER_AGENT: &str = concat!("gastropath/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStage {
    Pending,
    Resolving,
    Detailing,
    Uploading,
    Classifying,
    Syncing,
    Done,
    Failed,
}

impl EntryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStage::Pending => "pending",
            EntryStage::Resolving => "resolving",
            EntryStage::Detailing => "detailing",
            EntryStage::Uploading => "uploading",
            EntryStage::Classifying => "classifying",
            EntryStage::Syncing => "syncing",
            EntryStage::Done => "done",
            EntryStage::Failed => "failed",
        }
    }
}

#[derive(Debug)]
pub struct EntryFailure {
    pub stage: EntryStage,
    pub error: AppError,
}

impl EntryFailure {
    fn at(stage: EntryStage, error: AppError) -> Self {
        Self { stage, error }
    }

    pub fn is_skip(&self) -> bool {
        self.stage == EntryStage::Resolving
    }
}

impl fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage.as_str(), self.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub discovered: usize,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct Pipeline {
    resolver: IdentifierResolver,
    normalizer: PlaceNormalizer,
    photos: PhotoRelay,
    cuisine: CuisineLookup,
    sync: DatabaseSync,
    run_log: RunLog,
}

impl Pipeline {
    pub fn new(
        resolver: IdentifierResolver,
        normalizer: PlaceNormalizer,
        photos: PhotoRelay,
        cuisine: CuisineLookup,
        sync: DatabaseSync,
        run_log: RunLog,
    ) -> Self {
        Self {
            resolver,
            normalizer,
            photos,
            cuisine,
            sync,
            run_log,
        }
    }

    pub fn from_config(config: &AppConfig, run_log: RunLog) -> AppResult<Self> {
        let google_key = config
            .google_api_key
            .clone()
            .ok_or_else(|| AppError::Config("GOOGLE_API_KEY must be set".into()))?;
        let notion_key = config
            .notion_api_key
            .clone()
            .ok_or_else(|| AppError::Config("NOTION_API_KEY must be set".into()))?;
        let database_id = config
            .notion_database_id
            .clone()
            .ok_or_else(|| AppError::Config("NOTION_DATABASE_ID must be set".into()))?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let places = Arc::new(GooglePlacesClient::new(
            http.clone(),
            google_key,
            &config.google_places_api_base,
            config.photo_max_width,
        ));

        let image_host: Option<Arc<dyn ImageHost>> = match (
            config.cloudinary_cloud_name.clone(),
            config.cloudinary_api_key.clone(),
            config.cloudinary_api_secret.clone(),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(Arc::new(
                CloudinaryClient::new(
                    http.clone(),
                    cloud_name,
                    api_key,
                    api_secret,
                    &config.cloudinary_api_base,
                ),
            ) as Arc<dyn ImageHost>),
            _ => {
                warn!("cloudinary credentials missing; cover images disabled");
                None
            }
        };

        let cuisine = match config.yelp_api_key.clone() {
            Some(key) => CuisineLookup::new(Arc::new(YelpClient::new(
                http.clone(),
                key,
                &config.yelp_api_base,
            ))),
            None => {
                warn!("YELP_API_KEY missing; cuisine lookup disabled");
                CuisineLookup::disabled()
            }
        };

        let notion = NotionClient::new(
            http.clone(),
            notion_key,
            database_id,
            config.notion_version.clone(),
            &config.notion_api_base,
        );

        Ok(Self::new(
            IdentifierResolver::new(Arc::new(HttpLinkExpander::new(http))),
            PlaceNormalizer::new(places.clone()),
            PhotoRelay::new(places, image_host),
            cuisine,
            DatabaseSync::new(Arc::new(notion)),
            run_log,
        ))
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    pub async fn run_batch(&self) -> AppResult<BatchReport> {
        self.run_log.run_started("batch");
        let entries = match self.sync.pending_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                self.run_log
                    .record("run_aborted", json!({ "reason": err.to_string() }));
                return Err(err);
            }
        };

        let mut report = BatchReport {
            discovered: entries.len(),
            ..BatchReport::default()
        };
        for entry in &entries {
            match self.process_entry(entry).await {
                Ok(_) => report.done += 1,
                Err(failure) if failure.is_skip() => report.skipped += 1,
                Err(_) => report.failed += 1,
            }
        }

        info!(
            discovered = report.discovered,
            done = report.done,
            failed = report.failed,
            skipped = report.skipped,
            "batch run complete"
        );
        self.run_log.record("run_completed", json!(report));
        Ok(report)
    }

    pub async fn run_single(&self, input: &str) -> AppResult<SyncAction> {
        self.run_log.run_started("single");
        let entry = DatabaseEntry::new_row(input.trim());
        let result = self.process_entry(&entry).await;
        self.run_log.record(
            "run_completed",
            json!({ "input": input, "success": result.is_ok() }),
        );
        result.map_err(|failure| failure.error)
    }

    pub async fn process_entry(&self, entry: &DatabaseEntry) -> Result<SyncAction, EntryFailure> {
        let identifier = entry.lookup_identifier();
        self.run_log.record(
            "entry_started",
            json!({ "entry": identifier, "target": entry.target.to_string() }),
        );

        let result = self.drive(entry, identifier).await;
        match &result {
            Ok(action) => {
                info!(entry = %identifier, action = action.as_str(), "entry enriched");
                self.run_log.record(
                    "entry_finished",
                    json!({ "entry": identifier, "outcome": EntryStage::Done, "action": action.as_str() }),
                );
            }
            Err(failure) => {
                let outcome = if failure.is_skip() {
                    "skipped"
                } else {
                    EntryStage::Failed.as_str()
                };
                warn!(
                    entry = %identifier,
                    stage = failure.stage.as_str(),
                    err = %failure.error,
                    "entry {}",
                    outcome
                );
                self.run_log.record(
                    "entry_finished",
                    json!({
                        "entry": identifier,
                        "outcome": outcome,
                        "stage": failure.stage,
                        "reason": failure.error.to_string(),
                    }),
                );
            }
        }
        result
    }

    async fn drive(
        &self,
        entry: &DatabaseEntry,
        identifier: &str,
    ) -> Result<SyncAction, EntryFailure> {
        let mut stage = EntryStage::Pending;

        advance(&mut stage, EntryStage::Resolving, identifier);
        let lookup = self
            .resolver
            .resolve(identifier)
            .await
            .map_err(|err| EntryFailure::at(stage, err))?;

        advance(&mut stage, EntryStage::Detailing, identifier);
        let mut record = self
            .normalizer
            .lookup(&lookup, identifier)
            .await
            .map_err(|err| EntryFailure::at(stage, err))?;

        advance(&mut stage, EntryStage::Uploading, identifier);
        let photo_reference = record.photo_reference.take();
        let cover = self
            .photos
            .relay(photo_reference.as_deref(), &record.name)
            .await;

        advance(&mut stage, EntryStage::Classifying, identifier);
        let cuisine = self
            .cuisine
            .lookup(&record.name, record.city_or_placeholder())
            .await;
        let record = record.with_cuisine(cuisine);

        advance(&mut stage, EntryStage::Syncing, identifier);
        let update = PageUpdate::from_record(&record, cover);
        let action = self
            .sync
            .sync(&entry.target, &update)
            .await
            .map_err(|err| EntryFailure::at(stage, err))?;

        for (field, value) in &update.properties {
            self.run_log.field_updated(identifier, field, value.text());
        }
        if let Some(cover) = &update.cover {
            self.run_log.field_updated(identifier, "cover", cover);
        }
        advance(&mut stage, EntryStage::Done, identifier);
        Ok(action)
    }
}

fn advance(stage: &mut EntryStage, next: EntryStage, identifier: &str) {
    debug!(
        entry = %identifier,
        from = stage.as_str(),
        to = next.as_str(),
        "entry stage transition"
    );
    *stage = next;
}
