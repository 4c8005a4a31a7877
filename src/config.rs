use std::path::PathBuf;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_RUN_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_RUN_LOG_MAX_FILES: usize = 5;
const DEFAULT_PHOTO_MAX_WIDTH: u32 = 800;
const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
const DEFAULT_PIPELINE_BIN: &str = "gastropath";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub google_api_key: Option<SecretString>,
    pub yelp_api_key: Option<SecretString>,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_api_key: Option<SecretString>,
    pub cloudinary_api_secret: Option<SecretString>,
    pub notion_api_key: Option<SecretString>,
    pub notion_database_id: Option<String>,
    pub notion_version: String,
    pub google_places_api_base: String,
    pub yelp_api_base: String,
    pub cloudinary_api_base: String,
    pub notion_api_base: String,
    pub photo_max_width: u32,
    pub run_log_dir: PathBuf,
    pub run_log_max_bytes: u64,
    pub run_log_max_files: usize,
    pub trigger_bind_addr: String,
    pub trigger_shared_secret: Option<SecretString>,
    pub trigger_max_requests_per_sec: u32,
    pub pipeline_bin: PathBuf,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub notion_version: String,
    pub google_places_api_base: String,
    pub yelp_api_base: String,
    pub cloudinary_api_base: String,
    pub notion_api_base: String,
    pub photo_max_width: u32,
    pub run_log_dir: String,
    pub run_log_max_bytes: u64,
    pub run_log_max_files: usize,
    pub trigger_bind_addr: String,
    pub trigger_max_requests_per_sec: u32,
    pub pipeline_bin: String,
    pub has_google_api_key: bool,
    pub has_yelp_api_key: bool,
    pub has_cloudinary_credentials: bool,
    pub has_notion_api_key: bool,
    pub has_notion_database_id: bool,
    pub has_trigger_shared_secret: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            google_api_key: secret_var("GOOGLE_API_KEY"),
            yelp_api_key: secret_var("YELP_API_KEY"),
            cloudinary_cloud_name: plain_var("CLOUDINARY_CLOUD_NAME"),
            cloudinary_api_key: secret_var("CLOUDINARY_API_KEY"),
            cloudinary_api_secret: secret_var("CLOUDINARY_API_SECRET"),
            notion_api_key: secret_var("NOTION_API_KEY"),
            notion_database_id: plain_var("NOTION_DATABASE_ID"),
            notion_version: plain_var("NOTION_VERSION")
                .unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
            google_places_api_base: base_var(
                "GOOGLE_PLACES_API_BASE",
                "https://maps.googleapis.com/maps/api/place",
            ),
            yelp_api_base: base_var("YELP_API_BASE", "https://api.yelp.com/v3"),
            cloudinary_api_base: base_var("CLOUDINARY_API_BASE", "https://api.cloudinary.com/v1_1"),
            notion_api_base: base_var("NOTION_API_BASE", "https://api.notion.com/v1"),
            photo_max_width: parse_u32("PHOTO_MAX_WIDTH", DEFAULT_PHOTO_MAX_WIDTH).max(1),
            run_log_dir: plain_var("RUN_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            run_log_max_bytes: parse_u64("RUN_LOG_MAX_BYTES", DEFAULT_RUN_LOG_MAX_BYTES),
            run_log_max_files: parse_usize("RUN_LOG_MAX_FILES", DEFAULT_RUN_LOG_MAX_FILES).max(1),
            trigger_bind_addr: plain_var("TRIGGER_BIND_ADDR")
                .unwrap_or_else(|| "0.0.0.0:9999".to_string()),
            trigger_shared_secret: secret_var("TRIGGER_SHARED_SECRET"),
            trigger_max_requests_per_sec: parse_u32("TRIGGER_MAX_REQUESTS_PER_SEC", 5).max(1),
            pipeline_bin: plain_var("GASTROPATH_PIPELINE_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(default_pipeline_bin),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            notion_version: self.notion_version.clone(),
            google_places_api_base: self.google_places_api_base.clone(),
            yelp_api_base: self.yelp_api_base.clone(),
            cloudinary_api_base: self.cloudinary_api_base.clone(),
            notion_api_base: self.notion_api_base.clone(),
            photo_max_width: self.photo_max_width,
            run_log_dir: self.run_log_dir.to_string_lossy().to_string(),
            run_log_max_bytes: self.run_log_max_bytes,
            run_log_max_files: self.run_log_max_files,
            trigger_bind_addr: self.trigger_bind_addr.clone(),
            trigger_max_requests_per_sec: self.trigger_max_requests_per_sec,
            pipeline_bin: self.pipeline_bin.to_string_lossy().to_string(),
            has_google_api_key: self.google_api_key.is_some(),
            has_yelp_api_key: self.yelp_api_key.is_some(),
            has_cloudinary_credentials: self.cloudinary_cloud_name.is_some()
                && self.cloudinary_api_key.is_some()
                && self.cloudinary_api_secret.is_some(),
            has_notion_api_key: self.notion_api_key.is_some(),
            has_notion_database_id: self.notion_database_id.is_some(),
            has_trigger_shared_secret: self.trigger_shared_secret.is_some(),
        }
    }
}

fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

// The pipeline binary ships next to the server binary.
fn default_pipeline_bin() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_PIPELINE_BIN)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PIPELINE_BIN))
}

fn plain_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn secret_var(key: &str) -> Option<SecretString> {
    plain_var(key).map(SecretString::from)
}

fn base_var(key: &str, default: &str) -> String {
    plain_var(key)
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        google_api_key: Some(SecretString::from("google-key".to_string())),
        yelp_api_key: Some(SecretString::from("yelp-key".to_string())),
        cloudinary_cloud_name: Some("demo".into()),
        cloudinary_api_key: Some(SecretString::from("cloud-key".to_string())),
        cloudinary_api_secret: Some(SecretString::from("cloud-secret".to_string())),
        notion_api_key: Some(SecretString::from("notion-key".to_string())),
        notion_database_id: Some("db-123".into()),
        notion_version: DEFAULT_NOTION_VERSION.into(),
        google_places_api_base: "http://places.invalid".into(),
        yelp_api_base: "http://yelp.invalid".into(),
        cloudinary_api_base: "http://cloudinary.invalid".into(),
        notion_api_base: "http://notion.invalid".into(),
        photo_max_width: DEFAULT_PHOTO_MAX_WIDTH,
        run_log_dir: PathBuf::from("logs"),
        run_log_max_bytes: DEFAULT_RUN_LOG_MAX_BYTES,
        run_log_max_files: DEFAULT_RUN_LOG_MAX_FILES,
        trigger_bind_addr: "127.0.0.1:0".into(),
        trigger_shared_secret: Some(SecretString::from("trigger-secret".to_string())),
        trigger_max_requests_per_sec: 5,
        pipeline_bin: PathBuf::from("true"),
    }
}
