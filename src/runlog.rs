use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

#[cfg(test)]
use std::io;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::AppConfig;
#[cfg(test)]
use crate::errors::AppError;
use crate::errors::AppResult;

const RUN_LOG_FILE: &str = "gastropath-runs.jsonl";

#[derive(Clone)]
pub struct RunLog {
    run_id: String,
    path: PathBuf,
    max_file_bytes: u64,
    max_file_count: usize,
    write_lock: Arc<Mutex<()>>,
    #[cfg(test)]
    fault_injector: Option<Arc<TestFaultInjector>>,
}

#[derive(Debug, Serialize)]
pub struct RunEvent<'a> {
    pub run_id: &'a str,
    pub event: &'a str,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl RunLog {
    pub fn open<P: AsRef<Path>>(dir: P, config: &AppConfig) -> AppResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(RUN_LOG_FILE);
        OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            run_id: Utc::now().format("%Y%m%d%H%M%S%f").to_string(),
            path,
            max_file_bytes: config.run_log_max_bytes,
            max_file_count: config.run_log_max_files.max(1),
            write_lock: Arc::new(Mutex::new(())),
            #[cfg(test)]
            fault_injector: None,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &str, payload: Value) -> AppResult<()> {
        let line = serde_json::to_vec(&RunEvent {
            run_id: &self.run_id,
            event,
            timestamp: Utc::now(),
            payload,
        })?;

        let _guard = self.write_lock.lock();
        self.rotate_if_needed(line.len() as u64 + 1)?;
        #[cfg(test)]
        if self
            .fault_injector
            .as_ref()
            .map(|hooks| hooks.take_disk_full())
            .unwrap_or(false)
        {
            return Err(AppError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "simulated disk full",
            )));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }

    // Run-log trouble must never abort a run.
    pub fn record(&self, event: &str, payload: Value) {
        if let Err(err) = self.append(event, payload) {
            warn!(?err, event, "failed to append run log event");
        }
    }

    pub fn run_started(&self, mode: &str) {
        self.record("run_started", json!({ "mode": mode }));
    }

    pub fn field_updated(&self, entry: &str, field: &str, value: &str) {
        self.record(
            "field_updated",
            json!({ "entry": entry, "field": field, "value": value }),
        );
    }

    fn rotate_if_needed(&self, incoming_bytes: u64) -> AppResult<()> {
        let current_size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if current_size == 0 || current_size + incoming_bytes <= self.max_file_bytes {
            return Ok(());
        }

        if self.max_file_count <= 1 {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            return Ok(());
        }

        let rotated_name = format!(
            "{}-{}.jsonl",
            self.file_stem(),
            Utc::now().format("%Y%m%d%H%M%S%f")
        );
        let rotated_path = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(rotated_name);
        fs::rename(&self.path, &rotated_path)?;

        self.prune_rotations()?;
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(())
    }

    fn prune_rotations(&self) -> AppResult<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let prefix = format!("{}-", self.file_stem());
        let mut rotations = fs::read_dir(parent)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with(&prefix) && name.ends_with(".jsonl") {
                    Some((entry.path(), name))
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();

        // Timestamp suffixes sort chronologically.
        rotations.sort_by(|a, b| a.1.cmp(&b.1));
        let allowed = self.max_file_count.saturating_sub(1);
        if rotations.len() > allowed {
            let excess = rotations.len() - allowed;
            for (path, _) in rotations.into_iter().take(excess) {
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }

    fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "gastropath-runs".into())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct TestFaultInjector {
    disk_full: AtomicBool,
}

#[cfg(test)]
impl TestFaultInjector {
    pub fn fail_next_write(&self) {
        self.disk_full.store(true, Ordering::SeqCst);
    }

    fn take_disk_full(&self) -> bool {
        self.disk_full.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
impl RunLog {
    pub fn enable_test_hooks(&mut self) -> Arc<TestFaultInjector> {
        let hooks = Arc::new(TestFaultInjector::default());
        self.fault_injector = Some(hooks.clone());
        hooks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use tempfile::tempdir;

    fn read_events(log: &RunLog) -> Vec<Value> {
        fs::read_to_string(log.path())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn appends_events_with_run_id() {
        let dir = tempdir().unwrap();
        let log = RunLog::open(dir.path(), &test_config()).unwrap();
        log.run_started("batch");
        log.field_updated("Rose's Luxury", "City", "Washington");

        let events = read_events(&log);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "run_started");
        assert_eq!(events[0]["payload"]["mode"], "batch");
        assert_eq!(events[1]["payload"]["field"], "City");
        assert_eq!(events[1]["run_id"], log.run_id());
    }

    #[test]
    fn keeps_history_across_runs() {
        let dir = tempdir().unwrap();
        let config = test_config();
        RunLog::open(dir.path(), &config)
            .unwrap()
            .run_started("single");
        let second = RunLog::open(dir.path(), &config).unwrap();
        second.run_started("batch");

        assert_eq!(read_events(&second).len(), 2);
    }

    #[test]
    fn rotates_when_exceeding_capacity() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.run_log_max_bytes = 64;
        config.run_log_max_files = 2;
        let log = RunLog::open(dir.path(), &config).unwrap();
        for i in 0..4 {
            log.append(
                "big",
                json!({ "payload": "0123456789abcdef0123456789abcdef", "idx": i }),
            )
            .unwrap();
        }

        let rotated = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("gastropath-runs-")
            })
            .count();
        assert_eq!(rotated, 1);
        assert_eq!(read_events(&log).len(), 1);
    }

    #[test]
    fn write_failures_do_not_panic() {
        let dir = tempdir().unwrap();
        let mut log = RunLog::open(dir.path(), &test_config()).unwrap();
        let hooks = log.enable_test_hooks();
        hooks.fail_next_write();

        assert!(log.append("lost", json!({})).is_err());
        hooks.fail_next_write();
        log.record("lost", json!({}));
        log.record("kept", json!({}));

        let events = read_events(&log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"], "kept");
    }
}
