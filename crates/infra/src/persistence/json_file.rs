//! JSON-lines usage store
//!
//! One [`UsageRecord`] per line, appended on save. A torn final line left by
//! a crash is skipped on load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use promptgate_core::UsageStore;
use promptgate_domain::{PersistenceError, PersistenceResult, UsageRecord};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Append-only file store
#[derive(Debug)]
pub struct JsonLinesUsageStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl UsageStore for JsonLinesUsageStore {
    #[instrument(skip(self, records), fields(path = %self.path.display(), count = records.len()))]
    async fn save(&self, records: &[UsageRecord]) -> PersistenceResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buffer = Vec::with_capacity(records.len() * 256);
        for record in records {
            serde_json::to_writer(&mut buffer, record)
                .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
            buffer.push(b'\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error)?;
        file.write_all(&buffer).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;

        debug!("usage_records_saved");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> PersistenceResult<Vec<UsageRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };

        let mut records = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<UsageRecord>(line) {
                Ok(record) => records.push(record),
                Err(error) => warn!(line = index + 1, error = %error, "usage_record_skipped"),
            }
        }

        debug!(count = records.len(), "usage_records_loaded");
        Ok(records)
    }
}

fn io_error(error: std::io::Error) -> PersistenceError {
    PersistenceError::Io(error.to_string())
}
