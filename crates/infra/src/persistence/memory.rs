//! In-memory usage store for embedding and tests

use async_trait::async_trait;
use parking_lot::Mutex;
use promptgate_core::UsageStore;
use promptgate_domain::{PersistenceError, PersistenceResult, UsageRecord};

#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    records: Mutex<Vec<UsageRecord>>,
    fail_saves: Mutex<u32>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records`
    pub fn with_records(records: Vec<UsageRecord>) -> Self {
        Self { records: Mutex::new(records), fail_saves: Mutex::new(0) }
    }

    /// Make the next `count` saves fail with a backend error
    pub fn fail_next_saves(&self, count: u32) {
        *self.fail_saves.lock() = count;
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<UsageRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn save(&self, records: &[UsageRecord]) -> PersistenceResult<()> {
        {
            let mut remaining = self.fail_saves.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PersistenceError::Backend("injected save failure".to_string()));
            }
        }
        self.records.lock().extend_from_slice(records);
        Ok(())
    }

    async fn load(&self) -> PersistenceResult<Vec<UsageRecord>> {
        Ok(self.snapshot())
    }
}
