//! In-memory `Database` — same contract as the libSQL backend, for tests
//! and throwaway sessions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::store::traits::Database;

/// Settings kept as raw text in a map, so corrupt values can be planted.
#[derive(Default)]
pub struct MemoryDatabase {
    settings: Mutex<HashMap<(String, String), String>>,
    fail_writes: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `raw` verbatim, bypassing serialization.
    pub fn insert_raw(&self, user_id: &str, key: &str, raw: &str) {
        self.lock()
            .insert((user_id.to_string(), key.to_string()), raw.to_string());
    }

    /// Raw stored text, if any.
    pub fn raw(&self, user_id: &str, key: &str) -> Option<String> {
        self.lock()
            .get(&(user_id.to_string(), key.to_string()))
            .cloned()
    }

    /// Make every subsequent write fail (simulates a full or locked store).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), String>> {
        // A poisoned map still holds consistent strings.
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self, op: &str) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query(format!("{op}: writes disabled")));
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        Ok(self
            .raw(user_id, key)
            .map(|s| serde_json::from_str(&s).unwrap_or(serde_json::Value::Null)))
    }

    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        self.check_writable("set_setting")?;
        let raw = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.insert_raw(user_id, key, &raw);
        Ok(())
    }

    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError> {
        self.check_writable("delete_setting")?;
        Ok(self
            .lock()
            .remove(&(user_id.to_string(), key.to_string()))
            .is_some())
    }
}
