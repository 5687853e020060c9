//! Durable in-progress signup record — load, merge, clear.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::DatabaseError;
use crate::store::traits::Database;
use crate::wizard::model::{SignupPatch, SignupRecord, settings_keys};

/// Repository for the accumulating signup record.
///
/// Implementations keep an in-memory copy that never disagrees with the
/// durable one: a merge either persists and updates both, or neither.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the durable record, replacing the in-memory copy. Absent or
    /// malformed data yields the default record.
    async fn load(&self) -> SignupRecord;

    /// The in-memory record, without touching storage.
    async fn current(&self) -> SignupRecord;

    /// Shallow-merge `patch` and persist the whole record before returning.
    async fn merge(&self, patch: SignupPatch) -> Result<SignupRecord, DatabaseError>;

    /// Remove the durable record and reset the in-memory one.
    async fn clear(&self) -> Result<(), DatabaseError>;
}

/// [`RecordStore`] over the `settings` table, one key per user.
pub struct SettingsRecordStore {
    db: Arc<dyn Database>,
    user_id: String,
    record: Mutex<SignupRecord>,
}

impl SettingsRecordStore {
    pub fn new(db: Arc<dyn Database>, user_id: impl Into<String>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
            record: Mutex::new(SignupRecord::default()),
        }
    }

    async fn read_durable(&self) -> SignupRecord {
        let stored = match self
            .db
            .get_setting(&self.user_id, settings_keys::SIGNUP_FORM_DATA)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Failed to read signup record, starting fresh: {}", e);
                return SignupRecord::default();
            }
        };

        match stored {
            None => SignupRecord::default(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!(
                    user_id = %self.user_id,
                    "Discarding malformed signup record: {}",
                    e
                );
                SignupRecord::default()
            }),
        }
    }
}

#[async_trait]
impl RecordStore for SettingsRecordStore {
    async fn load(&self) -> SignupRecord {
        let mut guard = self.record.lock().await;
        *guard = self.read_durable().await;
        guard.clone()
    }

    async fn current(&self) -> SignupRecord {
        self.record.lock().await.clone()
    }

    async fn merge(&self, patch: SignupPatch) -> Result<SignupRecord, DatabaseError> {
        // Held across persist so concurrent merges apply one after another.
        let mut guard = self.record.lock().await;
        if patch.is_empty() {
            return Ok(guard.clone());
        }

        let mut next = guard.clone();
        patch.apply_to(&mut next);

        let value = serde_json::to_value(&next)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.db
            .set_setting(&self.user_id, settings_keys::SIGNUP_FORM_DATA, &value)
            .await?;

        tracing::debug!(user_id = %self.user_id, "Signup record persisted");
        *guard = next;
        Ok(guard.clone())
    }

    async fn clear(&self) -> Result<(), DatabaseError> {
        let mut guard = self.record.lock().await;
        self.db
            .delete_setting(&self.user_id, settings_keys::SIGNUP_FORM_DATA)
            .await?;
        *guard = SignupRecord::default();
        Ok(())
    }
}
