//! Backend-agnostic `Database` trait — the key/value settings surface the
//! wizard persists through.

use async_trait::async_trait;

use crate::error::DatabaseError;

/// Async key/value settings storage, scoped per user.
#[async_trait]
pub trait Database: Send + Sync {
    /// Create or migrate the schema.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Read a setting. Stored text that is not valid JSON reads back as
    /// `Value::Null` rather than an error.
    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Insert or replace a setting.
    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Delete a setting. Returns whether a row was removed.
    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError>;
}
