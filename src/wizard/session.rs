//! Session hand-off — the collaborator that takes over once signup finishes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::store::Database;

use super::model::settings_keys;

/// Who just signed up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub name: String,
    pub contact: String,
}

/// Establishes the authenticated session for a finished signup. Called
/// exactly once per completed wizard.
#[async_trait]
pub trait SessionEstablisher: Send + Sync {
    async fn establish_session(&self, identity: &SessionIdentity) -> Result<(), SessionError>;
}

/// Persisted session marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(flatten)]
    pub identity: SessionIdentity,
    pub established_at: DateTime<Utc>,
}

/// Writes the identity to the `session` settings key, where the main
/// application picks it up.
pub struct SettingsSession {
    db: Arc<dyn Database>,
    user_id: String,
}

impl SettingsSession {
    pub fn new(db: Arc<dyn Database>, user_id: impl Into<String>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
        }
    }

    /// The stored session, if signup has completed.
    pub async fn current(&self) -> Result<Option<StoredSession>, SessionError> {
        let value = self.db.get_setting(&self.user_id, settings_keys::SESSION).await?;
        Ok(value.and_then(|v| serde_json::from_value(v).ok()))
    }
}

#[async_trait]
impl SessionEstablisher for SettingsSession {
    async fn establish_session(&self, identity: &SessionIdentity) -> Result<(), SessionError> {
        let stored = StoredSession {
            identity: identity.clone(),
            established_at: Utc::now(),
        };
        let value = serde_json::to_value(&stored).map_err(|e| SessionError::EstablishFailed {
            contact: identity.contact.clone(),
            reason: e.to_string(),
        })?;
        self.db
            .set_setting(&self.user_id, settings_keys::SESSION, &value)
            .await?;
        tracing::info!(contact = %identity.contact, "Session established");
        Ok(())
    }
}

/// Remembers every identity it is handed. Useful in tests.
#[derive(Default)]
pub struct RecordingSession {
    established: Mutex<Vec<SessionIdentity>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn established(&self) -> Vec<SessionIdentity> {
        self.established
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionEstablisher for RecordingSession {
    async fn establish_session(&self, identity: &SessionIdentity) -> Result<(), SessionError> {
        self.established
            .lock()
            .map_err(|e| SessionError::EstablishFailed {
                contact: identity.contact.clone(),
                reason: e.to_string(),
            })?
            .push(identity.clone());
        Ok(())
    }
}
