//! Error types for the signup wizard service.

use crate::wizard::model::SharingConnectionId;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Creation-time rule violations (sharing connections and the like).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("At least one sharing permission must be granted")]
    NoPermissions,

    #[error("Contact identifier {0:?} is not an email address or phone number")]
    InvalidContact(String),

    #[error("A sharing connection for {0} already exists")]
    DuplicateContact(String),
}

/// Step table lookups that fall outside the resolved branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("Step {index} is outside 1..={total}")]
    OutOfRange { index: i64, total: u32 },

    #[error("Step {index} belongs to the adult path but the record is on the youth path")]
    BranchViolation { index: u32 },
}

/// Session collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to establish session for {contact}: {reason}")]
    EstablishFailed { contact: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Orchestrator errors.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Input for {submitted} submitted while step {active} is active")]
    StepMismatch { submitted: String, active: String },

    #[error("Signup already finished")]
    AlreadyFinished,

    #[error("Sharing connections can only be edited on a sharing step")]
    NotOnSharingStep,

    #[error("Sharing connection {0} not found")]
    ConnectionNotFound(SharingConnectionId),

    #[error("Cannot finish without {0}")]
    MissingIdentity(&'static str),

    #[error("Cannot finish before the mandatory terms are accepted")]
    TermsNotAccepted,

    #[error("Invalid sharing connection: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}
