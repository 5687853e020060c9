//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Domain constants for the signup rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardRules {
    /// Exact length of the verification code.
    pub code_len: usize,
    /// Minimum password length, in characters.
    pub min_password_len: usize,
    /// Users younger than this take the youth path.
    pub youth_age: i32,
}

impl Default for WizardRules {
    fn default() -> Self {
        Self {
            code_len: 5,
            min_password_len: 6,
            youth_age: 18,
        }
    }
}

/// Service configuration, read from `SIGNUP_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path of the libSQL database holding the in-progress record.
    pub db_path: PathBuf,
    /// HTTP port.
    pub port: u16,
    /// Settings owner for the in-progress record and the session.
    pub user_id: String,
    /// When set, logs are also written to a daily rolling file here.
    pub log_dir: Option<PathBuf>,
    /// Allow any origin (the wizard front end is served separately).
    pub cors_any: bool,
    pub rules: WizardRules,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/signup.db"),
            port: 8080,
            user_id: "default".to_string(),
            log_dir: None,
            cors_any: true,
            rules: WizardRules::default(),
        }
    }
}

impl ServiceConfig {
    /// Build from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match lookup("SIGNUP_PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "SIGNUP_PORT".to_string(),
                message: format!("{raw:?}: {e}"),
            })?,
            None => defaults.port,
        };

        let cors_any = match lookup("SIGNUP_CORS_ANY") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "SIGNUP_CORS_ANY".to_string(),
                message: format!("{raw:?} is not a boolean"),
            })?,
            None => defaults.cors_any,
        };

        let user_id = lookup("SIGNUP_USER_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.user_id);

        Ok(Self {
            db_path: lookup("SIGNUP_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            port,
            user_id,
            log_dir: lookup("SIGNUP_LOG_DIR").map(PathBuf::from),
            cors_any,
            rules: defaults.rules,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
