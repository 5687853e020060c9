//! Signup Wizard — resumable multi-step account creation service.

pub mod config;
pub mod error;
pub mod store;
pub mod wizard;
