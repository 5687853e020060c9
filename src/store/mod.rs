//! Persistence layer — settings storage and the in-progress signup record.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod records;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryDatabase;
pub use records::{RecordStore, SettingsRecordStore};
pub use traits::Database;
