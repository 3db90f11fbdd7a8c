//! Data layer module
//!
//! Handles all data persistence:
//! - Storage Port trait
//! - SQLite backend
//! - In-memory backend
//! - Startup connection retry

mod database;
mod memory;
mod models;
mod retry;
mod storage;

pub use database::SqliteStorage;
pub use memory::MemoryStorage;
pub use models::*;
pub use retry::connect_with_retry;
#[cfg(test)]
pub use storage::MockStorage;
pub use storage::Storage;

#[cfg(test)]
mod database_test;
