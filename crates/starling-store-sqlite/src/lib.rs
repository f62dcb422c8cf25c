//! SQLite backend for the Starling warehouse and staging tables.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod schema;
mod staging;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use staging::SqliteStaging;
pub use store::{RunRecord, SqliteWarehouse};
