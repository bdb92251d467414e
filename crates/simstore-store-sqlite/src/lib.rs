//! SQLite backend for the simstore session store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The normalization pass and the schema
//! manager are plain synchronous functions over a [`rusqlite::Connection`],
//! shared by [`SqliteStore`] and the offline [`rebuild`](rebuild::rebuild)
//! driver.

mod encode;
mod project;
mod session;
mod store;

pub mod error;
pub mod normalize;
pub mod rebuild;
pub mod schema;

pub use error::{Error, Result};
pub use rebuild::{RebuildReport, rebuild};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
