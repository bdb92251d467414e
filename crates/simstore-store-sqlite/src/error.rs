//! Error type for `simstore-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] simstore_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// Raised on the synchronous rebuild path, which bypasses the async
  /// connection.
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// A rebuild refused to start or to publish its result.
  #[error("precondition failed: {0}")]
  Precondition(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
