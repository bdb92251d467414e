//! Error types for `simstore-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The document has no usable `session_metadata.session_id`.
  #[error("session_metadata.session_id missing")]
  MissingSessionId,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
