//! Error types for `rove-core`.

use thiserror::Error;

/// A type-erased backend error, carried inside [`Error::LoadFailed`] and
/// [`Error::SaveFailed`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// The backend could not read the document. Stores recover from this by
  /// starting empty in degraded mode.
  #[error("failed to load document {document:?}: {source}")]
  LoadFailed {
    document: String,
    #[source]
    source:   BoxError,
  },

  /// The document was read but its envelope does not decode, or it was
  /// written by a newer format version. Stores start empty and read-only so
  /// the document is never overwritten without an explicit reset.
  #[error("document {document:?} is unreadable: {source}")]
  Unreadable {
    document: String,
    #[source]
    source:   BoxError,
  },

  /// The document could not be written. The in-memory state is kept.
  #[error("failed to save document {document:?}: {source}")]
  SaveFailed {
    document: String,
    #[source]
    source:   BoxError,
  },

  #[error("unsupported document version {found} (newest supported is {supported})")]
  UnsupportedVersion { found: u32, supported: u32 },

  #[error("malformed record at position {position}: {reason}")]
  MalformedRecord { position: usize, reason: String },

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("message {0:?} is already linked")]
  MessageAlreadyLinked(String),

  #[error("store is not initialised")]
  NotReady,

  #[error("document {0:?} could not be read; reset the store before writing")]
  ReadOnly(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn is_load_failure(&self) -> bool {
    matches!(self, Self::LoadFailed { .. } | Self::Unreadable { .. })
  }

  pub fn is_save_failure(&self) -> bool { matches!(self, Self::SaveFailed { .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reject blank identifiers at the public-method boundary.
pub(crate) fn require_key(what: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::InvalidInput(format!("{what} must not be empty")));
  }
  Ok(())
}
