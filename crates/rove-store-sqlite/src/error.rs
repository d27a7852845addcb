//! Error type for `rove-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("document {name:?} has an invalid size {size}")]
  InvalidSize { name: String, size: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
