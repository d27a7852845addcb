//! Conversions between Rust values and the plain-text representations stored
//! in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings.

use chrono::{DateTime, Utc};
use rove_core::document::DocumentInfo;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from a `documents` listing query.
pub struct RawDocumentInfo {
  pub name:       String,
  pub size:       i64,
  pub updated_at: String,
}

impl RawDocumentInfo {
  pub fn into_info(self) -> Result<DocumentInfo> {
    let size = usize::try_from(self.size)
      .map_err(|_| Error::InvalidSize { name: self.name.clone(), size: self.size })?;
    Ok(DocumentInfo {
      name: self.name,
      size,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_roundtrip_through_rfc3339() {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
    assert_eq!(decode_dt(&encode_dt(at)).unwrap(), at);
  }

  #[test]
  fn bad_timestamp_is_a_parse_error() {
    assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
  }

  #[test]
  fn negative_size_is_rejected() {
    let raw = RawDocumentInfo {
      name:       "tags.json".into(),
      size:       -1,
      updated_at: "2024-05-01T10:30:00+00:00".into(),
    };
    assert!(matches!(raw.into_info(), Err(Error::InvalidSize { .. })));
  }
}
