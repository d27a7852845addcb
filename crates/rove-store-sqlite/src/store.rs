//! [`SqliteDocumentStore`] — the SQLite implementation of [`DocumentStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use rove_core::document::{DocumentInfo, DocumentStore};
use tracing::debug;

use crate::{
  Error, Result,
  encode::{RawDocumentInfo, encode_dt},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Named documents kept as rows of a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteDocumentStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteDocumentStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteDocumentStore {
  type Error = Error;

  async fn load_document(&self, name: &str) -> Result<Option<Vec<u8>>> {
    let name = name.to_owned();

    let body: Option<Vec<u8>> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT body FROM documents WHERE name = ?1",
            rusqlite::params![name],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;

    Ok(body)
  }

  async fn save_document(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
    let name   = name.to_owned();
    let at_str = encode_dt(Utc::now());
    let size   = bytes.len();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (name, body, updated_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(name) DO UPDATE SET
             body       = excluded.body,
             updated_at = excluded.updated_at",
          rusqlite::params![name, bytes, at_str],
        )?;
        Ok(())
      })
      .await?;

    debug!(size, "wrote document row");
    Ok(())
  }

  async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
    let raws: Vec<RawDocumentInfo> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT name, length(body), updated_at FROM documents ORDER BY name",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawDocumentInfo {
              name:       row.get(0)?,
              size:       row.get(1)?,
              updated_at: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocumentInfo::into_info).collect()
  }

  async fn delete_document(&self, name: &str) -> Result<bool> {
    let name = name.to_owned();

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM documents WHERE name = ?1", rusqlite::params![name])?)
      })
      .await?;

    Ok(deleted > 0)
  }
}
