//! SQL schema for the Rove document store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision for future migrations.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per named document. The body is opaque to the database; it is
-- always rewritten whole.
CREATE TABLE IF NOT EXISTS documents (
    name        TEXT PRIMARY KEY,
    body        BLOB NOT NULL,
    updated_at  TEXT NOT NULL    -- ISO 8601 UTC
);

PRAGMA user_version = 1;
";
