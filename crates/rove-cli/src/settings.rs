//! Runtime configuration, layered from an optional TOML file and `ROVE_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rove_core::{links, tags};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoveConfig {
  /// SQLite file holding every document. `~` is expanded.
  pub store_path:     PathBuf,
  /// Recorded as the actor on every change.
  pub actor:          String,
  pub tags_document:  String,
  pub links_document: String,
}

impl Default for RoveConfig {
  fn default() -> Self {
    Self {
      store_path:     PathBuf::from("~/.local/share/rove/rove.sqlite3"),
      actor:          "me".into(),
      tags_document:  tags::DEFAULT_DOCUMENT.into(),
      links_document: links::DEFAULT_DOCUMENT.into(),
    }
  }
}

/// Read `path` (if present) under `ROVE_`-prefixed environment overrides.
pub fn load(path: &Path) -> anyhow::Result<RoveConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path.to_path_buf()).required(false))
    .add_source(config::Environment::with_prefix("ROVE"))
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise RoveConfig")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = load(Path::new("/nonexistent/rove-config.toml")).unwrap();
    assert_eq!(cfg.tags_document, tags::DEFAULT_DOCUMENT);
    assert_eq!(cfg.links_document, links::DEFAULT_DOCUMENT);
  }

  #[test]
  fn file_values_override_defaults() {
    let path = std::env::temp_dir()
      .join(format!("rove-settings-{}.toml", std::process::id()));
    std::fs::write(&path, "store_path = \"/tmp/rove.db\"\ntags_document = \"themes.json\"\n")
      .unwrap();

    let cfg = load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(cfg.store_path, PathBuf::from("/tmp/rove.db"));
    assert_eq!(cfg.tags_document, "themes.json");
    assert_eq!(cfg.links_document, links::DEFAULT_DOCUMENT);
  }

  #[test]
  fn plain_paths_are_not_expanded() {
    assert_eq!(expand_tilde(Path::new("/var/rove.db")), PathBuf::from("/var/rove.db"));
    assert_eq!(expand_tilde(Path::new("rove.db")), PathBuf::from("rove.db"));
  }
}
