//! `rove` — command-line access to the tag and session-link stores.
//!
//! Reads `rove.toml` (or the path given with `--config`), opens the SQLite
//! document store, runs one command, and prints its result as JSON.
//!
//! # Usage
//!
//! ```
//! rove tags assign post:42 beach food
//! rove tags subjects beach
//! rove links add --session S1 --message M1 --content-type photo --content-id P1
//! rove links content photo P1
//! ```

mod commands;
mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use commands::Command;
use rove_store_sqlite::SqliteDocumentStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Theme tags and session links for the travel archive")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "rove.toml")]
  config: PathBuf,

  /// Who is making the change; overrides `actor` from the config.
  #[arg(long)]
  actor: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr; stdout carries the JSON result.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let config = settings::load(&cli.config)?;
  let actor = cli.actor.unwrap_or_else(|| config.actor.clone());

  let store_path = settings::expand_tilde(&config.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let backend = SqliteDocumentStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  tracing::debug!(store = ?store_path, %actor, "store opened");

  let output = commands::run(cli.command, Arc::new(backend), &config, &actor).await?;
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}
