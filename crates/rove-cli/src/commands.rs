//! Subcommands and their dispatch onto the two stores.
//!
//! Every command opens only the store it needs, runs one operation, and
//! returns a JSON value for `main` to print.

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use rove_core::{
  document::DocumentStore,
  index::Upsert,
  links::LinkStore,
  record::{NewLink, RecordId, SubjectKey},
  tags::TagStore,
  InitReport,
};
use rove_store_sqlite::SqliteDocumentStore;
use serde_json::{Value, json};
use tracing::warn;

use crate::settings::RoveConfig;

// ─── CLI shape ────────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Theme tags on content.
  #[command(subcommand)]
  Tags(TagCommand),
  /// Conversation sessions linked to content.
  #[command(subcommand)]
  Links(LinkCommand),
  /// Raw documents in the store.
  #[command(subcommand)]
  Documents(DocumentCommand),
}

#[derive(Subcommand, Debug)]
pub enum TagCommand {
  /// Replace a subject's tags (e.g. `assign post:42 beach food`).
  Assign {
    subject: String,
    #[arg(required = true)]
    tags:    Vec<String>,
  },
  /// Give several subjects the same tags with a single save.
  Batch {
    #[arg(short, long = "subject", required = true)]
    subjects: Vec<String>,
    #[arg(short, long = "tag", required = true)]
    tags:     Vec<String>,
  },
  /// Add tags, keeping the existing ones.
  Add {
    subject: String,
    #[arg(required = true)]
    tags:    Vec<String>,
  },
  /// Remove tags from a subject.
  Remove {
    subject: String,
    #[arg(required = true)]
    tags:    Vec<String>,
  },
  /// Drop every tag of a deleted subject.
  Forget { subject: String },
  /// Show a subject's tags.
  Show { subject: String },
  /// List subjects carrying a tag.
  Subjects { tag: String },
  /// Delete a tag from every subject.
  Delete { tag: String },
  /// Count subjects per tag.
  Counts,
  /// Drop every tag record and rewrite the document empty.
  Reset,
}

#[derive(Subcommand, Debug)]
pub enum LinkCommand {
  /// Link a session to content from a message.
  Add {
    #[arg(long)]
    session:      String,
    #[arg(long)]
    message:      String,
    #[arg(long)]
    content_type: String,
    #[arg(long)]
    content_id:   String,
    #[arg(long)]
    title:        Option<String>,
  },
  /// Links of one session.
  Session { session: String },
  /// Links and sessions of one piece of content.
  Content { content_type: String, content_id: String },
  /// The link created by a message.
  Message { message: String },
  /// Sessions with at least one link.
  Sessions,
  /// Remove one link by id.
  Remove { id: RecordId },
  /// Remove the link created by a message.
  RemoveMessage { message: String },
  /// Remove every link of a session.
  RemoveSession { session: String },
  /// Remove every link pointing at a piece of content.
  RemoveContent { content_type: String, content_id: String },
  /// Drop every link and rewrite the document empty.
  Reset,
}

#[derive(Subcommand, Debug)]
pub enum DocumentCommand {
  List,
  Delete { name: String },
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

pub async fn run(
  command: Command,
  backend: Arc<SqliteDocumentStore>,
  config: &RoveConfig,
  actor: &str,
) -> Result<Value> {
  match command {
    Command::Tags(cmd) => run_tags(cmd, backend, config, actor).await,
    Command::Links(cmd) => run_links(cmd, backend, config, actor).await,
    Command::Documents(cmd) => run_documents(cmd, &backend).await,
  }
}

async fn run_tags(
  cmd: TagCommand,
  backend: Arc<SqliteDocumentStore>,
  config: &RoveConfig,
  actor: &str,
) -> Result<Value> {
  let mut store = TagStore::new(backend, config.tags_document.clone());
  report_offline(&store.init().await, &config.tags_document);

  let out = match cmd {
    TagCommand::Assign { subject, tags } => {
      change(&store.assign(&SubjectKey::from(subject), tags, actor).await?)
    }
    TagCommand::Batch { subjects, tags } => {
      let subjects: Vec<SubjectKey> = subjects.into_iter().map(SubjectKey::from).collect();
      let changes = store.assign_batch(&subjects, tags, actor).await?;
      Value::Array(changes.iter().map(change).collect())
    }
    TagCommand::Add { subject, tags } => {
      change(&store.add_tags(&SubjectKey::from(subject), tags, actor).await?)
    }
    TagCommand::Remove { subject, tags } => {
      change(&store.remove_tags(&SubjectKey::from(subject), tags).await?)
    }
    TagCommand::Forget { subject } => {
      json!({ "removed": store.remove_subject(&SubjectKey::from(subject)).await? })
    }
    TagCommand::Show { subject } => json!(store.record_for(&SubjectKey::from(subject))),
    TagCommand::Subjects { tag } => json!(store.subjects_for(&tag)),
    TagCommand::Delete { tag } => {
      json!({ "tag": tag, "affected": store.delete_tag_cascade(&tag).await? })
    }
    TagCommand::Counts => json!(store.tag_counts()),
    TagCommand::Reset => {
      store.reset().await?;
      json!({ "reset": config.tags_document })
    }
  };

  store.dispose();
  Ok(out)
}

async fn run_links(
  cmd: LinkCommand,
  backend: Arc<SqliteDocumentStore>,
  config: &RoveConfig,
  actor: &str,
) -> Result<Value> {
  let mut store = LinkStore::new(backend, config.links_document.clone());
  report_offline(&store.init().await, &config.links_document);

  let out = match cmd {
    LinkCommand::Add { session, message, content_type, content_id, title } => {
      let mut input = NewLink::new(session, message, content_type, content_id, actor);
      input.content_title = title;
      json!(store.add_link(input).await?)
    }
    LinkCommand::Session { session } => json!(store.links_for_session(&session)),
    LinkCommand::Content { content_type, content_id } => json!({
      "links":    store.links_for_content(&content_type, &content_id),
      "sessions": store.sessions_for_content(&content_type, &content_id),
    }),
    LinkCommand::Message { message } => json!(store.link_for_message(&message)),
    LinkCommand::Sessions => json!(store.session_ids()),
    LinkCommand::Remove { id } => json!({ "removed": store.remove_link(id).await? }),
    LinkCommand::RemoveMessage { message } => {
      json!({ "removed": store.remove_links_for_message(&message).await? })
    }
    LinkCommand::RemoveSession { session } => {
      json!({ "removed": store.remove_links_for_session(&session).await? })
    }
    LinkCommand::RemoveContent { content_type, content_id } => json!({
      "removed": store.remove_links_for_content(&content_type, &content_id).await?,
    }),
    LinkCommand::Reset => {
      store.reset().await?;
      json!({ "reset": config.links_document })
    }
  };

  store.dispose();
  Ok(out)
}

async fn run_documents(cmd: DocumentCommand, backend: &SqliteDocumentStore) -> Result<Value> {
  Ok(match cmd {
    DocumentCommand::List => json!(backend.list_documents().await?),
    DocumentCommand::Delete { name } => {
      json!({ "name": name, "deleted": backend.delete_document(&name).await? })
    }
  })
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn report_offline(report: &InitReport, document: &str) {
  if report.read_only {
    warn!(document, "document is unreadable: run `reset` to discard it before making changes");
  } else if report.degraded {
    warn!(document, "running offline: changes will not be saved until the store is reachable");
  }
}

fn change(upsert: &Upsert) -> Value {
  json!({
    "record_id": upsert.record_id,
    "added":     upsert.added,
    "removed":   upsert.removed,
  })
}
