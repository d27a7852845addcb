//! Core types and the relationship index engine for Rove.
//!
//! Two stores are built on one generic engine: [`tags::TagStore`] maps content
//! to theme tags, [`links::LinkStore`] maps conversation sessions and messages
//! to content. Both persist through the [`document::DocumentStore`] trait and
//! are free of database dependencies; backends live in their own crates.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod document;
pub mod error;
pub mod index;
pub mod links;
pub mod observe;
pub mod persist;
pub mod record;
mod repository;
pub mod tags;

pub use error::{Error, Result};
pub use repository::InitReport;

#[cfg(test)]
mod tests;
