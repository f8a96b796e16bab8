//! # courrier-store
//!
//! Durable persistence for chat messages and attachment blobs, backed by
//! SQLite. The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed helpers for the two record kinds.
//!
//! The store is the durability mechanism of the whole system: a record
//! inserted here is immediately visible to subsequent reads in the same
//! process, and nothing in the core ever updates or deletes it.

pub mod attachments;
pub mod database;
pub mod messages;
pub mod migrations;

mod error;

pub use database::Database;
pub use error::StoreError;
