//! Database module: row models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: row slices read back from SQLite and their conversion into domain types.
//! - `repo`: SQL-only functions for the media mirror, link state and sync runs.
//!
//! External modules should import from `adlink::db`; the repository API is
//! re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{LinkRow, MediaUpsert, SyncRun, UpsertOutcome};
