//! trilan-core - Core library for Trilan
//!
//! This crate contains the glossary models, the durable local store, and the
//! optional cloud sync (identity provider, remote mirror, sync coordinator)
//! shared by every Trilan client.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod mirror;
pub mod models;
pub mod search;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use db::{ChangeListener, LocalStore, StoreStats};
pub use error::{Error, Result};
pub use models::{
    Category, CategoryKind, Collection, Document, EntryPatch, GlossaryEntry, NewCategory,
    NewEntry, RecordId,
};
pub use sync::{Reconciliation, SyncCoordinator, SyncError, SyncOptions, SyncPhase, SyncStatus};
