use std::io;

use thiserror::Error;
use trilan_core::auth::AuthError;
use trilan_core::config::ConfigError;
use trilan_core::mirror::MirrorError;
use trilan_core::{Collection, RecordId, SyncError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] trilan_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
    #[error(transparent)]
    CloudConfig(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Entry needs at least one of --traditional, --simplified, --english or --korean")]
    EmptyEntry,
    #[error("Edited entry cannot be empty")]
    EmptyEditedContent,
    #[error("Category name cannot be empty")]
    EmptyCategoryName,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("No {collection} entry with id {id}")]
    EntryNotFound {
        collection: Collection,
        id: RecordId,
    },
    #[error("No category with id {0}")]
    CategoryNotFound(RecordId),
    #[error(
        "Category {id} is for {}, not {expected}",
        actual.map_or("an unknown collection", Collection::as_str)
    )]
    CategoryKindMismatch {
        id: RecordId,
        expected: Collection,
        actual: Option<Collection>,
    },
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `trilan config init` + `trilan auth login`, or set TRILAN_FIREBASE_API_KEY and TRILAN_FIREBASE_PROJECT_ID."
    )]
    SyncNotConfigured,
}
