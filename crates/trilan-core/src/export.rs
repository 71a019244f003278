//! Backup export and import shared by every client.
//!
//! A backup is a single JSON object holding the three collections verbatim
//! plus the time it was taken. Import is all-or-nothing.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::models::{find_duplicate_id, Collection, Document};

/// Full snapshot of the local glossary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub categories: Vec<Document>,
    pub dictionary: Vec<Document>,
    pub phrases: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
}

impl Backup {
    #[must_use]
    pub fn collection(&self, collection: Collection) -> &[Document] {
        match collection {
            Collection::Categories => &self.categories,
            Collection::Dictionary => &self.dictionary,
            Collection::Phrases => &self.phrases,
        }
    }

    fn validate(&self) -> Result<()> {
        for collection in Collection::ALL {
            if let Some(id) = find_duplicate_id(self.collection(collection)) {
                return Err(Error::Validation(format!(
                    "'{collection}' contains id {id} more than once"
                )));
            }
        }
        Ok(())
    }

    fn into_sets(self) -> Vec<(Collection, Vec<Document>)> {
        vec![
            (Collection::Categories, self.categories),
            (Collection::Dictionary, self.dictionary),
            (Collection::Phrases, self.phrases),
        ]
    }
}

/// Snapshot the three collections, stamped with the current time.
pub fn export_backup(store: &LocalStore) -> Result<Backup> {
    Ok(Backup {
        categories: store.get(Collection::Categories)?,
        dictionary: store.get(Collection::Dictionary)?,
        phrases: store.get(Collection::Phrases)?,
        exported_at: Some(Utc::now()),
    })
}

/// Render a backup as pretty-printed JSON.
pub fn render_backup_json(backup: &Backup) -> serde_json::Result<String> {
    serde_json::to_string_pretty(backup)
}

/// Parse and structurally validate a backup payload.
///
/// All three collection arrays must be present and every record needs an
/// integer `id` unique within its collection.
pub fn parse_backup(payload: &str) -> Result<Backup> {
    let backup: Backup =
        serde_json::from_str(payload).map_err(|error| Error::Validation(error.to_string()))?;
    backup.validate()?;
    Ok(backup)
}

/// Replace all three collections with the backup contents in one transaction.
pub fn import_backup(store: &LocalStore, backup: Backup) -> Result<()> {
    backup.validate()?;
    tracing::info!(
        "Importing backup: {} categories, {} dictionary, {} phrases",
        backup.categories.len(),
        backup.dictionary.len(),
        backup.phrases.len()
    );
    store.replace_many(backup.into_sets())
}

/// Default file name for a backup taken on `date`.
#[must_use]
pub fn suggested_backup_file_name(date: NaiveDate) -> String {
    format!("trilan-translator-backup-{}.json", date.format("%Y-%m-%d"))
}
