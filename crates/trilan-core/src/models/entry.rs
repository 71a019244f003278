//! Glossary entry model (dictionary words and phrases share one shape)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{lenient, RecordId};

/// A term or phrase in four language renderings
///
/// Decoding never fails on a field: missing or malformed values come back
/// empty, as stored records are only checked for an `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossaryEntry {
    pub id: RecordId,
    /// Traditional Chinese
    #[serde(default, deserialize_with = "lenient::text")]
    pub traditional: String,
    /// Simplified Chinese
    #[serde(default, deserialize_with = "lenient::text")]
    pub simplified: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub english: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub korean: String,
    #[serde(default, deserialize_with = "lenient::record_id")]
    pub category_id: Option<RecordId>,
    /// Handle of the signed-in user who created the entry
    #[serde(
        default,
        deserialize_with = "lenient::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub author_handle: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GlossaryEntry {
    /// When the entry last changed, if known.
    #[must_use]
    pub fn last_touched(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }
}

/// Fields supplied when creating an entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    pub traditional: String,
    pub simplified: String,
    pub english: String,
    pub korean: String,
    pub category_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_handle: Option<String>,
}

impl NewEntry {
    /// Stamp the entry with its author. Unset handles leave the field absent.
    #[must_use]
    pub fn with_author(mut self, handle: Option<String>) -> Self {
        self.author_handle = handle;
        self
    }

    #[must_use]
    pub const fn with_category(mut self, category_id: Option<RecordId>) -> Self {
        self.category_id = category_id;
        self
    }

    /// True when every language field is blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        [&self.traditional, &self.simplified, &self.english, &self.korean]
            .iter()
            .all(|value| value.trim().is_empty())
    }
}

/// Fields changed by an entry edit; `None` leaves a field untouched.
///
/// `category_id: Some(None)` clears the category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traditional: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simplified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub english: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub korean: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<RecordId>>,
}

impl EntryPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.traditional.is_none()
            && self.simplified.is_none()
            && self.english.is_none()
            && self.korean.is_none()
            && self.category_id.is_none()
    }
}
