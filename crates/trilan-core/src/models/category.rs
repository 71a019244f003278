//! Category model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{lenient, Collection, RecordId};
use crate::error::Error;

/// Label shown for entries whose category is unset or no longer exists.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Which entry collection a category organizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Dictionary,
    Phrase,
}

impl CategoryKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dictionary => "dictionary",
            Self::Phrase => "phrase",
        }
    }

    /// The entry collection whose records may reference categories of this kind.
    #[must_use]
    pub const fn entry_collection(self) -> Collection {
        match self {
            Self::Dictionary => Collection::Dictionary,
            Self::Phrase => Collection::Phrases,
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dictionary" | "dict" => Ok(Self::Dictionary),
            "phrase" | "phrases" => Ok(Self::Phrase),
            other => Err(Error::InvalidInput(format!("unknown category kind '{other}'"))),
        }
    }
}

/// A named grouping for dictionary or phrase entries
///
/// Like entries, categories decode leniently. A category whose `type` is
/// missing or unrecognised has no kind and belongs to neither collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: RecordId,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient::category_kind",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<CategoryKind>,
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

/// Fields supplied when creating a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CategoryKind,
}

impl NewCategory {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: CategoryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Fields changed by a category edit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CategoryPatch {
    #[must_use]
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// Categories of one kind, in display order.
#[must_use]
pub fn categories_of_kind(categories: &[Category], kind: CategoryKind) -> Vec<&Category> {
    categories
        .iter()
        .filter(|category| category.kind == Some(kind))
        .collect()
}

/// Name of a category kind, or "unknown" when it has none.
#[must_use]
pub const fn kind_label(kind: Option<CategoryKind>) -> &'static str {
    match kind {
        Some(kind) => kind.as_str(),
        None => "unknown",
    }
}

/// Display name for a category reference; dangling and null references are tolerated.
#[must_use]
pub fn category_label(categories: &[Category], id: Option<RecordId>) -> &str {
    id.and_then(|id| categories.iter().find(|category| category.id == id))
        .map_or(UNCATEGORIZED, |category| category.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i64, name: &str, kind: CategoryKind) -> Category {
        Category {
            id: RecordId::new(id),
            name: name.to_string(),
            kind: Some(kind),
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    #[test]
    fn category_serializes_kind_as_type() {
        let value = serde_json::to_value(category(1, "Food", CategoryKind::Phrase)).unwrap();
        assert_eq!(value["type"], "phrase");
        assert!(value.get("updatedAt").is_none());
    }

    #[test]
    fn category_label_falls_back_for_missing_reference() {
        let categories = vec![category(1, "Food", CategoryKind::Dictionary)];
        assert_eq!(category_label(&categories, Some(RecordId::new(1))), "Food");
        assert_eq!(category_label(&categories, Some(RecordId::new(7))), UNCATEGORIZED);
        assert_eq!(category_label(&categories, None), UNCATEGORIZED);
    }

    #[test]
    fn categories_of_kind_keeps_order() {
        let categories = vec![
            category(1, "Food", CategoryKind::Dictionary),
            category(2, "Travel", CategoryKind::Phrase),
            category(3, "Verbs", CategoryKind::Dictionary),
        ];
        let names: Vec<&str> = categories_of_kind(&categories, CategoryKind::Dictionary)
            .into_iter()
            .map(|category| category.name.as_str())
            .collect();
        assert_eq!(names, vec!["Food", "Verbs"]);
    }

    #[test]
    fn category_without_type_matches_no_kind() {
        let categories: Vec<Category> = serde_json::from_value(serde_json::json!([
            {"id": 1},
            {"id": 2, "name": "Idioms", "type": "proverb"},
            {"id": 3, "name": "Food", "type": "dictionary"}
        ]))
        .unwrap();

        assert_eq!(categories[0].name, "");
        assert_eq!(categories[0].created_at, None);
        assert_eq!(kind_label(categories[1].kind), "unknown");
        let dictionary = categories_of_kind(&categories, CategoryKind::Dictionary);
        assert_eq!(dictionary, vec![&categories[2]]);
        assert!(categories_of_kind(&categories, CategoryKind::Phrase).is_empty());
    }
}
