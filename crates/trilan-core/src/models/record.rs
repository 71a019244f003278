//! Collection names, record ids, and the stored document shape

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Keys a field merge never touches once a record exists.
const IMMUTABLE_KEYS: [&str; 3] = ["id", "createdAt", "authorHandle"];

/// Identifier of a record within its collection (a millisecond timestamp at creation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// One of the three named record sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Categories,
    Dictionary,
    Phrases,
}

impl Collection {
    pub const ALL: [Self; 3] = [Self::Categories, Self::Dictionary, Self::Phrases];

    /// Name used for the local table key and the remote sub-collection.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Dictionary => "dictionary",
            Self::Phrases => "phrases",
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Categories => 0,
            Self::Dictionary => 1,
            Self::Phrases => 2,
        }
    }

    /// Whether the collection holds glossary entries (as opposed to categories).
    #[must_use]
    pub const fn holds_entries(self) -> bool {
        matches!(self, Self::Dictionary | Self::Phrases)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "categories" | "category" => Ok(Self::Categories),
            "dictionary" | "dict" => Ok(Self::Dictionary),
            "phrases" | "phrase" => Ok(Self::Phrases),
            other => Err(Error::InvalidInput(format!("unknown collection '{other}'"))),
        }
    }
}

/// A stored record: a JSON object carrying at least an integer `id`.
///
/// The store, the remote mirror, and the backup format all move records in
/// this shape, so fields written by other clients survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Document {
    id: RecordId,
    fields: Map<String, Value>,
}

impl Document {
    /// Build a document from any serializable record with an `id` field.
    pub fn from_record<R: Serialize>(record: &R) -> Result<Self> {
        match serde_json::to_value(record)? {
            Value::Object(fields) => Self::try_from(fields).map_err(Error::InvalidInput),
            _ => Err(Error::InvalidInput("record must serialize to an object".into())),
        }
    }

    /// Decode the document into a typed record.
    pub fn to_record<R: DeserializeOwned>(&self) -> Result<R> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }

    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Shallow-merge `patch` into the record, leaving identity and authorship alone.
    pub(crate) fn merge(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            if IMMUTABLE_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.fields.insert(key, value);
        }
    }

    pub(crate) fn set(&mut self, key: &str, value: Value) {
        if key != "id" {
            self.fields.insert(key.to_string(), value);
        }
    }
}

impl TryFrom<Map<String, Value>> for Document {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let id = fields
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| "record is missing an integer 'id'".to_string())?;
        Ok(Self {
            id: RecordId(id),
            fields,
        })
    }
}

impl From<Document> for Map<String, Value> {
    fn from(document: Document) -> Self {
        document.fields
    }
}

/// Return the first id that appears more than once, if any.
pub fn find_duplicate_id(documents: &[Document]) -> Option<RecordId> {
    let mut seen = HashSet::with_capacity(documents.len());
    documents
        .iter()
        .map(Document::id)
        .find(|id| !seen.insert(*id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_parses_aliases() {
        assert_eq!("dict".parse::<Collection>().unwrap(), Collection::Dictionary);
        assert_eq!("Phrase".parse::<Collection>().unwrap(), Collection::Phrases);
        assert_eq!(
            "categories".parse::<Collection>().unwrap(),
            Collection::Categories
        );
        assert!("notes".parse::<Collection>().is_err());
    }

    #[test]
    fn document_requires_integer_id() {
        assert!(serde_json::from_value::<Document>(json!({"english": "hi"})).is_err());
        assert!(serde_json::from_value::<Document>(json!({"id": "12"})).is_err());
        assert!(serde_json::from_value::<Document>(json!([1, 2])).is_err());

        let doc: Document = serde_json::from_value(json!({"id": 12, "english": "hi"})).unwrap();
        assert_eq!(doc.id(), RecordId::new(12));
        assert_eq!(doc.str_field("english"), Some("hi"));
    }

    #[test]
    fn merge_keeps_identity_and_author() {
        let mut doc: Document = serde_json::from_value(json!({
            "id": 1,
            "english": "old",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "authorHandle": "mina"
        }))
        .unwrap();

        let patch = json!({
            "id": 99,
            "english": "new",
            "createdAt": "2030-01-01T00:00:00.000Z",
            "authorHandle": "someone-else"
        });
        let Value::Object(patch) = patch else {
            unreachable!()
        };
        doc.merge(patch);

        assert_eq!(doc.id(), RecordId::new(1));
        assert_eq!(doc.str_field("english"), Some("new"));
        assert_eq!(doc.str_field("createdAt"), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(doc.str_field("authorHandle"), Some("mina"));
    }

    #[test]
    fn find_duplicate_id_reports_repeat() {
        let docs: Vec<Document> =
            serde_json::from_value(json!([{"id": 1}, {"id": 2}, {"id": 1}])).unwrap();
        assert_eq!(find_duplicate_id(&docs), Some(RecordId::new(1)));
        assert_eq!(find_duplicate_id(&docs[..2]), None);
    }
}
