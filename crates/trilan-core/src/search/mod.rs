//! Glossary search
//!
//! Matching is a case-insensitive substring test over the four language
//! fields. Collections are small enough that filtering in memory after a
//! full read keeps search consistent with whatever the store currently holds.

use serde::Serialize;

use crate::models::Document;

/// Fields consulted by [`document_matches`].
pub const SEARCH_FIELDS: [&str; 4] = ["traditional", "simplified", "english", "korean"];

/// Matches from the dictionary and phrase collections for one query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Lookup {
    pub dictionary: Vec<Document>,
    pub phrases: Vec<Document>,
}

impl Lookup {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty() && self.phrases.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dictionary.len() + self.phrases.len()
    }
}

/// True if any language field contains `needle` (already lowercased).
fn matches_lowercased(document: &Document, needle: &str) -> bool {
    SEARCH_FIELDS.iter().any(|field| {
        document
            .str_field(field)
            .is_some_and(|value| value.to_lowercase().contains(needle))
    })
}

/// Whether `document` matches `query`. An empty query matches everything.
#[must_use]
pub fn document_matches(document: &Document, query: &str) -> bool {
    query.is_empty() || matches_lowercased(document, &query.to_lowercase())
}

/// Keep the documents matching `query`, preserving order.
#[must_use]
pub fn filter_documents(documents: Vec<Document>, query: &str) -> Vec<Document> {
    if query.is_empty() {
        return documents;
    }
    let needle = query.to_lowercase();
    documents
        .into_iter()
        .filter(|document| matches_lowercased(document, &needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_matches_any_language_field() {
        let entry = doc(json!({
            "id": 1,
            "traditional": "謝謝",
            "simplified": "谢谢",
            "english": "Thank you",
            "korean": "감사합니다"
        }));

        assert!(document_matches(&entry, "thank"));
        assert!(document_matches(&entry, "THANK YOU"));
        assert!(document_matches(&entry, "谢"));
        assert!(document_matches(&entry, "謝謝"));
        assert!(document_matches(&entry, "감사"));
        assert!(!document_matches(&entry, "hello"));
    }

    #[test]
    fn test_ignores_non_language_fields() {
        let entry = doc(json!({"id": 1, "authorHandle": "mina", "english": "tea"}));
        assert!(!document_matches(&entry, "mina"));
    }

    #[test]
    fn test_tolerates_missing_and_non_string_fields() {
        let entry = doc(json!({"id": 1, "english": null, "korean": 5}));
        assert!(!document_matches(&entry, "5"));
        assert!(document_matches(&entry, ""));
    }

    #[test]
    fn test_filter_preserves_order() {
        let docs = vec![
            doc(json!({"id": 3, "english": "green tea"})),
            doc(json!({"id": 1, "english": "coffee"})),
            doc(json!({"id": 2, "english": "black tea"})),
        ];

        let ids: Vec<i64> = filter_documents(docs, "Tea")
            .iter()
            .map(|d| d.id().get())
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
