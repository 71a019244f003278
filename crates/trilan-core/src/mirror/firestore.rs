//! Remote mirror backed by the Cloud Firestore REST API.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};

use super::{MirrorError, MirrorResult, RemoteMirror, RemoteScope, SnapshotHandler, Subscription};
use crate::config::CloudConfig;
use crate::models::{Collection, Document, RecordId};
use crate::util::body_excerpt;

/// Writes per `:commit` request; the service rejects larger batches.
const MAX_WRITES_PER_COMMIT: usize = 500;
const PAGE_SIZE: &str = "300";

#[derive(Clone)]
pub struct FirestoreMirror {
    /// `{base}/projects/{project}/databases/(default)/documents`
    documents_url: String,
    /// `projects/{project}/databases/(default)/documents`
    documents_path: String,
    poll_interval: Duration,
    client: Client,
}

impl FirestoreMirror {
    pub fn new(config: &CloudConfig) -> MirrorResult<Self> {
        let project_id = config.project_id.trim();
        if project_id.is_empty() {
            return Err(MirrorError::Api("project id must not be empty".to_string()));
        }

        Ok(Self {
            documents_url: config.documents_url(),
            documents_path: format!("projects/{project_id}/databases/(default)/documents"),
            poll_interval: config.watch_interval(),
            client: Client::builder().build()?,
        })
    }

    fn collection_url(&self, scope: &RemoteScope, collection: Collection) -> String {
        format!(
            "{}/users/{}/{}",
            self.documents_url,
            scope.user_id(),
            collection.as_str()
        )
    }

    fn document_name(&self, scope: &RemoteScope, collection: Collection, id: RecordId) -> String {
        format!(
            "{}/users/{}/{}/{}",
            self.documents_path,
            scope.user_id(),
            collection.as_str(),
            id
        )
    }

    async fn list(&self, scope: &RemoteScope, collection: Collection) -> MirrorResult<Vec<Document>> {
        scope.ensure_authenticated()?;

        let url = self.collection_url(scope, collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListResponse = send(authorized(request, scope)).await?.json().await?;
            for remote in page.documents {
                documents.push(decode_document(remote)?);
            }

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        documents.sort_by_key(Document::id);
        Ok(documents)
    }

    async fn commit(&self, scope: &RemoteScope, writes: Vec<Value>) -> MirrorResult<()> {
        let url = format!("{}:commit", self.documents_url);
        for batch in writes.chunks(MAX_WRITES_PER_COMMIT) {
            let request = self.client.post(&url).json(&json!({ "writes": batch }));
            send(authorized(request, scope)).await?;
        }
        Ok(())
    }
}

impl RemoteMirror for FirestoreMirror {
    async fn overwrite_all(
        &self,
        scope: &RemoteScope,
        collection: Collection,
        records: Vec<Document>,
    ) -> MirrorResult<()> {
        scope.ensure_authenticated()?;

        let existing = self.list(scope, collection).await?;
        let keep: HashSet<RecordId> = records.iter().map(Document::id).collect();

        // Records that survive are rewritten in full rather than deleted and
        // recreated; a commit applies its writes in order but a document may
        // appear only once per commit.
        let mut writes: Vec<Value> = existing
            .iter()
            .map(Document::id)
            .filter(|id| !keep.contains(id))
            .map(|id| json!({ "delete": self.document_name(scope, collection, id) }))
            .collect();
        for record in &records {
            writes.push(json!({
                "update": {
                    "name": self.document_name(scope, collection, record.id()),
                    "fields": encode_fields(record.fields()),
                }
            }));
        }

        tracing::debug!(
            "Overwriting remote {} with {} record(s) ({} write(s))",
            collection,
            records.len(),
            writes.len()
        );
        self.commit(scope, writes).await
    }

    async fn fetch_all(
        &self,
        scope: &RemoteScope,
        collection: Collection,
    ) -> MirrorResult<Vec<Document>> {
        self.list(scope, collection).await
    }

    fn watch(
        &self,
        scope: &RemoteScope,
        collection: Collection,
        on_change: SnapshotHandler,
    ) -> MirrorResult<Subscription> {
        scope.ensure_authenticated()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MirrorError::NoRuntime)?;

        let mirror = self.clone();
        let scope = scope.clone();
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(mirror.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last: Option<Vec<Document>> = None;

            loop {
                ticker.tick().await;
                match mirror.list(&scope, collection).await {
                    Ok(snapshot) => {
                        if last.as_ref() != Some(&snapshot) {
                            last = Some(snapshot.clone());
                            on_change(snapshot);
                        }
                    }
                    Err(error) => {
                        tracing::warn!("Polling remote {} failed: {}", collection, error);
                    }
                }
            }
        });

        Ok(Subscription::new(move || task.abort()))
    }
}

fn authorized(request: RequestBuilder, scope: &RemoteScope) -> RequestBuilder {
    request.bearer_auth(scope.token())
}

async fn send(request: RequestBuilder) -> MirrorResult<reqwest::Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        tracing::debug!(
            "Document store rejected credentials: {}",
            body_excerpt(&body).unwrap_or_default()
        );
        return Err(MirrorError::Unauthenticated);
    }
    Err(MirrorError::Api(parse_api_error(status, &body)))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        if let Some(message) = envelope.error.message {
            return match envelope.error.status {
                Some(code) => format!("{code}: {} ({})", message.trim(), status.as_u16()),
                None => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    body_excerpt(body).map_or_else(
        || format!("HTTP {}", status.as_u16()),
        |excerpt| format!("{excerpt} ({})", status.as_u16()),
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RemoteDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

fn decode_document(remote: RemoteDocument) -> MirrorResult<Document> {
    let mut fields = Map::with_capacity(remote.fields.len());
    for (key, value) in remote.fields {
        fields.insert(key, decode_value(value)?);
    }

    // Records written by other clients may lack an `id` field; the document
    // name always ends with it.
    if !fields.get("id").is_some_and(Value::is_i64) {
        let id = remote
            .name
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse::<i64>().ok())
            .ok_or_else(|| MirrorError::InvalidDocument(remote.name.clone()))?;
        fields.insert("id".to_string(), Value::from(id));
    }

    Document::try_from(fields).map_err(MirrorError::InvalidDocument)
}

/// Encode a JSON object as a Firestore `fields` map.
pub(crate) fn encode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), encode_value(value)))
            .collect(),
    )
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => number.as_i64().map_or_else(
            || json!({ "doubleValue": number }),
            |integer| json!({ "integerValue": integer.to_string() }),
        ),
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(items) if items.is_empty() => json!({ "arrayValue": {} }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Decode one Firestore typed value back into plain JSON.
pub(crate) fn decode_value(value: Value) -> MirrorResult<Value> {
    let Value::Object(typed) = value else {
        return Err(MirrorError::InvalidDocument(
            "field value is not an object".to_string(),
        ));
    };
    let Some((kind, inner)) = typed.into_iter().next() else {
        return Err(MirrorError::InvalidDocument("empty field value".to_string()));
    };

    match (kind.as_str(), inner) {
        ("nullValue", _) => Ok(Value::Null),
        ("booleanValue", Value::Bool(flag)) => Ok(Value::Bool(flag)),
        ("integerValue", Value::String(text)) => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| MirrorError::InvalidDocument(format!("bad integer '{text}'"))),
        ("integerValue" | "doubleValue", Value::Number(number)) => Ok(Value::Number(number)),
        ("doubleValue", Value::String(text)) => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| MirrorError::InvalidDocument(format!("bad double '{text}'"))),
        (
            "stringValue" | "timestampValue" | "referenceValue" | "bytesValue",
            Value::String(text),
        ) => Ok(Value::String(text)),
        ("arrayValue", Value::Object(mut array)) => match array.remove("values") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(decode_value)
                .collect::<MirrorResult<Vec<_>>>()
                .map(Value::Array),
            _ => Ok(Value::Array(Vec::new())),
        },
        ("mapValue", Value::Object(mut map)) => match map.remove("fields") {
            Some(Value::Object(fields)) => {
                let mut decoded = Map::with_capacity(fields.len());
                for (key, value) in fields {
                    decoded.insert(key, decode_value(value)?);
                }
                Ok(Value::Object(decoded))
            }
            _ => Ok(Value::Object(Map::new())),
        },
        ("geoPointValue", point @ Value::Object(_)) => Ok(point),
        (kind, _) => Err(MirrorError::InvalidDocument(format!(
            "unsupported value kind '{kind}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::serve_sequence;

    fn mirror(base_url: &str) -> FirestoreMirror {
        let mut config = CloudConfig::new("key", "demo");
        config.firestore_url = Some(format!("{base_url}/v1"));
        FirestoreMirror::new(&config).unwrap()
    }

    fn scope() -> RemoteScope {
        RemoteScope::new("uid-1", "id-token")
    }

    fn doc(value: Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    fn remote(id: i64, english: &str) -> Value {
        json!({
            "name": format!("projects/demo/databases/(default)/documents/users/uid-1/dictionary/{id}"),
            "fields": {
                "id": {"integerValue": id.to_string()},
                "english": {"stringValue": english},
                "categoryId": {"nullValue": null}
            }
        })
    }

    #[test]
    fn codec_preserves_nested_values() {
        let fields = json!({
            "id": 17,
            "english": "tea",
            "ratio": 0.5,
            "tags": ["a", 2, null],
            "empty": [],
            "meta": {"flag": true}
        });
        let Value::Object(fields) = fields else {
            unreachable!()
        };

        let Value::Object(encoded) = encode_fields(&fields) else {
            unreachable!()
        };
        assert_eq!(encoded["id"], json!({"integerValue": "17"}));

        let decoded: Map<String, Value> = encoded
            .into_iter()
            .map(|(key, value)| (key, decode_value(value).unwrap()))
            .collect();
        assert_eq!(decoded, fields);
    }

    #[test]
    fn decode_rejects_unknown_kinds() {
        assert!(decode_value(json!({"mysteryValue": 1})).is_err());
        assert!(decode_value(json!("bare")).is_err());
    }

    #[test]
    fn decode_document_falls_back_to_name_for_id() {
        let decoded = decode_document(RemoteDocument {
            name: "projects/demo/databases/(default)/documents/users/u/phrases/99".to_string(),
            fields: Map::new(),
        })
        .unwrap();
        assert_eq!(decoded.id(), RecordId::new(99));
    }

    #[tokio::test]
    async fn fetch_all_follows_page_tokens() {
        let (base_url, recorded) = serve_sequence(vec![
            (
                200,
                json!({"documents": [remote(2, "two")], "nextPageToken": "next"}).to_string(),
            ),
            (200, json!({"documents": [remote(1, "one")]}).to_string()),
        ])
        .await;

        let records = mirror(&base_url)
            .fetch_all(&scope(), Collection::Dictionary)
            .await
            .unwrap();

        assert_eq!(
            records,
            vec![
                doc(json!({"id": 1, "english": "one", "categoryId": null})),
                doc(json!({"id": 2, "english": "two", "categoryId": null})),
            ]
        );
        let requests = recorded.lock().unwrap();
        assert!(requests[0]
            .request_line
            .contains("/v1/projects/demo/databases/(default)/documents/users/uid-1/dictionary?pageSize=300"));
        assert!(requests[1].request_line.contains("pageToken=next"));
        assert!(requests[0]
            .headers
            .to_ascii_lowercase()
            .contains("authorization: bearer id-token"));
    }

    #[tokio::test]
    async fn empty_remote_collection_is_empty_list() {
        let (base_url, _) = serve_sequence(vec![(200, "{}".to_string())]).await;
        let records = mirror(&base_url)
            .fetch_all(&scope(), Collection::Phrases)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn overwrite_deletes_stale_and_rewrites_current() {
        let (base_url, recorded) = serve_sequence(vec![
            (
                200,
                json!({"documents": [remote(1, "old"), remote(2, "gone")]}).to_string(),
            ),
            (200, json!({"writeResults": []}).to_string()),
        ])
        .await;

        mirror(&base_url)
            .overwrite_all(
                &scope(),
                Collection::Dictionary,
                vec![
                    doc(json!({"id": 1, "english": "new"})),
                    doc(json!({"id": 3, "english": "added"})),
                ],
            )
            .await
            .unwrap();

        let requests = recorded.lock().unwrap();
        assert!(requests[1]
            .request_line
            .starts_with("POST /v1/projects/demo/databases/(default)/documents:commit"));
        let writes = requests[1].json()["writes"].clone();
        assert_eq!(
            writes[0],
            json!({"delete": "projects/demo/databases/(default)/documents/users/uid-1/dictionary/2"})
        );
        assert_eq!(
            writes[1]["update"]["fields"]["english"],
            json!({"stringValue": "new"})
        );
        assert_eq!(
            writes[2]["update"]["name"],
            "projects/demo/databases/(default)/documents/users/uid-1/dictionary/3"
        );
        assert_eq!(writes.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejected_token_is_unauthenticated() {
        let (base_url, _) = serve_sequence(vec![(
            401,
            json!({"error": {"code": 401, "message": "Missing or invalid authentication.", "status": "UNAUTHENTICATED"}}).to_string(),
        )])
        .await;

        let result = mirror(&base_url)
            .fetch_all(&scope(), Collection::Categories)
            .await;
        assert!(matches!(result, Err(MirrorError::Unauthenticated)));
    }

    #[tokio::test]
    async fn service_errors_surface_message() {
        let (base_url, _) = serve_sequence(vec![(
            500,
            json!({"error": {"code": 500, "message": "backend hiccup", "status": "INTERNAL"}})
                .to_string(),
        )])
        .await;

        let error = mirror(&base_url)
            .fetch_all(&scope(), Collection::Categories)
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "Document store error: INTERNAL: backend hiccup (500)");
    }

    #[tokio::test]
    async fn calls_without_token_fail_fast() {
        let result = mirror("http://127.0.0.1:9")
            .fetch_all(&RemoteScope::new("uid-1", ""), Collection::Dictionary)
            .await;
        assert!(matches!(result, Err(MirrorError::Unauthenticated)));
    }

    #[test]
    fn watch_outside_runtime_is_an_error() {
        let result = mirror("http://127.0.0.1:9").watch(
            &scope(),
            Collection::Dictionary,
            std::sync::Arc::new(|_: Vec<Document>| {}),
        );
        assert!(matches!(result, Err(MirrorError::NoRuntime)));
    }
}
