//! Firestore REST v1 backend.
//!
//! Documents are written whole with `PATCH` (no update mask, so fields missing from
//! the new payload are removed) and read back through the typed value encoding.

use crate::store::collection::{check_document_id, DocumentCollection, RawDocument};
use crate::store::credentials::Credentials;
use crate::store::error::StoreError;
use async_trait::async_trait;
use bon::bon;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::time::Duration;

pub const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const LIST_PAGE_SIZE: usize = 300;

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Encodes a plain JSON value as a Firestore typed value.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            if values.is_empty() {
                json!({ "arrayValue": {} })
            } else {
                json!({ "arrayValue": { "values": values } })
            }
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Decodes a Firestore typed value. `None` for value kinds without a JSON form.
pub fn decode_value(value: &Value) -> Option<Value> {
    let typed = value.as_object()?;
    let (kind, inner) = typed.iter().next()?;
    match kind.as_str() {
        "nullValue" => Some(Value::Null),
        "booleanValue" => inner.as_bool().map(Value::Bool),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().ok().map(Value::from),
            Value::Number(n) => Some(Value::Number(n.clone())),
            _ => None,
        },
        // "NaN" and "Infinity" arrive as strings and have no JSON form.
        "doubleValue" => match inner {
            Value::Number(n) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
            Value::String(_) => Some(Value::Null),
            _ => None,
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => {
            inner.as_str().map(|s| Value::String(s.to_string()))
        }
        "geoPointValue" => {
            let point = inner.as_object()?;
            let lat = point.get("latitude").and_then(Value::as_f64).unwrap_or(0.0);
            let lon = point.get("longitude").and_then(Value::as_f64).unwrap_or(0.0);
            Some(json!({
                "latitude": Number::from_f64(lat).map(Value::Number).unwrap_or(Value::Null),
                "longitude": Number::from_f64(lon).map(Value::Number).unwrap_or(Value::Null),
            }))
        }
        "arrayValue" => {
            let values = match inner.get("values").and_then(Value::as_array) {
                Some(values) => values
                    .iter()
                    .map(decode_value)
                    .collect::<Option<Vec<Value>>>()?,
                None => Vec::new(),
            };
            Some(Value::Array(values))
        }
        "mapValue" => {
            let fields = match inner.get("fields").and_then(Value::as_object) {
                Some(fields) => decode_fields(fields)?,
                None => Map::new(),
            };
            Some(Value::Object(fields))
        }
        _ => None,
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Option<Map<String, Value>> {
    fields
        .iter()
        .map(|(key, value)| decode_value(value).map(|v| (key.clone(), v)))
        .collect()
}

/// A Firestore collection addressed through the REST API.
pub struct FirestoreCollection {
    client: Client,
    base_url: String,
    project: String,
    collection: String,
    credentials: Credentials,
}

#[bon]
impl FirestoreCollection {
    /// Builds a collection handle. `base_url` points at an emulator or proxy
    /// instead of the public endpoint.
    #[builder]
    pub fn new(
        #[builder(into)] project: String,
        #[builder(into)] collection: String,
        credentials: Credentials,
        #[builder(into)] base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(60)))
            .build()
            .map_err(StoreError::ClientBuild)?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| FIRESTORE_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            project,
            collection,
            credentials,
        })
    }

    pub fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.base_url, self.project, self.collection
        )
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.documents_url(), id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let quota_project = self
            .credentials
            .quota_project
            .as_deref()
            .unwrap_or(&self.project);
        request
            .bearer_auth(&self.credentials.access_token)
            .header("x-goog-user-project", quota_project)
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, StoreError> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::NetworkRequest(url.to_string(), e))
    }

    fn decode_document(&self, url: &str, document: &FirestoreDocument) -> Result<RawDocument, StoreError> {
        decode_fields(&document.fields).ok_or_else(|| StoreError::Backend {
            url: url.to_string(),
            message: format!("unsupported field value in {}", document.name),
        })
    }
}

fn check_status(response: Response, url: &str) -> Result<Response, StoreError> {
    match response.error_for_status() {
        Ok(resp) => Ok(resp),
        Err(e) => {
            warn!("HTTP error for {}: {:?}", url, e);
            Err(match e.status() {
                Some(status) => StoreError::HttpStatus {
                    url: url.to_string(),
                    status,
                    source: e,
                },
                None => StoreError::NetworkRequest(url.to_string(), e),
            })
        }
    }
}

fn invalid_body(url: &str, e: reqwest::Error) -> StoreError {
    StoreError::Backend {
        url: url.to_string(),
        message: format!("unreadable response body: {}", e),
    }
}

/// Last path segment of a full document name.
fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[async_trait]
impl DocumentCollection for FirestoreCollection {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn get(&self, id: &str) -> Result<Option<RawDocument>, StoreError> {
        check_document_id(id)?;
        let url = self.document_url(id);
        let response = self.send(self.client.get(&url), &url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: FirestoreDocument = check_status(response, &url)?
            .json()
            .await
            .map_err(|e| invalid_body(&url, e))?;
        self.decode_document(&url, &document).map(Some)
    }

    async fn set(&self, id: &str, document: &RawDocument) -> Result<(), StoreError> {
        check_document_id(id)?;
        let url = self.document_url(id);
        let body = json!({ "fields": encode_fields(document) });
        debug!("PATCH {}", url);
        let response = self.send(self.client.patch(&url).json(&body), &url).await?;
        check_status(response, &url)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, RawDocument)>, StoreError> {
        let url = self.documents_url();
        let mut page_token: Option<String> = None;
        let mut documents = Vec::new();

        loop {
            let mut query = vec![("pageSize", LIST_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }
            let response = self.send(self.client.get(&url).query(&query), &url).await?;
            if response.status() == StatusCode::NOT_FOUND {
                break;
            }
            let page: ListResponse = check_status(response, &url)?
                .json()
                .await
                .map_err(|e| invalid_body(&url, e))?;

            for document in &page.documents {
                let fields = self.decode_document(&url, document)?;
                documents.push((document_id(&document.name).to_string(), fields));
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        documents.sort_by(|a, b| a.0.cmp(&b.0));
        debug!("Listed {} documents from {}", documents.len(), url);
        Ok(documents)
    }
}
