use super::{Collection, Document, DocumentList, DocumentStore, Fields, Query, StoreError};
use crate::config::AppwriteConfig;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const KEY_HEADER: &str = "X-Appwrite-Key";

#[derive(Deserialize)]
struct ListResponse {
    total: u64,
    documents: Vec<Value>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Document store backed by the Appwrite databases REST API.
pub struct AppwriteStore {
    client: reqwest::Client,
    collections_url: String,
    project_id: String,
    api_key: String,
    app_totals: String,
    ratings: String,
    repos: String,
}

impl AppwriteStore {
    pub fn new(config: &AppwriteConfig, timeout: Duration) -> Result<Self, StoreError> {
        let collections_url = format!(
            "{}/databases/{}/collections",
            config.endpoint.as_str().trim_end_matches('/'),
            config.database_id
        );

        Ok(AppwriteStore {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            collections_url,
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
            app_totals: config.collections.app_totals.clone(),
            ratings: config.collections.ratings.clone(),
            repos: config.collections.repos.clone(),
        })
    }

    fn collection_id(&self, collection: Collection) -> &str {
        match collection {
            Collection::AppTotals => &self.app_totals,
            Collection::Ratings => &self.ratings,
            Collection::Repos => &self.repos,
        }
    }

    fn documents_url(&self, collection: Collection) -> String {
        format!(
            "{}/{}/documents",
            self.collections_url,
            self.collection_id(collection)
        )
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(PROJECT_HEADER, &self.project_id)
            .header(KEY_HEADER, &self.api_key)
    }

    async fn send_for_document(&self, request: RequestBuilder) -> Result<Document, StoreError> {
        let response = check_status(request.send().await?).await?;
        document_from_value(response.json().await?)
    }
}

#[async_trait]
impl DocumentStore for AppwriteStore {
    async fn list(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<DocumentList, StoreError> {
        let queries: Vec<(&str, String)> = encode_query(query)
            .into_iter()
            .map(|q| ("queries[]", q))
            .collect();

        let request = self
            .request(Method::GET, self.documents_url(collection))
            .query(&queries);
        let response = check_status(request.send().await?).await?;
        let list: ListResponse = response.json().await?;

        Ok(DocumentList {
            total: list.total,
            documents: list
                .documents
                .into_iter()
                .map(document_from_value)
                .collect::<Result<_, _>>()?,
        })
    }

    async fn create(&self, collection: Collection, fields: Fields) -> Result<Document, StoreError> {
        let request = self
            .request(Method::POST, self.documents_url(collection))
            .json(&json!({ "documentId": "unique()", "data": fields }));
        self.send_for_document(request).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<Document, StoreError> {
        let url = format!("{}/{id}", self.documents_url(collection));
        let request = self
            .request(Method::PATCH, url)
            .json(&json!({ "data": fields }));
        self.send_for_document(request).await
    }

    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        attribute: &str,
        by: f64,
    ) -> Result<Document, StoreError> {
        // Appwrite only accepts positive amounts; negative deltas go to the decrement route.
        let (operation, value) = if by < 0.0 {
            ("decrement", -by)
        } else {
            ("increment", by)
        };
        let url = format!(
            "{}/{id}/{attribute}/{operation}",
            self.documents_url(collection)
        );
        let request = self
            .request(Method::PATCH, url)
            .json(&json!({ "value": value }));
        self.send_for_document(request).await
    }
}

/// Encodes a query as Appwrite JSON query strings.
fn encode_query(query: &Query) -> Vec<String> {
    let mut encoded: Vec<String> = query
        .filters
        .iter()
        .map(|(attribute, value)| {
            json!({ "method": "equal", "attribute": attribute, "values": [value] }).to_string()
        })
        .collect();

    if let Some(limit) = query.limit {
        encoded.push(json!({ "method": "limit", "values": [limit] }).to_string());
    }
    if let Some(offset) = query.offset {
        encoded.push(json!({ "method": "offset", "values": [offset] }).to_string());
    }

    encoded
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.message)
        .unwrap_or(body);

    Err(StoreError::Status {
        status: status.as_u16(),
        message,
    })
}

// System attributes (`$id`, `$createdAt`, ...) are dropped from the fields.
fn document_from_value(value: Value) -> Result<Document, StoreError> {
    let Value::Object(mut fields) = value else {
        return Err(StoreError::Serialization(serde::de::Error::custom(
            "document is not an object",
        )));
    };

    let id = match fields.remove("$id") {
        Some(Value::String(id)) => id,
        _ => {
            return Err(StoreError::Serialization(serde::de::Error::missing_field(
                "$id",
            )));
        }
    };
    fields.retain(|key, _| !key.starts_with('$'));

    Ok(Document { id, fields })
}
