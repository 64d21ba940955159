//! Document store abstraction over the three rating collections.
//!
//! The workflow addresses collections by their logical role; each backend maps
//! a [`Collection`] to whatever identifiers it was configured with.

mod appwrite;
mod memory;

pub use appwrite::AppwriteStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub type DocumentId = String;
pub type Fields = Map<String, Value>;

/// Page size used when a caller needs every matching document.
const PAGE_SIZE: u32 = 100;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("document store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("document store returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("could not (de)serialize document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document {id} not found in {collection}")]
    NotFound {
        collection: Collection,
        id: DocumentId,
    },
    #[error("attribute {attribute} of document {id} is not numeric")]
    NotNumeric { id: DocumentId, attribute: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    AppTotals,
    Ratings,
    Repos,
}

impl Collection {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::AppTotals => "app_totals",
            Collection::Ratings => "ratings",
            Collection::Repos => "repos",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filters plus optional paging.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equal(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.filters.push((attribute.to_string(), value.into()));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// True if every filter matches the corresponding field exactly.
    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters
            .iter()
            .all(|(attribute, value)| fields.get(attribute) == Some(value))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
}

impl Document {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

/// One page of a listing. `total` counts every match, not just this page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentList {
    pub total: u64,
    pub documents: Vec<Document>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self, collection: Collection, query: &Query)
    -> Result<DocumentList, StoreError>;

    /// Creates a document under a freshly generated unique id.
    async fn create(&self, collection: Collection, fields: Fields) -> Result<Document, StoreError>;

    /// Overwrites the given fields; fields not mentioned are left untouched.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<Document, StoreError>;

    /// Atomically adds `by` (which may be negative) to a numeric attribute.
    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        attribute: &str,
        by: f64,
    ) -> Result<Document, StoreError>;
}

/// Serializes a record into document fields.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::Serialization(serde::ser::Error::custom(
            format!("expected an object, got {other}"),
        ))),
    }
}

/// Lists every document matching `query`, following pages until `total` is reached.
pub async fn list_all(
    store: &dyn DocumentStore,
    collection: Collection,
    query: Query,
) -> Result<Vec<Document>, StoreError> {
    let mut documents = Vec::new();

    loop {
        let page = store
            .list(
                collection,
                &query
                    .clone()
                    .limit(PAGE_SIZE)
                    .offset(documents.len() as u32),
            )
            .await?;

        let fetched = page.documents.len();
        documents.extend(page.documents);

        if fetched == 0 || documents.len() as u64 >= page.total {
            break;
        }
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_all_follows_pages() {
        let store = MemoryStore::new();
        for i in 0..250 {
            store.insert(
                Collection::Ratings,
                json!({"url": "u", "username": format!("user{i}"), "rating": 3}),
            );
        }
        store.insert(
            Collection::Ratings,
            json!({"url": "other", "username": "x", "rating": 1}),
        );

        let all = list_all(&store, Collection::Ratings, Query::new().equal("url", "u"))
            .await
            .unwrap();
        assert_eq!(all.len(), 250);
        // 3 pages of 100
        assert_eq!(store.call_count(), 3);
    }

    #[test]
    fn test_query_matches() {
        let fields = to_fields(&json!({"url": "u", "username": "alice"})).unwrap();
        assert!(Query::new().equal("url", "u").matches(&fields));
        assert!(
            !Query::new()
                .equal("url", "u")
                .equal("username", "bob")
                .matches(&fields)
        );
        assert!(Query::new().matches(&fields));
    }

    #[test]
    fn test_to_fields_rejects_non_objects() {
        assert!(matches!(
            to_fields(&5),
            Err(StoreError::Serialization(_))
        ));
    }
}
