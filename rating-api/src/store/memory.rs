use super::{Collection, Document, DocumentList, DocumentStore, Fields, Query, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Number, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// In-process document store used for local runs and tests.
///
/// Listing preserves insertion order. Every trait call is counted so callers
/// can assert that a code path never touched the store.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<Collection, Vec<Document>>>,
    next_id: AtomicU64,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding only a zeroed app totals document.
    pub fn seeded() -> Self {
        let store = Self::new();
        store.insert(
            Collection::AppTotals,
            json!({ "ratings": 0, "repos": 0, "stars": 0 }),
        );
        store
    }

    /// Inserts a document directly, bypassing the call counter.
    ///
    /// Non-object values are stored as an empty document.
    pub fn insert(&self, collection: Collection, value: Value) -> Document {
        let fields = match value {
            Value::Object(fields) => fields,
            _ => Fields::new(),
        };
        let document = Document {
            id: self.generate_id(),
            fields,
        };
        self.collections
            .lock()
            .entry(collection)
            .or_default()
            .push(document.clone());
        document
    }

    /// Snapshot of every document in `collection`.
    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        self.collections
            .lock()
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn generate_id(&self) -> String {
        format!("doc{:016x}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn modify<F>(&self, collection: Collection, id: &str, f: F) -> Result<Document, StoreError>
    where
        F: FnOnce(&mut Fields) -> Result<(), StoreError>,
    {
        let mut collections = self.collections.lock();
        let document = collections
            .get_mut(&collection)
            .and_then(|documents| documents.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;

        f(&mut document.fields)?;
        Ok(document.clone())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<DocumentList, StoreError> {
        self.record_call();

        let collections = self.collections.lock();
        let matching: Vec<&Document> = collections
            .get(&collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|d| query.matches(&d.fields))
                    .collect()
            })
            .unwrap_or_default();

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);

        Ok(DocumentList {
            total: matching.len() as u64,
            documents: matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
        })
    }

    async fn create(&self, collection: Collection, fields: Fields) -> Result<Document, StoreError> {
        self.record_call();
        Ok(self.insert(collection, Value::Object(fields)))
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<Document, StoreError> {
        self.record_call();
        self.modify(collection, id, |existing| {
            existing.extend(fields);
            Ok(())
        })
    }

    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        attribute: &str,
        by: f64,
    ) -> Result<Document, StoreError> {
        self.record_call();
        self.modify(collection, id, |fields| {
            let current = fields.get(attribute).cloned().unwrap_or(Value::from(0));
            let updated = add_number(&current, by).ok_or_else(|| StoreError::NotNumeric {
                id: id.to_string(),
                attribute: attribute.to_string(),
            })?;
            fields.insert(attribute.to_string(), updated);
            Ok(())
        })
    }
}

// Integers stay integers when the increment is whole and the sum fits in an i64.
fn add_number(current: &Value, by: f64) -> Option<Value> {
    let current = current.as_number()?;

    if let Some(n) = current.as_i64()
        && by.fract() == 0.0
        && by >= i64::MIN as f64
        && by < i64::MAX as f64
        && let Some(sum) = n.checked_add(by as i64)
    {
        return Some(Value::from(sum));
    }

    Number::from_f64(current.as_f64()? + by).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryStore::new();
        let doc = store.insert(Collection::Repos, json!({"url": "u", "votes": 1}));

        let mut fields = Fields::new();
        fields.insert("votes".into(), json!(2));
        let updated = store.update(Collection::Repos, &doc.id, fields).await.unwrap();

        assert_eq!(updated.fields["url"], "u");
        assert_eq!(updated.fields["votes"], 2);
        assert_eq!(store.documents(Collection::Repos)[0], updated);
    }

    #[tokio::test]
    async fn test_increment() {
        let store = MemoryStore::new();
        let doc = store.insert(
            Collection::AppTotals,
            json!({"ratings": 1, "stars": 2.5, "name": "x"}),
        );

        let updated = store
            .increment(Collection::AppTotals, &doc.id, "ratings", 1.0)
            .await
            .unwrap();
        assert_eq!(updated.fields["ratings"], json!(2));

        let updated = store
            .increment(Collection::AppTotals, &doc.id, "stars", -1.0)
            .await
            .unwrap();
        assert_eq!(updated.fields["stars"], json!(1.5));

        // Missing attributes start from zero
        let updated = store
            .increment(Collection::AppTotals, &doc.id, "repos", 1.0)
            .await
            .unwrap();
        assert_eq!(updated.fields["repos"], json!(1));

        let err = store
            .increment(Collection::AppTotals, &doc.id, "name", 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotNumeric { .. }));
    }

    #[tokio::test]
    async fn test_increment_past_integer_range() {
        let store = MemoryStore::new();
        let doc = store.insert(Collection::AppTotals, json!({"stars": i64::MAX}));

        let updated = store
            .increment(Collection::AppTotals, &doc.id, "stars", 1.0)
            .await
            .unwrap();
        assert_eq!(updated.fields["stars"].as_i64(), None);
        assert_eq!(updated.fields["stars"].as_f64(), Some(i64::MAX as f64 + 1.0));

        let updated = store
            .increment(Collection::AppTotals, &doc.id, "repos", 1e30)
            .await
            .unwrap();
        assert_eq!(updated.fields["repos"].as_f64(), Some(1e30));
    }

    #[tokio::test]
    async fn test_missing_document() {
        let store = MemoryStore::new();
        let err = store
            .update(Collection::Ratings, "nope", Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(store.call_count(), 1);
    }
}
