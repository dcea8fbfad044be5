//! In-memory DocumentStore implementation
//!
//! The reference backend: a map of collections, each a map of `_id` to
//! document. Used by the test suite and the dev seeding tools, and doubles
//! as the executable specification of the filter semantics any external
//! driver has to match.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::error::DatabaseError;
use super::store::{Clause, Document, DocumentStore, Filter};
use crate::time::parse_timestamp;

/// In-process document store backed by hash maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Navigate a dotted path into a document.
fn value_at_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn clause_matches(document: &Document, clause: &Clause) -> bool {
    match clause {
        Clause::Eq(path, expected) => match value_at_path(document, path) {
            Some(actual) if actual == expected => true,
            // a scalar clause matches an array field by membership
            Some(Value::Array(elements)) => elements.contains(expected),
            _ => false,
        },
        Clause::All(path, required) => match value_at_path(document, path) {
            Some(Value::Array(elements)) => required.iter().all(|v| elements.contains(v)),
            _ => false,
        },
    }
}

fn created_at_of(document: &Document) -> Option<chrono::DateTime<chrono::Utc>> {
    document
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

fn filter_matches(document: &Document, filter: &Filter) -> bool {
    if !filter.clauses.iter().all(|c| clause_matches(document, c)) {
        return false;
    }
    if filter.created_after.is_some() || filter.created_before.is_some() {
        let Some(created_at) = created_at_of(document) else {
            return false;
        };
        if let Some(min) = filter.created_after {
            if created_at < min {
                return false;
            }
        }
        if let Some(max) = filter.created_before {
            if created_at > max {
                return false;
            }
        }
    }
    true
}

/// Remove elements equal to `element` from the array at `field`.
/// Returns true if anything was removed.
fn pull_from_document(document: &mut Document, field: &str, element: &Value) -> bool {
    let mut segments: Vec<&str> = field.split('.').collect();
    let last = segments.pop().expect("non-empty field path");
    if segments.is_empty() {
        return document
            .get_mut(last)
            .is_some_and(|value| pull_from_array(value, element));
    }
    let mut current = match document.get_mut(segments[0]) {
        Some(value) => value,
        None => return false,
    };
    for segment in &segments[1..] {
        current = match current.as_object_mut().and_then(|o| o.get_mut(*segment)) {
            Some(value) => value,
            None => return false,
        };
    }
    current
        .as_object_mut()
        .and_then(|o| o.get_mut(last))
        .is_some_and(|value| pull_from_array(value, element))
}

fn pull_from_array(value: &mut Value, element: &Value) -> bool {
    let Some(elements) = value.as_array_mut() else {
        return false;
    };
    let before = elements.len();
    elements.retain(|candidate| candidate != element);
    elements.len() != before
}

fn document_id(collection: &str, document: &Document) -> Result<String, DatabaseError> {
    document
        .get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DatabaseError::missing_id(collection))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
    ) -> Result<(), DatabaseError> {
        let id = document_id(collection, &document)?;
        let mut collections = self.collections.write().await;
        let entries = collections.entry(collection.to_string()).or_default();
        if entries.contains_key(&id) {
            return Err(DatabaseError::duplicate_id(collection, id));
        }
        entries.insert(id, document);
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, DatabaseError> {
        Ok(self.find(collection, filter).await?.into_iter().next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<Document>, DatabaseError> {
        let collections = self.collections.read().await;
        let mut matches: Vec<Document> = collections
            .get(collection)
            .map(|entries| {
                entries
                    .values()
                    .filter(|document| filter_matches(document, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // most recent first; documents without created_at sort last
        matches.sort_by_key(|document| {
            std::cmp::Reverse(
                created_at_of(document)
                    .map(|instant| instant.timestamp())
                    .unwrap_or(i64::MIN),
            )
        });
        Ok(matches)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, DatabaseError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|entries| {
                entries
                    .values()
                    .filter(|document| filter_matches(document, filter))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<bool, DatabaseError> {
        let mut collections = self.collections.write().await;
        let Some(document) = collections
            .get_mut(collection)
            .and_then(|entries| entries.get_mut(id))
        else {
            return Ok(false);
        };
        for (key, value) in fields {
            document.insert(key, value);
        }
        Ok(true)
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        document: Document,
    ) -> Result<bool, DatabaseError> {
        let mut collections = self.collections.write().await;
        let Some(entries) = collections.get_mut(collection) else {
            return Ok(false);
        };
        if !entries.contains_key(id) {
            return Ok(false);
        }
        entries.insert(id.to_string(), document);
        Ok(true)
    }

    async fn delete_one(&self, collection: &str, id: &str) -> Result<bool, DatabaseError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .map(|entries| entries.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn pull_all(
        &self,
        collection: &str,
        field: &str,
        element: &Value,
    ) -> Result<u64, DatabaseError> {
        let mut collections = self.collections.write().await;
        let Some(entries) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut modified = 0;
        for document in entries.values_mut() {
            if pull_from_document(document, field, element) {
                modified += 1;
            }
        }
        Ok(modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn insert_and_find_by_id() {
        let store = MemoryStore::new();
        store
            .insert_one("materials", doc(json!({"_id": "m-1", "name": "TiO2"})))
            .await
            .unwrap();

        let found = store
            .find_one("materials", &Filter::by_id("m-1"))
            .await
            .unwrap();
        assert_eq!(found.unwrap()["name"], json!("TiO2"));
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let store = MemoryStore::new();
        store
            .insert_one("materials", doc(json!({"_id": "m-1"})))
            .await
            .unwrap();
        let err = store
            .insert_one("materials", doc(json!({"_id": "m-1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateId { .. }));
    }

    #[tokio::test]
    async fn scalar_clause_matches_array_by_membership() {
        let store = MemoryStore::new();
        store
            .insert_one(
                "samples",
                doc(json!({"_id": "s-1", "nodes": {"Material": ["m-1", "m-2"]}})),
            )
            .await
            .unwrap();

        let filter = Filter::new().field("nodes.Material", json!("m-2"));
        assert_eq!(store.count("samples", &filter).await.unwrap(), 1);

        let filter = Filter::new().field("nodes.Material", json!("m-9"));
        assert_eq!(store.count("samples", &filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn all_clause_requires_every_value() {
        let store = MemoryStore::new();
        store
            .insert_one(
                "materials",
                doc(json!({"_id": "m-1", "tags": ["oxide", "powder"]})),
            )
            .await
            .unwrap();

        let both = Filter::new().all("tags", vec![json!("oxide"), json!("powder")]);
        assert_eq!(store.count("materials", &both).await.unwrap(), 1);

        let missing = Filter::new().all("tags", vec![json!("oxide"), json!("pellet")]);
        assert_eq!(store.count("materials", &missing).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_sorts_most_recent_first() {
        let store = MemoryStore::new();
        store
            .insert_one(
                "materials",
                doc(json!({"_id": "old", "name": "x", "created_at": "2024-01-01T00:00:00Z"})),
            )
            .await
            .unwrap();
        store
            .insert_one(
                "materials",
                doc(json!({"_id": "new", "name": "x", "created_at": "2025-01-01T00:00:00Z"})),
            )
            .await
            .unwrap();

        let found = store
            .find("materials", &Filter::new().field("name", json!("x")))
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|d| d["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn created_range_filters() {
        let store = MemoryStore::new();
        store
            .insert_one(
                "materials",
                doc(json!({"_id": "m-1", "created_at": "2024-06-01T00:00:00Z"})),
            )
            .await
            .unwrap();

        let after = Filter::new().created_after(parse_timestamp("2024-01-01T00:00:00Z").unwrap());
        assert_eq!(store.count("materials", &after).await.unwrap(), 1);

        let before =
            Filter::new().created_before(parse_timestamp("2024-01-01T00:00:00Z").unwrap());
        assert_eq!(store.count("materials", &before).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pull_all_strips_matching_elements() {
        let store = MemoryStore::new();
        store
            .insert_one(
                "actions",
                doc(json!({
                    "_id": "a-1",
                    "upstream": [
                        {"node_type": "Material", "node_id": "m-1"},
                        {"node_type": "Material", "node_id": "m-2"},
                    ],
                })),
            )
            .await
            .unwrap();

        let element = json!({"node_type": "Material", "node_id": "m-1"});
        let modified = store.pull_all("actions", "upstream", &element).await.unwrap();
        assert_eq!(modified, 1);

        let document = store
            .find_one("actions", &Filter::by_id("a-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            document["upstream"],
            json!([{"node_type": "Material", "node_id": "m-2"}])
        );
    }

    #[tokio::test]
    async fn pull_all_reaches_nested_fields() {
        let store = MemoryStore::new();
        store
            .insert_one(
                "samples",
                doc(json!({"_id": "s-1", "nodes": {"Material": ["m-1", "m-2"]}})),
            )
            .await
            .unwrap();

        let modified = store
            .pull_all("samples", "nodes.Material", &json!("m-1"))
            .await
            .unwrap();
        assert_eq!(modified, 1);
        let document = store
            .find_one("samples", &Filter::by_id("s-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document["nodes"]["Material"], json!(["m-2"]));
    }
}
