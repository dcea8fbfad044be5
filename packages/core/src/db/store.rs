//! DocumentStore trait - storage abstraction layer
//!
//! The graph engine treats its backing store as a black-box key/document
//! store: filter-based find plus atomic single-document insert, update and
//! delete. This trait is the whole contract; [`MemoryStore`] is the
//! in-process reference implementation and any driver for an external
//! document database can be slotted in behind the same interface.
//!
//! All methods are async and implementations must be `Send + Sync`; views
//! hold the store as `Arc<dyn DocumentStore>` and issue strictly sequential
//! round trips (no internal parallelism or speculative I/O).
//!
//! [`MemoryStore`]: super::MemoryStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::error::DatabaseError;

/// A flat persisted record. Every document carries a string `_id`.
pub type Document = Map<String, Value>;

/// One equality-style constraint of a [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Field equals value. Dotted paths descend into sub-documents; when
    /// the addressed field is an array and the value is a scalar, the
    /// clause matches by membership.
    Eq(String, Value),
    /// The addressed array field contains every one of the given values.
    All(String, Vec<Value>),
}

/// The query surface of the store: field equality, all-of array matching,
/// and an optional time range on `created_at`. Built in the same spirit as
/// a query-builder: chain the constraint methods and hand the result to
/// `find`/`find_one`/`count`.
///
/// # Examples
///
/// ```
/// use labtrace_core::db::Filter;
/// use serde_json::json;
///
/// let filter = Filter::new()
///     .field("name", json!("TiO2"))
///     .all("tags", vec![json!("oxide"), json!("powder")]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub clauses: Vec<Clause>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a single document by `_id`.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().field("_id", Value::String(id.into()))
    }

    /// Add a field-equality clause. Dotted paths address nested fields.
    pub fn field(mut self, path: impl Into<String>, value: Value) -> Self {
        self.clauses.push(Clause::Eq(path.into(), value));
        self
    }

    /// Require an array field to contain all of the given values.
    pub fn all(mut self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.clauses.push(Clause::All(path.into(), values));
        self
    }

    /// Only match documents created at or after this instant.
    pub fn created_after(mut self, instant: DateTime<Utc>) -> Self {
        self.created_after = Some(instant);
        self
    }

    /// Only match documents created at or before this instant.
    pub fn created_before(mut self, instant: DateTime<Utc>) -> Self {
        self.created_before = Some(instant);
        self
    }

    /// Build a filter from a flat equality document, the shape accepted by
    /// the view-layer `filter` operations.
    pub fn from_query(query: Document) -> Self {
        let mut filter = Self::new();
        for (path, value) in query {
            filter.clauses.push(Clause::Eq(path, value));
        }
        filter
    }
}

/// Abstraction over the backing document database.
///
/// Collections are addressed by name and created on first use. `find`
/// returns documents sorted by `created_at` descending (most recent
/// first); documents without a `created_at` field sort last.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document. The document must carry a string `_id`; a
    /// duplicate `_id` is an error.
    async fn insert_one(&self, collection: &str, document: Document)
        -> Result<(), DatabaseError>;

    /// First matching document, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, DatabaseError>;

    /// All matching documents, most recent first.
    async fn find(&self, collection: &str, filter: &Filter)
        -> Result<Vec<Document>, DatabaseError>;

    /// Number of matching documents, without deserialization.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, DatabaseError>;

    /// `$set`-style partial update of top-level fields on one document.
    /// Returns whether a document matched.
    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<bool, DatabaseError>;

    /// Replace one document wholesale. Returns whether a document matched.
    async fn replace_one(
        &self,
        collection: &str,
        id: &str,
        document: Document,
    ) -> Result<bool, DatabaseError>;

    /// Delete one document by id. Returns whether a document was deleted.
    async fn delete_one(&self, collection: &str, id: &str) -> Result<bool, DatabaseError>;

    /// Remove every array element equal to `element` from `field` (dotted
    /// paths allowed) across all documents of the collection. Returns the
    /// number of modified documents. This is the update-many primitive the
    /// cascade-delete scrub relies on.
    async fn pull_all(
        &self,
        collection: &str,
        field: &str,
        element: &Value,
    ) -> Result<u64, DatabaseError>;
}
