//! Generic persistence views
//!
//! [`NodeView`] is the CRUD surface for one node type: it owns no state
//! beyond the injected store handle and config, so constructing a view is
//! cheap and views never cache documents between calls.
//!
//! The update path implements the two-tier write policy: pure edge growth
//! patches the stored document in place, while any other change snapshots
//! the entire prior document into `version_history`. Edge growth is the
//! common case (new downstream work arriving over time) and must not
//! explode the version log; every semantic change stays auditable.

use async_trait::async_trait;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use super::codec::{strip_volatile, timestamp_value};
use super::error::ViewError;
use super::graph_integrity::{self, RemovalPlan};
use super::resolver::NodeResolver;
use crate::config::CoreConfig;
use crate::db::{Document, DocumentStore, Filter};
use crate::models::{EdgeDirection, GraphNode, NodeRef};
use crate::time::truncated_now;

/// What `add` does when the entity already exists (matched by id, not by
/// content).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Raise [`ViewError::AlreadyInDatabase`].
    Raise,
    /// Leave the stored document untouched and return the id.
    Skip,
    /// Route through the versioning update engine.
    Update,
}

/// Referential precondition of a node type: the actor-like entities it
/// references must already exist before the node is written.
pub struct ActorPrecondition {
    pub collection: &'static str,
    pub label: &'static str,
    pub ids: Vec<String>,
}

/// A node type that can be persisted by a [`NodeView`].
#[async_trait]
pub trait NodeEntity: GraphNode + Clone + Send + Sync + Sized + 'static {
    const COLLECTION: &'static str;
    const LABEL: &'static str;

    /// Explicit serialization to a flat document, timestamps excluded.
    fn to_document(&self) -> Result<Document, ViewError>;

    /// Reconstruct the typed node from a stored document, re-resolving
    /// actor references (and, for Actions, ingredient materials) through
    /// the injected resolver. Upstream/downstream neighbors stay lazy.
    async fn from_document(document: Document, resolver: &NodeResolver)
        -> Result<Self, ViewError>;

    /// Actor-like references that must exist before this node is written.
    fn actor_precondition(&self) -> Option<ActorPrecondition> {
        None
    }
}

/// Document-level helpers shared by all views of one collection.
#[derive(Clone)]
pub(crate) struct RawView {
    store: Arc<dyn DocumentStore>,
    collection: &'static str,
    label: &'static str,
}

impl RawView {
    pub(crate) fn new(
        store: Arc<dyn DocumentStore>,
        collection: &'static str,
        label: &'static str,
    ) -> Self {
        Self {
            store,
            collection,
            label,
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub(crate) async fn get_document(&self, id: &str) -> Result<Option<Document>, ViewError> {
        Ok(self
            .store
            .find_one(self.collection, &Filter::by_id(id))
            .await?)
    }

    /// Existence probe without deserialization.
    pub(crate) async fn exists(&self, id: &str) -> Result<bool, ViewError> {
        Ok(self.store.count(self.collection, &Filter::by_id(id)).await? > 0)
    }

    pub(crate) async fn find(&self, filter: &Filter) -> Result<Vec<Document>, ViewError> {
        Ok(self.store.find(self.collection, filter).await?)
    }

    pub(crate) async fn insert(&self, document: Document) -> Result<(), ViewError> {
        self.store.insert_one(self.collection, document).await?;
        Ok(())
    }

    pub(crate) async fn update_fields(&self, id: &str, fields: Document) -> Result<(), ViewError> {
        if !self.store.update_fields(self.collection, id, fields).await? {
            return Err(ViewError::not_found(self.label, format!("id {id}")));
        }
        Ok(())
    }

    pub(crate) async fn replace(&self, id: &str, document: Document) -> Result<(), ViewError> {
        if !self.store.replace_one(self.collection, id, document).await? {
            return Err(ViewError::not_found(self.label, format!("id {id}")));
        }
        Ok(())
    }

    pub(crate) async fn delete(&self, id: &str) -> Result<bool, ViewError> {
        Ok(self.store.delete_one(self.collection, id).await?)
    }
}

/// CRUD view over one node type's collection.
pub struct NodeView<T: NodeEntity> {
    raw: RawView,
    config: CoreConfig,
    _entity: PhantomData<fn() -> T>,
}

impl<T: NodeEntity> NodeView<T> {
    pub fn new(store: Arc<dyn DocumentStore>, config: CoreConfig) -> Self {
        Self {
            raw: RawView::new(store, T::COLLECTION, T::LABEL),
            config,
            _entity: PhantomData,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Resolver bound to the same store, for lazy edge materialization.
    pub fn resolver(&self) -> NodeResolver {
        NodeResolver::new(Arc::clone(self.raw.store()))
    }

    /// Persist `entry`, or apply `on_conflict` if a document with its id
    /// already exists. Validates the node and its actor references before
    /// touching the store; on first insert, stamps `created_at` and
    /// `updated_at` on both the document and `entry`.
    pub async fn add(&self, entry: &mut T, on_conflict: OnConflict) -> Result<String, ViewError> {
        entry.check_valid(&self.config)?;
        if let Some(precondition) = entry.actor_precondition() {
            for id in &precondition.ids {
                let filter = Filter::by_id(id);
                if self
                    .raw
                    .store()
                    .count(precondition.collection, &filter)
                    .await?
                    == 0
                {
                    return Err(ViewError::not_found(
                        precondition.label,
                        format!("id {id} (must be saved before nodes referencing it)"),
                    ));
                }
            }
        }

        if self.raw.exists(entry.id()).await? {
            return match on_conflict {
                OnConflict::Raise => Err(ViewError::AlreadyInDatabase {
                    label: T::LABEL,
                    name: entry.name().to_string(),
                    id: entry.id().to_string(),
                }),
                OnConflict::Skip => Ok(entry.id().to_string()),
                OnConflict::Update => {
                    self.update(entry).await?;
                    Ok(entry.id().to_string())
                }
            };
        }

        let now = truncated_now();
        let mut document = entry.to_document()?;
        document.insert("created_at".to_string(), timestamp_value(now));
        document.insert("updated_at".to_string(), timestamp_value(now));
        self.raw.insert(document).await?;

        let core = entry.core_mut();
        core.created_at = Some(now);
        core.updated_at = Some(now);
        tracing::debug!(collection = T::COLLECTION, id = entry.id(), "inserted node");
        Ok(entry.id().to_string())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<T, ViewError> {
        let document = self
            .raw
            .get_document(id)
            .await?
            .ok_or_else(|| ViewError::not_found(T::LABEL, format!("id {id}")))?;
        T::from_document(document, &self.resolver()).await
    }

    /// All nodes with this name, most recent first. Names are not unique.
    pub async fn get_by_name(&self, name: &str) -> Result<Vec<T>, ViewError> {
        let filter = Filter::new().field("name", Value::String(name.to_string()));
        let entries = self.decode_all(self.raw.find(&filter).await?).await?;
        if entries.is_empty() {
            return Err(ViewError::not_found(T::LABEL, format!("name {name:?}")));
        }
        Ok(entries)
    }

    /// All nodes carrying every one of the given tags, most recent first.
    pub async fn get_by_tags(&self, tags: &[&str]) -> Result<Vec<T>, ViewError> {
        let filter = Filter::new().all(
            "tags",
            tags.iter().map(|t| Value::String(t.to_string())).collect(),
        );
        let entries = self.decode_all(self.raw.find(&filter).await?).await?;
        if entries.is_empty() {
            return Err(ViewError::not_found(T::LABEL, format!("tags {tags:?}")));
        }
        Ok(entries)
    }

    /// Field-equality query with an optional `created_at` range. Returns
    /// an empty list when nothing matches.
    pub async fn filter(
        &self,
        query: Document,
        created_after: Option<chrono::DateTime<chrono::Utc>>,
        created_before: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<T>, ViewError> {
        let mut filter = Filter::from_query(query);
        filter.created_after = created_after;
        filter.created_before = created_before;
        self.decode_all(self.raw.find(&filter).await?).await
    }

    /// First match of [`NodeView::filter`], or NotFound.
    pub async fn filter_one(
        &self,
        query: Document,
        created_after: Option<chrono::DateTime<chrono::Utc>>,
        created_before: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<T, ViewError> {
        let lookup = format!("filter {query:?}");
        self.filter(query, created_after, created_before)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ViewError::not_found(T::LABEL, lookup))
    }

    /// Existence probe without full deserialization.
    pub async fn exists(&self, id: &str) -> Result<bool, ViewError> {
        self.raw.exists(id).await
    }

    async fn decode_all(&self, documents: Vec<Document>) -> Result<Vec<T>, ViewError> {
        let resolver = self.resolver();
        let mut entries = Vec::with_capacity(documents.len());
        for document in documents {
            entries.push(T::from_document(document, &resolver).await?);
        }
        Ok(entries)
    }

    /// Write `entry`'s state over its stored document.
    ///
    /// Pure edge additions patch `upstream`/`downstream` in place; any
    /// other difference replaces the document and appends the prior state
    /// to `version_history`. Dropping a previously stored edge is an error
    /// and leaves the stored document untouched.
    pub async fn update(&self, entry: &mut T) -> Result<(), ViewError> {
        entry.check_valid(&self.config)?;
        let stored = self
            .raw
            .get_document(entry.id())
            .await?
            .ok_or_else(|| ViewError::not_found(T::LABEL, format!("id {}", entry.id())))?;
        let candidate = entry.to_document()?;

        let stored_cmp = strip_volatile(&stored);
        let candidate_cmp = strip_volatile(&candidate);
        if stored_cmp == candidate_cmp {
            return Ok(()); // nothing to update
        }

        for (direction, key) in [
            (EdgeDirection::Upstream, "upstream"),
            (EdgeDirection::Downstream, "downstream"),
        ] {
            if let Some(removed) = first_removed_edge(&stored, &candidate, key) {
                let removed: NodeRef = serde_json::from_value(removed)
                    .map_err(|e| ViewError::decode(T::LABEL, format!("stored {key} edge: {e}")))?;
                return Err(ViewError::EdgeRemoval {
                    label: T::LABEL,
                    id: entry.id().to_string(),
                    direction,
                    removed,
                });
            }
        }

        let edges_only = {
            let mut stored_rest = stored_cmp;
            let mut candidate_rest = candidate_cmp;
            for rest in [&mut stored_rest, &mut candidate_rest] {
                rest.remove("upstream");
                rest.remove("downstream");
            }
            stored_rest == candidate_rest
        };

        let now = truncated_now();
        if edges_only {
            let mut fields = Document::new();
            for key in ["upstream", "downstream"] {
                if let Some(value) = candidate.get(key) {
                    fields.insert(key.to_string(), value.clone());
                }
            }
            fields.insert("updated_at".to_string(), timestamp_value(now));
            self.raw.update_fields(entry.id(), fields).await?;
            tracing::debug!(
                collection = T::COLLECTION,
                id = entry.id(),
                "appended edges in place"
            );
        } else {
            let mut snapshot = stored.clone();
            snapshot.remove("_id");
            snapshot.remove("version_history");

            let mut history = match stored.get("version_history") {
                Some(Value::Array(entries)) => entries.clone(),
                _ => Vec::new(),
            };
            history.push(Value::Object(snapshot));

            let mut replacement = candidate;
            if let Some(created_at) = stored.get("created_at") {
                replacement.insert("created_at".to_string(), created_at.clone());
            }
            replacement.insert("updated_at".to_string(), timestamp_value(now));
            replacement.insert("version_history".to_string(), Value::Array(history.clone()));
            self.raw.replace(entry.id(), replacement).await?;

            entry.core_mut().version_history = history;
            tracing::debug!(
                collection = T::COLLECTION,
                id = entry.id(),
                "recorded version snapshot"
            );
        }
        entry.core_mut().updated_at = Some(now);
        Ok(())
    }

    /// Everything a removal of this node would take with it.
    pub async fn removal_plan(&self, id: &str) -> Result<RemovalPlan, ViewError> {
        let target = NodeRef::new(T::NODE_TYPE, id);
        if !self.raw.exists(id).await? {
            return Err(ViewError::not_found(T::LABEL, format!("id {id}")));
        }
        let (plan, _) =
            graph_integrity::build_removal_plan(self.raw.store(), &self.config, &target).await?;
        Ok(plan)
    }

    /// Remove this node and everything transitively dependent on it.
    ///
    /// Without `force`, a cascading removal is refused with
    /// [`ViewError::ConfirmationRequired`] carrying the affected counts,
    /// and a missing id is a NotFound error. With `force`, a missing id is
    /// a no-op and the cascade proceeds unprompted.
    ///
    /// The cascade is best-effort: the store offers no multi-document
    /// transaction, so a failure partway leaves some affected documents
    /// deleted and others not. Callers needing atomicity must wrap this in
    /// their own transaction layer.
    pub async fn remove(&self, id: &str, force: bool) -> Result<(), ViewError> {
        let target = NodeRef::new(T::NODE_TYPE, id);
        graph_integrity::cascade_remove(self.raw.store(), &self.config, &target, force).await
    }
}

/// First edge of `stored[key]` that is absent from `candidate[key]`.
fn first_removed_edge(stored: &Document, candidate: &Document, key: &str) -> Option<Value> {
    let empty = Vec::new();
    let stored_edges = match stored.get(key) {
        Some(Value::Array(entries)) => entries,
        _ => &empty,
    };
    let candidate_edges = match candidate.get(key) {
        Some(Value::Array(entries)) => entries,
        _ => &empty,
    };
    stored_edges
        .iter()
        .find(|edge| !candidate_edges.contains(edge))
        .cloned()
}
