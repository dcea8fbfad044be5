//! Views for versioned reference entities
//!
//! Actors and AnalysisMethods are small, name-addressed entities that
//! nodes reference by id. Their views enforce name uniqueness at insert
//! time (configurable) and lost-update protection on update: a write whose
//! version is behind the stored version is rejected.

use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use super::base::{OnConflict, RawView};
use super::codec::{take_string, take_timestamp, timestamp_value};
use super::error::ViewError;
use crate::config::CoreConfig;
use crate::db::{Document, DocumentStore, Filter};
use crate::models::{Actor, AnalysisMethod, ReferenceCore, VersionEntry};
use crate::time::truncated_now;

/// A versioned reference entity persisted by a [`ReferenceView`].
pub trait ReferenceEntity: Clone + Send + Sync + Sized + 'static {
    const COLLECTION: &'static str;
    const LABEL: &'static str;

    fn reference_core(&self) -> &ReferenceCore;
    fn reference_core_mut(&mut self) -> &mut ReferenceCore;
    fn from_reference_core(core: ReferenceCore) -> Self;
}

impl ReferenceEntity for Actor {
    const COLLECTION: &'static str = "actors";
    const LABEL: &'static str = "Actor";

    fn reference_core(&self) -> &ReferenceCore {
        self.core()
    }

    fn reference_core_mut(&mut self) -> &mut ReferenceCore {
        self.core_mut()
    }

    fn from_reference_core(core: ReferenceCore) -> Self {
        Actor::from_core(core)
    }
}

impl ReferenceEntity for AnalysisMethod {
    const COLLECTION: &'static str = "analysis_methods";
    const LABEL: &'static str = "AnalysisMethod";

    fn reference_core(&self) -> &ReferenceCore {
        self.core()
    }

    fn reference_core_mut(&mut self) -> &mut ReferenceCore {
        self.core_mut()
    }

    fn from_reference_core(core: ReferenceCore) -> Self {
        AnalysisMethod::from_core(core)
    }
}

pub(crate) fn encode_reference<T: ReferenceEntity>(entity: &T) -> Result<Document, ViewError> {
    let core = entity.reference_core();
    core.check_contents(T::LABEL)?;
    let mut document = Document::new();
    document.insert("_id".to_string(), Value::String(core.id.clone()));
    document.insert("name".to_string(), Value::String(core.name.clone()));
    document.insert(
        "description".to_string(),
        Value::String(core.description.clone()),
    );
    document.insert(
        "tags".to_string(),
        Value::Array(core.tags.iter().cloned().map(Value::String).collect()),
    );
    document.insert("version".to_string(), Value::from(core.version()));
    document.insert(
        "version_history".to_string(),
        serde_json::to_value(&core.version_history)
            .map_err(|e| ViewError::decode(T::LABEL, format!("version_history: {e}")))?,
    );
    document.insert("contents".to_string(), Value::Object(core.contents.clone()));
    Ok(document)
}

pub(crate) fn decode_reference<T: ReferenceEntity>(mut document: Document) -> Result<T, ViewError> {
    let id = take_string(&mut document, "_id", T::LABEL)?;
    let name = take_string(&mut document, "name", T::LABEL)?;
    let description = take_string(&mut document, "description", T::LABEL)?;
    let tags = match document.remove("tags") {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| ViewError::decode(T::LABEL, format!("tags: {e}")))?,
        None => Vec::new(),
    };
    let version_history: Vec<VersionEntry> = match document.remove("version_history") {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| ViewError::decode(T::LABEL, format!("version_history: {e}")))?,
        None => Vec::new(),
    };
    let contents = match document.remove("contents") {
        Some(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    let created_at = take_timestamp(&mut document, "created_at");
    let updated_at = take_timestamp(&mut document, "updated_at");

    Ok(T::from_reference_core(ReferenceCore {
        id,
        name,
        description,
        tags,
        contents,
        version_history,
        created_at,
        updated_at,
    }))
}

/// CRUD view over one reference-entity collection.
pub struct ReferenceView<T: ReferenceEntity> {
    raw: RawView,
    config: CoreConfig,
    _entity: PhantomData<fn() -> T>,
}

/// View over the `actors` collection.
pub type ActorView = ReferenceView<Actor>;
/// View over the `analysis_methods` collection.
pub type AnalysisMethodView = ReferenceView<AnalysisMethod>;

impl<T: ReferenceEntity> ReferenceView<T> {
    pub fn new(store: Arc<dyn DocumentStore>, config: CoreConfig) -> Self {
        Self {
            raw: RawView::new(store, T::COLLECTION, T::LABEL),
            config,
            _entity: PhantomData,
        }
    }

    /// Persist `entry`, enforcing name uniqueness when configured. Matched
    /// by id first; a same-name entity with a different id is a conflict
    /// regardless of policy.
    pub async fn add(&self, entry: &mut T, on_conflict: OnConflict) -> Result<String, ViewError> {
        let id = entry.reference_core().id.clone();
        let name = entry.reference_core().name.clone();

        if self.raw.exists(&id).await? {
            return match on_conflict {
                OnConflict::Raise => Err(ViewError::AlreadyInDatabase {
                    label: T::LABEL,
                    name,
                    id,
                }),
                OnConflict::Skip => Ok(id),
                OnConflict::Update => {
                    self.update(entry).await?;
                    Ok(id)
                }
            };
        }

        if self.config.unique_actor_names {
            let filter = Filter::new().field("name", Value::String(name.clone()));
            if self.raw.store().count(T::COLLECTION, &filter).await? > 0 {
                return Err(ViewError::AlreadyInDatabase {
                    label: T::LABEL,
                    name,
                    id,
                });
            }
        }

        let now = truncated_now();
        let mut document = encode_reference(entry)?;
        document.insert("created_at".to_string(), timestamp_value(now));
        document.insert("updated_at".to_string(), timestamp_value(now));
        self.raw.insert(document).await?;

        let core = entry.reference_core_mut();
        core.created_at = Some(now);
        core.updated_at = Some(now);
        tracing::debug!(collection = T::COLLECTION, id = %id, "inserted reference entity");
        Ok(id)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<T, ViewError> {
        let document = self
            .raw
            .get_document(id)
            .await?
            .ok_or_else(|| ViewError::not_found(T::LABEL, format!("id {id}")))?;
        decode_reference(document)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Vec<T>, ViewError> {
        let filter = Filter::new().field("name", Value::String(name.to_string()));
        let entries: Vec<T> = self
            .raw
            .find(&filter)
            .await?
            .into_iter()
            .map(decode_reference)
            .collect::<Result<_, _>>()?;
        if entries.is_empty() {
            return Err(ViewError::not_found(T::LABEL, format!("name {name:?}")));
        }
        Ok(entries)
    }

    pub async fn get_by_tags(&self, tags: &[&str]) -> Result<Vec<T>, ViewError> {
        let filter = Filter::new().all(
            "tags",
            tags.iter().map(|t| Value::String(t.to_string())).collect(),
        );
        let entries: Vec<T> = self
            .raw
            .find(&filter)
            .await?
            .into_iter()
            .map(decode_reference)
            .collect::<Result<_, _>>()?;
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
        self.raw
            .find(&filter)
            .await?
            .into_iter()
            .map(decode_reference)
            .collect()
    }

    /// First match of [`ReferenceView::filter`], or NotFound.
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

    pub async fn exists(&self, id: &str) -> Result<bool, ViewError> {
        self.raw.exists(id).await
    }

    /// Replace the stored document with `entry`'s state.
    ///
    /// Rejects the write when the stored version history is ahead of the
    /// candidate's (lost-update protection).
    pub async fn update(&self, entry: &mut T) -> Result<(), ViewError> {
        let id = entry.reference_core().id.clone();
        let stored = self
            .raw
            .get_document(&id)
            .await?
            .ok_or_else(|| ViewError::not_found(T::LABEL, format!("id {id}")))?;

        let stored_version = stored
            .get("version_history")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("version").and_then(Value::as_u64))
                    .max()
                    .unwrap_or(1) as u32
            })
            .unwrap_or(1);
        let candidate_version = entry.reference_core().version();
        if stored_version > candidate_version {
            return Err(ViewError::VersionConflict {
                label: T::LABEL,
                id,
                stored: stored_version,
                candidate: candidate_version,
            });
        }

        let now = truncated_now();
        let mut replacement = encode_reference(entry)?;
        if let Some(created_at) = stored.get("created_at") {
            replacement.insert("created_at".to_string(), created_at.clone());
        }
        replacement.insert("updated_at".to_string(), timestamp_value(now));
        self.raw.replace(&id, replacement).await?;

        entry.reference_core_mut().updated_at = Some(now);
        tracing::debug!(
            collection = T::COLLECTION,
            id = %id,
            version = candidate_version,
            "updated reference entity"
        );
        Ok(())
    }
}
