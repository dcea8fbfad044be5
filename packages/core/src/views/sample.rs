//! Sample view: persistence for grouped experimental records
//!
//! A sample document stores only grouped node ids; the nodes live in their
//! own collections. Writing a sample therefore upserts its member nodes
//! first, and reading one materializes them back through the per-type
//! views (topologically ordered).
//!
//! Graph validity is checked twice on insert: in memory (single connected
//! acyclic component) and against the store: every edge of every member
//! node must point at a node that is part of the sample, already
//! persisted, or explicitly whitelisted via `additional_incoming_node_ids`.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use super::base::{OnConflict, RawView};
use super::codec::{strip_volatile, take_string, take_timestamp, timestamp_value};
use super::error::ViewError;
use super::graph_integrity::cascade_remove;
use super::nodes::{add_any, ActionView, AnalysisView, MaterialView, MeasurementView};
use crate::config::CoreConfig;
use crate::db::{Document, DocumentStore, Filter};
use crate::models::{NodeRef, NodeType, Sample};
use crate::time::truncated_now;

const SAMPLE_LABEL: &str = "Sample";

/// The `nodes` field of a sample document: ids grouped by node type.
pub(crate) fn encode_node_groups(sample: &Sample) -> Value {
    let grouped = sample.node_ids_by_type();
    let mut groups = Map::new();
    for node_type in NodeType::ALL {
        let ids = grouped.get(&node_type).cloned().unwrap_or_default();
        groups.insert(
            node_type.as_str().to_string(),
            Value::Array(ids.into_iter().map(Value::String).collect()),
        );
    }
    Value::Object(groups)
}

fn encode_sample(sample: &Sample) -> Result<Document, ViewError> {
    sample.check_contents()?;
    let mut document = Document::new();
    document.insert("_id".to_string(), Value::String(sample.id.clone()));
    document.insert("name".to_string(), Value::String(sample.name.clone()));
    document.insert(
        "description".to_string(),
        Value::String(sample.description.clone()),
    );
    document.insert("nodes".to_string(), encode_node_groups(sample));
    document.insert(
        "tags".to_string(),
        Value::Array(sample.tags.iter().cloned().map(Value::String).collect()),
    );
    document.insert(
        "contents".to_string(),
        Value::Object(sample.contents.clone()),
    );
    document.insert(
        "version_history".to_string(),
        Value::Array(sample.version_history.clone()),
    );
    Ok(document)
}

/// CRUD view over the `samples` collection.
pub struct SampleView {
    raw: RawView,
    config: CoreConfig,
    materials: MaterialView,
    actions: ActionView,
    measurements: MeasurementView,
    analyses: AnalysisView,
}

impl SampleView {
    pub fn new(store: Arc<dyn DocumentStore>, config: CoreConfig) -> Self {
        Self {
            raw: RawView::new(Arc::clone(&store), "samples", SAMPLE_LABEL),
            materials: MaterialView::new(Arc::clone(&store), config.clone()),
            actions: ActionView::new(Arc::clone(&store), config.clone()),
            measurements: MeasurementView::new(Arc::clone(&store), config.clone()),
            analyses: AnalysisView::new(Arc::clone(&store), config.clone()),
            config,
        }
    }

    /// Persist `sample` and upsert every member node.
    ///
    /// `additional_incoming_node_ids` whitelists nodes that are not part
    /// of this sample and not yet persisted but are guaranteed to arrive
    /// (used by [`SampleView::add_many`] for interdependent samples).
    pub async fn add(
        &self,
        sample: &mut Sample,
        additional_incoming_node_ids: Option<&[String]>,
        on_conflict: OnConflict,
    ) -> Result<String, ViewError> {
        if !sample.has_valid_graph() {
            return Err(ViewError::invalid_sample_graph(
                &sample.name,
                "check for isolated nodes or graph cycles",
            ));
        }

        if self.raw.exists(&sample.id).await? {
            return match on_conflict {
                OnConflict::Raise => Err(ViewError::AlreadyInDatabase {
                    label: SAMPLE_LABEL,
                    name: sample.name.clone(),
                    id: sample.id.clone(),
                }),
                OnConflict::Skip => Ok(sample.id.clone()),
                OnConflict::Update => {
                    self.update(sample).await?;
                    Ok(sample.id.clone())
                }
            };
        }

        for node in sample.nodes() {
            node.check_valid(&self.config)?;
        }
        if let Some(reason) = self
            .dependency_gap(sample, additional_incoming_node_ids)
            .await?
        {
            return Err(ViewError::invalid_sample_graph(&sample.name, reason));
        }

        self.upsert_nodes(sample).await?;

        let now = truncated_now();
        let mut document = encode_sample(sample)?;
        document.insert("created_at".to_string(), timestamp_value(now));
        document.insert("updated_at".to_string(), timestamp_value(now));
        self.raw.insert(document).await?;

        sample.created_at = Some(now);
        sample.updated_at = Some(now);
        tracing::debug!(id = %sample.id, name = %sample.name, "inserted sample");
        Ok(sample.id.clone())
    }

    /// Insert a batch of samples whose nodes share edges without any one
    /// sample containing the whole connected set.
    ///
    /// A temporary wrapper sample holding the union of all nodes is added
    /// first (whitelisting them against the dependency check), then each
    /// sample is added individually. The wrapper document is removed again
    /// whether or not the individual adds succeed.
    pub async fn add_many(&self, samples: &mut [Sample]) -> Result<(), ViewError> {
        let mut wrapper = Sample::new("temporary_batch_sample").with_description(
            "Wrapper sample used to batch-add nodes from multiple correlated \
             samples; removed immediately afterwards.",
        );
        for sample in samples.iter() {
            for node in sample.nodes() {
                wrapper.add_node(node.clone());
            }
        }
        let wrapper_node_ids: Vec<String> = wrapper
            .nodes()
            .iter()
            .map(|node| node.id().to_string())
            .collect();

        self.add(&mut wrapper, Some(&wrapper_node_ids), OnConflict::Raise)
            .await?;

        let mut outcome = Ok(());
        for sample in samples.iter_mut() {
            if let Err(error) = self.add(sample, None, OnConflict::Raise).await {
                outcome = Err(error);
                break;
            }
        }
        // the wrapper document goes away regardless; its nodes stay
        let cleanup = self.raw.delete(&wrapper.id).await;
        outcome?;
        cleanup?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Sample, ViewError> {
        let document = self
            .raw
            .get_document(id)
            .await?
            .ok_or_else(|| ViewError::not_found(SAMPLE_LABEL, format!("id {id}")))?;
        self.decode(document).await
    }

    /// All samples with this name, most recent first.
    pub async fn get_by_name(&self, name: &str) -> Result<Vec<Sample>, ViewError> {
        let filter = Filter::new().field("name", Value::String(name.to_string()));
        let samples = self.decode_all(self.raw.find(&filter).await?).await?;
        if samples.is_empty() {
            return Err(ViewError::not_found(SAMPLE_LABEL, format!("name {name:?}")));
        }
        Ok(samples)
    }

    /// All samples carrying every one of the given tags.
    pub async fn get_by_tags(&self, tags: &[&str]) -> Result<Vec<Sample>, ViewError> {
        let filter = Filter::new().all(
            "tags",
            tags.iter().map(|t| Value::String(t.to_string())).collect(),
        );
        let samples = self.decode_all(self.raw.find(&filter).await?).await?;
        if samples.is_empty() {
            return Err(ViewError::not_found(SAMPLE_LABEL, format!("tags {tags:?}")));
        }
        Ok(samples)
    }

    /// All samples whose user contents contain every given key/value pair.
    pub async fn get_by_contents(&self, contents: Document) -> Result<Vec<Sample>, ViewError> {
        let lookup = format!("contents {contents:?}");
        let mut filter = Filter::new();
        for (key, value) in contents {
            filter = filter.field(format!("contents.{key}"), value);
        }
        let samples = self.decode_all(self.raw.find(&filter).await?).await?;
        if samples.is_empty() {
            return Err(ViewError::not_found(SAMPLE_LABEL, lookup));
        }
        Ok(samples)
    }

    /// All samples containing the referenced node, most recent first.
    pub async fn get_by_node(&self, reference: &NodeRef) -> Result<Vec<Sample>, ViewError> {
        let filter = Filter::new().field(
            format!("nodes.{}", reference.node_type),
            Value::String(reference.node_id.clone()),
        );
        let samples = self.decode_all(self.raw.find(&filter).await?).await?;
        if samples.is_empty() {
            return Err(ViewError::not_found(
                SAMPLE_LABEL,
                format!("containing node {reference}"),
            ));
        }
        Ok(samples)
    }

    /// Field-equality query with an optional `created_at` range. Returns
    /// an empty list when nothing matches.
    pub async fn filter(
        &self,
        query: Document,
        created_after: Option<chrono::DateTime<chrono::Utc>>,
        created_before: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<Sample>, ViewError> {
        let mut filter = Filter::from_query(query);
        filter.created_after = created_after;
        filter.created_before = created_before;
        self.decode_all(self.raw.find(&filter).await?).await
    }

    /// First match of [`SampleView::filter`], or NotFound.
    pub async fn filter_one(
        &self,
        query: Document,
        created_after: Option<chrono::DateTime<chrono::Utc>>,
        created_before: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Sample, ViewError> {
        let lookup = format!("filter {query:?}");
        self.filter(query, created_after, created_before)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ViewError::not_found(SAMPLE_LABEL, lookup))
    }

    pub async fn exists(&self, id: &str) -> Result<bool, ViewError> {
        self.raw.exists(id).await
    }

    /// Write `sample`'s state over its stored document.
    ///
    /// Member nodes are upserted first. A change confined to the `nodes`
    /// field patches in place; any other change snapshots the prior
    /// document into `version_history`.
    pub async fn update(&self, sample: &mut Sample) -> Result<(), ViewError> {
        if !sample.has_valid_graph() {
            return Err(ViewError::invalid_sample_graph(
                &sample.name,
                "check for isolated nodes or graph cycles",
            ));
        }
        let stored = self
            .raw
            .get_document(&sample.id)
            .await?
            .ok_or_else(|| ViewError::not_found(SAMPLE_LABEL, format!("id {}", sample.id)))?;

        for node in sample.nodes() {
            node.check_valid(&self.config)?;
        }
        self.upsert_nodes(sample).await?;

        let candidate = encode_sample(sample)?;
        let stored_cmp = strip_volatile(&stored);
        let candidate_cmp = strip_volatile(&candidate);
        if stored_cmp == candidate_cmp {
            return Ok(());
        }

        let nodes_only = {
            let mut stored_rest = stored_cmp;
            let mut candidate_rest = candidate_cmp;
            stored_rest.remove("nodes");
            candidate_rest.remove("nodes");
            stored_rest == candidate_rest
        };

        let now = truncated_now();
        if nodes_only {
            let mut fields = Document::new();
            if let Some(nodes) = candidate.get("nodes") {
                fields.insert("nodes".to_string(), nodes.clone());
            }
            fields.insert("updated_at".to_string(), timestamp_value(now));
            self.raw.update_fields(&sample.id, fields).await?;
            tracing::debug!(id = %sample.id, "updated sample node set in place");
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
            self.raw.replace(&sample.id, replacement).await?;

            sample.version_history = history;
            tracing::debug!(id = %sample.id, "recorded sample version snapshot");
        }
        sample.updated_at = Some(now);
        Ok(())
    }

    /// Remove a sample document. With `remove_nodes`, every member node is
    /// removed through the cascade engine first (which may itself prune or
    /// delete this and other samples); nodes already gone by the time
    /// their turn comes are skipped.
    ///
    /// Like node removal, this is best-effort across documents; a failure
    /// partway is not rolled back.
    pub async fn remove(&self, id: &str, remove_nodes: bool, force: bool) -> Result<(), ViewError> {
        if !self.raw.exists(id).await? {
            if force {
                return Ok(());
            }
            return Err(ViewError::not_found(SAMPLE_LABEL, format!("id {id}")));
        }

        if remove_nodes {
            let sample = self.get_by_id(id).await?;
            for node in sample.nodes() {
                match cascade_remove(
                    self.raw.store(),
                    &self.config,
                    &node.node_ref(),
                    force,
                )
                .await
                {
                    Err(error) if error.is_not_found() => continue,
                    outcome => outcome?,
                }
            }
        }

        self.raw.delete(id).await?;
        tracing::info!(id, remove_nodes, "removed sample");
        Ok(())
    }

    /// First dependency of any member node that is neither part of the
    /// sample, nor persisted, nor whitelisted.
    async fn dependency_gap(
        &self,
        sample: &Sample,
        additional_incoming_node_ids: Option<&[String]>,
    ) -> Result<Option<String>, ViewError> {
        let mut upcoming: HashSet<String> = sample
            .nodes()
            .iter()
            .map(|node| node.id().to_string())
            .collect();
        if let Some(extra) = additional_incoming_node_ids {
            upcoming.extend(extra.iter().cloned());
        }

        for node in sample.nodes() {
            let core = node.core();
            for edge in core.upstream.iter().chain(core.downstream.iter()) {
                if upcoming.contains(&edge.node_id) {
                    continue;
                }
                let persisted = self
                    .raw
                    .store()
                    .count(edge.node_type.collection(), &Filter::by_id(&edge.node_id))
                    .await?
                    > 0;
                if !persisted {
                    return Ok(Some(format!(
                        "node {:?} depends on {edge}, which is neither part of this \
                         sample, nor in the database, nor in the additional incoming \
                         nodes list",
                        node.name()
                    )));
                }
            }
        }
        Ok(None)
    }

    async fn upsert_nodes(&self, sample: &mut Sample) -> Result<(), ViewError> {
        for node in sample.nodes_mut() {
            add_any(
                node,
                &self.materials,
                &self.actions,
                &self.measurements,
                &self.analyses,
                OnConflict::Update,
            )
            .await?;
        }
        Ok(())
    }

    async fn decode(&self, mut document: Document) -> Result<Sample, ViewError> {
        let id = take_string(&mut document, "_id", SAMPLE_LABEL)?;
        let name = take_string(&mut document, "name", SAMPLE_LABEL)?;
        let description = match document.remove("description") {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        let tags: Vec<String> = match document.remove("tags") {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| ViewError::decode(SAMPLE_LABEL, format!("tags: {e}")))?,
            None => Vec::new(),
        };
        let contents = match document.remove("contents") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let version_history = match document.remove("version_history") {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };
        let created_at = take_timestamp(&mut document, "created_at");
        let updated_at = take_timestamp(&mut document, "updated_at");

        let groups = match document.remove("nodes") {
            Some(Value::Object(map)) => map,
            other => {
                return Err(ViewError::decode(
                    SAMPLE_LABEL,
                    format!("nodes must be an object of id lists, got {other:?}"),
                ))
            }
        };

        let mut sample = Sample::new(name).with_description(description).with_tags(tags);
        sample.id = id;
        sample.contents = contents;
        sample.version_history = version_history;
        sample.created_at = created_at;
        sample.updated_at = updated_at;

        for node_type in NodeType::ALL {
            let Some(Value::Array(ids)) = groups.get(node_type.as_str()) else {
                continue;
            };
            for id in ids {
                let Some(id) = id.as_str() else {
                    return Err(ViewError::decode(
                        SAMPLE_LABEL,
                        format!("node ids must be strings, got {id}"),
                    ));
                };
                match node_type {
                    NodeType::Material => {
                        sample.add_node(self.materials.get_by_id(id).await?);
                    }
                    NodeType::Action => {
                        sample.add_node(self.actions.get_by_id(id).await?);
                    }
                    NodeType::Measurement => {
                        sample.add_node(self.measurements.get_by_id(id).await?);
                    }
                    NodeType::Analysis => {
                        sample.add_node(self.analyses.get_by_id(id).await?);
                    }
                }
            }
        }
        sample.sort_nodes();
        Ok(sample)
    }

    async fn decode_all(&self, documents: Vec<Document>) -> Result<Vec<Sample>, ViewError> {
        let mut samples = Vec::with_capacity(documents.len());
        for document in documents {
            samples.push(self.decode(document).await?);
        }
        Ok(samples)
    }
}
