//! Graph-integrity engine: downstream closures and cascading removal
//!
//! A node's downstream closure has no independent existence once the node
//! is gone, so removal cascades: every node reachable via downstream edges
//! is deleted, every sample touching one of them is pruned or deleted, and
//! every remaining document that still references a deleted node is
//! scrubbed.
//!
//! The store is document-level atomic only. A failure partway through a
//! cascade is not rolled back: some affected documents are deleted, the
//! rest are not, and the scrub has run for exactly the deleted ones. This
//! is a documented limitation, not an invariant violation; re-running the
//! removal completes the cascade.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use super::codec::timestamp_value;
use super::error::ViewError;
use super::sample::{encode_node_groups, SampleView};
use crate::config::CoreConfig;
use crate::db::{Document, DocumentStore, Filter};
use crate::models::{NodeRef, NodeType, Sample};
use crate::time::truncated_now;

/// Everything a removal would take with it, surfaced before anything is
/// deleted so an interactive caller can confirm.
#[derive(Debug, Clone)]
pub struct RemovalPlan {
    pub target: NodeRef,
    /// Downstream closure of the target (the target itself excluded).
    pub affected_nodes: Vec<NodeRef>,
    /// Ids of samples referencing the target or any affected node.
    pub affected_samples: Vec<String>,
    /// Subset of `affected_samples` whose graph would no longer be a
    /// single connected acyclic component; these are deleted outright.
    pub invalidated_samples: Vec<String>,
}

impl RemovalPlan {
    /// Whether the removal touches anything beyond the target document.
    pub fn is_cascading(&self) -> bool {
        !self.affected_nodes.is_empty() || !self.affected_samples.is_empty()
    }
}

fn edge_refs(document: &Document, key: &str) -> Vec<NodeRef> {
    document
        .get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// The transitive downstream closure of `start`, deduplicated, excluding
/// `start` itself.
///
/// Walks raw documents only, so a half-broken graph can still be removed.
/// A reference whose document is already missing stays in the closure: its
/// residual edge references still need scrubbing.
pub(crate) async fn downstream_closure(
    store: &Arc<dyn DocumentStore>,
    start: &NodeRef,
) -> Result<Vec<NodeRef>, ViewError> {
    let mut visited: HashSet<NodeRef> = HashSet::new();
    let mut closure: Vec<NodeRef> = Vec::new();
    let mut stack: Vec<NodeRef> = Vec::new();

    if let Some(document) = store
        .find_one(start.node_type.collection(), &Filter::by_id(&start.node_id))
        .await?
    {
        stack.extend(edge_refs(&document, "downstream"));
    }

    while let Some(reference) = stack.pop() {
        if reference == *start || !visited.insert(reference.clone()) {
            continue;
        }
        if let Some(document) = store
            .find_one(
                reference.node_type.collection(),
                &Filter::by_id(&reference.node_id),
            )
            .await?
        {
            stack.extend(edge_refs(&document, "downstream"));
        }
        closure.push(reference);
    }
    Ok(closure)
}

/// Raw sample documents referencing the given node.
async fn sample_documents_referencing(
    store: &Arc<dyn DocumentStore>,
    reference: &NodeRef,
) -> Result<Vec<Document>, ViewError> {
    let filter = Filter::new().field(
        format!("nodes.{}", reference.node_type),
        Value::String(reference.node_id.clone()),
    );
    Ok(store.find("samples", &filter).await?)
}

/// Compute the full removal plan for `target`, returning it together with
/// the affected samples already stripped of every to-be-deleted node (for
/// the post-deletion sample updates).
pub(crate) async fn build_removal_plan(
    store: &Arc<dyn DocumentStore>,
    config: &CoreConfig,
    target: &NodeRef,
) -> Result<(RemovalPlan, Vec<Sample>), ViewError> {
    let affected_nodes = downstream_closure(store, target).await?;

    let mut removed_ids: HashSet<&str> = HashSet::new();
    removed_ids.insert(target.node_id.as_str());
    for reference in &affected_nodes {
        removed_ids.insert(reference.node_id.as_str());
    }

    // union of all samples referencing the target or any affected node
    let sample_view = SampleView::new(Arc::clone(store), config.clone());
    let mut sample_ids: Vec<String> = Vec::new();
    for reference in std::iter::once(target).chain(affected_nodes.iter()) {
        for document in sample_documents_referencing(store, reference).await? {
            if let Some(id) = document.get("_id").and_then(Value::as_str) {
                if !sample_ids.iter().any(|existing| existing == id) {
                    sample_ids.push(id.to_string());
                }
            }
        }
    }

    let mut stripped_samples = Vec::with_capacity(sample_ids.len());
    let mut invalidated_samples = Vec::new();
    for sample_id in &sample_ids {
        let mut sample = sample_view.get_by_id(sample_id).await?;
        sample
            .nodes_mut()
            .retain(|node| !removed_ids.contains(node.id()));
        for node in sample.nodes_mut() {
            let core = node.core_mut();
            core.upstream
                .retain(|edge| !removed_ids.contains(edge.node_id.as_str()));
            core.downstream
                .retain(|edge| !removed_ids.contains(edge.node_id.as_str()));
        }
        if !sample.has_valid_graph() {
            invalidated_samples.push(sample_id.clone());
        }
        stripped_samples.push(sample);
    }

    Ok((
        RemovalPlan {
            target: target.clone(),
            affected_nodes,
            affected_samples: sample_ids,
            invalidated_samples,
        },
        stripped_samples,
    ))
}

/// Pull every edge and sample reference to the given node, store-wide.
///
/// One update-many per node collection per direction, plus one for the
/// sample node lists. These are the only multi-document writes the engine
/// issues.
pub(crate) async fn scrub_references(
    store: &Arc<dyn DocumentStore>,
    reference: &NodeRef,
) -> Result<(), ViewError> {
    let element = serde_json::to_value(reference).map_err(|e| {
        ViewError::decode(reference.node_type.as_str(), format!("edge encode: {e}"))
    })?;
    let mut scrubbed = 0;
    for node_type in NodeType::ALL {
        scrubbed += store
            .pull_all(node_type.collection(), "upstream", &element)
            .await?;
        scrubbed += store
            .pull_all(node_type.collection(), "downstream", &element)
            .await?;
    }
    scrubbed += store
        .pull_all(
            "samples",
            &format!("nodes.{}", reference.node_type),
            &Value::String(reference.node_id.clone()),
        )
        .await?;
    if scrubbed > 0 {
        tracing::debug!(%reference, scrubbed, "scrubbed dangling references");
    }
    Ok(())
}

/// Remove `target` and its downstream closure, repairing every reference.
///
/// With `force = false`: a missing target is NotFound, and a cascading
/// removal is refused with [`ViewError::ConfirmationRequired`] carrying
/// the plan counts. With `force = true`: a missing target is a no-op and
/// the cascade runs without confirmation.
pub(crate) async fn cascade_remove(
    store: &Arc<dyn DocumentStore>,
    config: &CoreConfig,
    target: &NodeRef,
    force: bool,
) -> Result<(), ViewError> {
    let exists = store
        .count(target.node_type.collection(), &Filter::by_id(&target.node_id))
        .await?
        > 0;
    if !exists {
        if force {
            return Ok(());
        }
        return Err(ViewError::not_found(
            target.node_type.as_str(),
            format!("id {}", target.node_id),
        ));
    }

    let (plan, stripped_samples) = build_removal_plan(store, config, target).await?;
    if !plan.is_cascading() {
        store
            .delete_one(target.node_type.collection(), &target.node_id)
            .await?;
        tracing::info!(node = %plan.target, "removed node");
        return Ok(());
    }
    if !force {
        return Err(ViewError::ConfirmationRequired {
            affected_nodes: plan.affected_nodes.len(),
            affected_samples: plan.affected_samples.len(),
            invalidated_samples: plan.invalidated_samples.len(),
        });
    }

    // delete the closure and the target, scrubbing references as we go
    for reference in plan.affected_nodes.iter().chain(std::iter::once(target)) {
        store
            .delete_one(reference.node_type.collection(), &reference.node_id)
            .await?;
        scrub_references(store, reference).await?;
    }

    // invalidated samples are deleted outright; survivors get their pruned
    // node sets written back
    let now = truncated_now();
    for sample in &stripped_samples {
        if plan.invalidated_samples.contains(&sample.id) {
            store.delete_one("samples", &sample.id).await?;
            continue;
        }
        let mut fields = Document::new();
        fields.insert("nodes".to_string(), encode_node_groups(sample));
        fields.insert("updated_at".to_string(), timestamp_value(now));
        store.update_fields("samples", &sample.id, fields).await?;
    }

    tracing::info!(
        node = %plan.target,
        affected_nodes = plan.affected_nodes.len(),
        deleted_samples = plan.invalidated_samples.len(),
        updated_samples = plan.affected_samples.len() - plan.invalidated_samples.len(),
        "cascading removal complete"
    );
    Ok(())
}
