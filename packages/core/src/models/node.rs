//! Core node data structures
//!
//! This module defines the shared building blocks of the provenance DAG:
//!
//! - [`NodeType`] - the four node variants and their collection mapping
//! - [`NodeRef`] - a persisted `(node_type, node_id)` edge entry
//! - [`EdgeList`] - an ordered, deduplicated list of edges in one direction
//! - [`NodeCore`] - identity, tags, edges, user content and version history
//!   shared by every node variant
//! - [`GraphNode`] - the trait each variant implements, including the
//!   write-time adjacency validation
//!
//! # Edge ownership
//!
//! Each node owns two independent directed edge sets (`upstream`,
//! `downstream`). Edges reference neighbors by id only; resolution always
//! goes through a view lookup, never a live object pointer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::config::CoreConfig;

/// Document fields managed by the persistence layer. User content keys must
/// not shadow any of these.
pub const RESERVED_FIELDS: &[&str] = &[
    "_id",
    "name",
    "tags",
    "upstream",
    "downstream",
    "actor_id",
    "ingredients",
    "contents",
    "version_history",
    "created_at",
    "updated_at",
];

/// The four node variants of the provenance schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Material,
    Action,
    Measurement,
    Analysis,
}

impl NodeType {
    /// Collection this node type is persisted in.
    pub fn collection(&self) -> &'static str {
        match self {
            NodeType::Material => "materials",
            NodeType::Action => "actions",
            NodeType::Measurement => "measurements",
            NodeType::Analysis => "analyses",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Material => "Material",
            NodeType::Action => "Action",
            NodeType::Measurement => "Measurement",
            NodeType::Analysis => "Analysis",
        }
    }

    /// All node types, in the order used for grouped sample documents.
    pub const ALL: [NodeType; 4] = [
        NodeType::Material,
        NodeType::Action,
        NodeType::Measurement,
        NodeType::Analysis,
    ];
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an adjacency edge relative to the node that stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    Upstream,
    Downstream,
}

impl fmt::Display for EdgeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeDirection::Upstream => f.write_str("upstream"),
            EdgeDirection::Downstream => f.write_str("downstream"),
        }
    }
}

/// A persisted edge entry: the type and id of a neighboring node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub node_type: NodeType,
    pub node_id: String,
}

impl NodeRef {
    pub fn new(node_type: NodeType, node_id: impl Into<String>) -> Self {
        Self {
            node_type,
            node_id: node_id.into(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.node_type, self.node_id)
    }
}

/// An ordered, deduplicated collection of edges in one direction.
///
/// `append` is idempotent: adding an entry that is already present is a
/// no-op. Entries are never removed through the normal update path; edge
/// removal is the exclusive business of the cascade-delete engine, which is
/// why [`EdgeList::retain`] is crate-private.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeList {
    entries: Vec<NodeRef>,
}

impl EdgeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an edge entry. Returns `true` if the entry was new, `false`
    /// if it was already present (in which case the list is unchanged).
    pub fn append(&mut self, entry: NodeRef) -> bool {
        if self.entries.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn contains(&self, entry: &NodeRef) -> bool {
        self.entries.contains(entry)
    }

    pub fn get(&self, index: usize) -> Option<&NodeRef> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRef> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Strip entries in place. Reserved for the cascade-delete engine.
    pub(crate) fn retain(&mut self, keep: impl FnMut(&NodeRef) -> bool) {
        self.entries.retain(keep);
    }
}

impl<'a> IntoIterator for &'a EdgeList {
    type Item = &'a NodeRef;
    type IntoIter = std::slice::Iter<'a, NodeRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A node's edges or required relations violate the fixed adjacency schema.
///
/// Raised eagerly at write time, never lazily.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidNodeDefinition {
    #[error(
        "{node_type} {name:?}: {direction} edge to {target} is not allowed \
         ({direction} neighbors of a {node_type} must be one of [{allowed}])"
    )]
    DisallowedEdge {
        node_type: NodeType,
        name: String,
        direction: EdgeDirection,
        target: NodeRef,
        allowed: String,
    },

    #[error("Measurement {name:?} must have exactly one upstream Material, found {count}")]
    MeasurementUpstreamCount { name: String, count: usize },

    #[error("Action {name:?} has neither ingredients nor generated materials")]
    ActionWithoutEdges { name: String },

    #[error("Action {name:?} already has generated materials, cannot add a generic output")]
    GeneratedMaterialsAlreadyDeclared { name: String },

    #[error("Analysis {name:?} has no upstream measurements or analyses")]
    AnalysisWithoutSources { name: String },

    #[error("{node_type} {name:?} references no {relation}")]
    MissingActorRelation {
        node_type: NodeType,
        name: String,
        relation: &'static str,
    },
}

/// A user content key shadows a reserved document field.
///
/// Caught before serialization, not at the store.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("user field {field:?} on {entity} {name:?} collides with a reserved document field")]
pub struct FieldNameCollision {
    pub entity: &'static str,
    pub name: String,
    pub field: String,
}

/// Allowed neighbor types per the fixed adjacency schema.
pub fn allowed_neighbors(node_type: NodeType, direction: EdgeDirection) -> &'static [NodeType] {
    use EdgeDirection::*;
    use NodeType::*;
    match (node_type, direction) {
        (Material, Upstream) => &[Action],
        (Material, Downstream) => &[Action, Measurement],
        (Action, Upstream) => &[Material],
        (Action, Downstream) => &[Material, Measurement],
        (Measurement, Upstream) => &[Material],
        (Measurement, Downstream) => &[Analysis],
        (Analysis, Upstream) => &[Measurement, Analysis],
        (Analysis, Downstream) => &[Analysis],
    }
}

/// Identity, labeling, edges, user content and version history shared by
/// every node variant.
///
/// `created_at` / `updated_at` stay `None` until the node is first
/// persisted; an absent timestamp means "not yet saved".
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCore {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub upstream: EdgeList,
    pub downstream: EdgeList,
    pub contents: Map<String, Value>,
    pub version_history: Vec<Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NodeCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            tags: Vec::new(),
            upstream: EdgeList::new(),
            downstream: EdgeList::new(),
            contents: Map::new(),
            version_history: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Whether this node has been persisted at least once.
    pub fn is_persisted(&self) -> bool {
        self.created_at.is_some()
    }

    /// Validate every edge against the adjacency schema for `node_type`.
    pub(crate) fn check_edges(&self, node_type: NodeType) -> Result<(), InvalidNodeDefinition> {
        for (direction, edges) in [
            (EdgeDirection::Upstream, &self.upstream),
            (EdgeDirection::Downstream, &self.downstream),
        ] {
            let allowed = allowed_neighbors(node_type, direction);
            for edge in edges {
                if !allowed.contains(&edge.node_type) {
                    return Err(InvalidNodeDefinition::DisallowedEdge {
                        node_type,
                        name: self.name.clone(),
                        direction,
                        target: edge.clone(),
                        allowed: allowed
                            .iter()
                            .map(|t| t.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    });
                }
            }
        }
        Ok(())
    }

    /// Reject user content keys that shadow reserved document fields.
    pub(crate) fn check_contents(&self, entity: &'static str) -> Result<(), FieldNameCollision> {
        for key in self.contents.keys() {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                return Err(FieldNameCollision {
                    entity,
                    name: self.name.clone(),
                    field: key.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Behavior common to the four node variants.
pub trait GraphNode {
    const NODE_TYPE: NodeType;

    fn core(&self) -> &NodeCore;
    fn core_mut(&mut self) -> &mut NodeCore;

    /// Validate the node's edges and required relations against the fixed
    /// schema. Runs at write time, before any document is touched.
    fn check_valid(&self, config: &CoreConfig) -> Result<(), InvalidNodeDefinition>;

    fn id(&self) -> &str {
        &self.core().id
    }

    fn name(&self) -> &str {
        &self.core().name
    }

    fn node_ref(&self) -> NodeRef {
        NodeRef::new(Self::NODE_TYPE, self.core().id.clone())
    }

    /// Record an edge on this node's side only. The caller is responsible
    /// for the mirror entry on the neighbor.
    fn add_upstream(&mut self, entry: NodeRef) -> bool {
        self.core_mut().upstream.append(entry)
    }

    fn add_downstream(&mut self, entry: NodeRef) -> bool {
        self.core_mut().downstream.append(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat_ref(id: &str) -> NodeRef {
        NodeRef::new(NodeType::Material, id)
    }

    #[test]
    fn edge_append_is_idempotent() {
        let mut edges = EdgeList::new();
        assert!(edges.append(mat_ref("a")));
        let len_after_first = edges.len();
        assert!(!edges.append(mat_ref("a")));
        assert_eq!(edges.len(), len_after_first);
        assert!(edges.append(mat_ref("b")));
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn edge_list_preserves_insertion_order() {
        let mut edges = EdgeList::new();
        edges.append(mat_ref("a"));
        edges.append(NodeRef::new(NodeType::Action, "b"));
        edges.append(mat_ref("c"));
        let ids: Vec<_> = edges.iter().map(|e| e.node_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn edge_list_serializes_as_array_of_refs() {
        let mut edges = EdgeList::new();
        edges.append(mat_ref("m-1"));
        let value = serde_json::to_value(&edges).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{"node_type": "Material", "node_id": "m-1"}])
        );
        let back: EdgeList = serde_json::from_value(value).unwrap();
        assert_eq!(back, edges);
    }

    #[test]
    fn adjacency_table_matches_schema() {
        assert_eq!(
            allowed_neighbors(NodeType::Material, EdgeDirection::Upstream),
            &[NodeType::Action]
        );
        assert_eq!(
            allowed_neighbors(NodeType::Measurement, EdgeDirection::Downstream),
            &[NodeType::Analysis]
        );
        assert!(allowed_neighbors(NodeType::Analysis, EdgeDirection::Upstream)
            .contains(&NodeType::Analysis));
    }

    #[test]
    fn check_edges_rejects_disallowed_neighbor() {
        let mut core = NodeCore::new("powder");
        core.upstream.append(mat_ref("other"));
        // Material upstream must be an Action
        let err = core.check_edges(NodeType::Material).unwrap_err();
        assert!(matches!(err, InvalidNodeDefinition::DisallowedEdge { .. }));
    }

    #[test]
    fn check_edges_agrees_with_table_for_every_combination() {
        for node_type in NodeType::ALL {
            for direction in [EdgeDirection::Upstream, EdgeDirection::Downstream] {
                for target_type in NodeType::ALL {
                    let mut core = NodeCore::new("probe");
                    let edge = NodeRef::new(target_type, "target-id");
                    match direction {
                        EdgeDirection::Upstream => core.upstream.append(edge),
                        EdgeDirection::Downstream => core.downstream.append(edge),
                    };
                    let allowed =
                        allowed_neighbors(node_type, direction).contains(&target_type);
                    assert_eq!(
                        core.check_edges(node_type).is_ok(),
                        allowed,
                        "{node_type} {direction} {target_type}"
                    );
                }
            }
        }
    }

    #[test]
    fn check_contents_rejects_reserved_keys() {
        let mut core = NodeCore::new("powder");
        core.contents
            .insert("upstream".to_string(), Value::from(true));
        let err = core.check_contents("Material").unwrap_err();
        assert_eq!(err.field, "upstream");
    }

    #[test]
    fn fresh_core_is_unpersisted() {
        let core = NodeCore::new("powder");
        assert!(!core.is_persisted());
        assert!(!core.id.is_empty());
    }
}
