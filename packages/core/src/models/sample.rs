//! Samples: connected subgraphs grouped into one experimental record
//!
//! A Sample references a set of nodes that together describe one
//! experiment. It owns no nodes (nodes live in their own collections) but
//! the referenced set must form a single connected, acyclic graph. The
//! graph checks and the topological node ordering are petgraph-backed.

use petgraph::algo::{connected_components, is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use super::action::Action;
use super::any_node::AnyNode;
use super::material::Material;
use super::node::{FieldNameCollision, GraphNode, InvalidNodeDefinition, NodeType, RESERVED_FIELDS};
use chrono::{DateTime, Utc};

/// A linear process could not be stitched into a valid chain.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinearProcessError {
    #[error(
        "every Action of a linear process except the final one must generate \
         at most one material; {name:?} generates {count}"
    )]
    TooManyOutputs { name: String, count: usize },

    #[error(
        "no ingredient of {action:?} was generated by the preceding Action \
         {previous:?}; consecutive Actions of a linear process must share a material"
    )]
    DisconnectedStep { action: String, previous: String },

    #[error(transparent)]
    Node(#[from] InvalidNodeDefinition),
}

/// A named, connected, acyclic subset of nodes representing one
/// experimental record.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub contents: Map<String, Value>,
    pub version_history: Vec<Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    nodes: Vec<AnyNode>,
}

impl Sample {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            contents: Map::new(),
            version_history: Vec::new(),
            created_at: None,
            updated_at: None,
            nodes: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn insert_content(&mut self, key: impl Into<String>, value: Value) {
        self.contents.insert(key.into(), value);
    }

    pub fn content(&self, key: &str) -> Option<&Value> {
        self.contents.get(key)
    }

    pub fn nodes(&self) -> &[AnyNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<AnyNode> {
        &mut self.nodes
    }

    /// Whether this sample has been persisted at least once.
    pub fn is_persisted(&self) -> bool {
        self.created_at.is_some()
    }

    /// Add a node to this sample. Re-adding a node that is already present
    /// (by id) is a no-op.
    pub fn add_node(&mut self, node: impl Into<AnyNode>) {
        let node = node.into();
        if self.nodes.iter().any(|existing| existing.id() == node.id()) {
            return;
        }
        self.nodes.push(node);
    }

    /// Node ids grouped by type, in the shape of the persisted `nodes`
    /// field.
    pub fn node_ids_by_type(&self) -> HashMap<NodeType, Vec<String>> {
        let mut grouped: HashMap<NodeType, Vec<String>> = NodeType::ALL
            .iter()
            .map(|node_type| (*node_type, Vec::new()))
            .collect();
        for node in &self.nodes {
            grouped
                .entry(node.node_type())
                .or_default()
                .push(node.id().to_string());
        }
        grouped
    }

    /// Build the directed graph induced by this sample's nodes, including
    /// one-hop neighbors referenced by their edge lists.
    fn graph(&self) -> DiGraph<String, ()> {
        let mut graph = DiGraph::new();
        let mut indices: HashMap<String, NodeIndex> = HashMap::new();

        let mut index_of = |graph: &mut DiGraph<String, ()>, id: &str| -> NodeIndex {
            if let Some(index) = indices.get(id) {
                return *index;
            }
            let index = graph.add_node(id.to_string());
            indices.insert(id.to_string(), index);
            index
        };

        for node in &self.nodes {
            let this = index_of(&mut graph, node.id());
            for upstream in &node.core().upstream {
                let other = index_of(&mut graph, &upstream.node_id);
                graph.update_edge(other, this, ());
            }
            for downstream in &node.core().downstream {
                let other = index_of(&mut graph, &downstream.node_id);
                graph.update_edge(this, other, ());
            }
        }
        graph
    }

    /// True iff the node-induced graph is acyclic and forms exactly one
    /// connected component (edges treated as undirected for connectivity).
    pub fn has_valid_graph(&self) -> bool {
        let graph = self.graph();
        if graph.node_count() == 0 {
            return false;
        }
        !is_cyclic_directed(&graph) && connected_components(&graph) == 1
    }

    /// Sort the node list in graph-hierarchical (topological) order. Leaves
    /// the order untouched if the graph is cyclic.
    pub fn sort_nodes(&mut self) {
        let graph = self.graph();
        let Ok(order) = toposort(&graph, None) else {
            return;
        };
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(rank, index)| (graph[*index].as_str(), rank))
            .collect();
        self.nodes
            .sort_by_key(|node| position.get(node.id()).copied().unwrap_or(usize::MAX));
    }

    /// Stitch a series of Actions into a chain where each Action's single
    /// output material feeds the next Action.
    ///
    /// Actions that declare no output get a generically named intermediate
    /// material; Actions without explicit ingredients consume the whole
    /// output of the preceding step. The chained Actions, the first
    /// Action's ingredient materials, every intermediate material, and the
    /// final output materials are all added to this sample.
    pub fn add_linear_process(&mut self, mut actions: Vec<Action>) -> Result<(), LinearProcessError> {
        if actions.is_empty() {
            return Ok(());
        }

        for action in &actions[..actions.len() - 1] {
            if action.generated_materials().len() > 1 {
                return Err(LinearProcessError::TooManyOutputs {
                    name: action.name().to_string(),
                    count: action.generated_materials().len(),
                });
            }
        }
        for pair in actions.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);
            if current.ingredients().is_empty() {
                continue; // will consume the previous step's output below
            }
            let connected = current.ingredients().iter().any(|ingredient| {
                previous
                    .generated_materials()
                    .iter()
                    .any(|material| material.id() == ingredient.material_id())
            });
            if !connected {
                return Err(LinearProcessError::DisconnectedStep {
                    action: current.name().to_string(),
                    previous: previous.name().to_string(),
                });
            }
        }

        // Wire the whole chain before adding anything, so no node is added
        // from a clone that a later step still mutates.
        let mut intermediates: Vec<Material> = Vec::new();
        for i in 0..actions.len() - 1 {
            let (left, right) = actions.split_at_mut(i + 1);
            let previous = &mut left[i];
            let current = &mut right[0];

            let mut intermediate = if previous.generated_materials().is_empty() {
                previous.make_generic_generated_material(None)?
            } else {
                previous.generated_materials()[0].clone()
            };
            if current.ingredients().is_empty() {
                current.add_whole_ingredient(&mut intermediate, None);
            }
            // Clones taken before wiring may miss a mirror edge; the
            // idempotent appends make the intermediate authoritative.
            intermediate.add_upstream(previous.node_ref());
            intermediate.add_downstream(current.node_ref());
            intermediates.push(intermediate);
        }

        let last = actions.last_mut().expect("non-empty action chain");
        if last.generated_materials().is_empty() {
            last.make_generic_generated_material(None)?;
        }
        let last_ref = last.node_ref();
        let outputs: Vec<Material> = last
            .generated_materials()
            .iter()
            .map(|material| {
                let mut output = material.clone();
                output.add_upstream(last_ref.clone());
                output
            })
            .collect();

        for ingredient in actions[0].ingredients() {
            self.add_node(ingredient.material.clone());
        }
        for (i, action) in actions.iter().enumerate() {
            self.add_node(action.clone());
            if let Some(intermediate) = intermediates.get(i) {
                self.add_node(intermediate.clone());
            }
        }
        for output in outputs {
            self.add_node(output);
        }
        Ok(())
    }

    pub(crate) fn check_contents(&self) -> Result<(), FieldNameCollision> {
        for key in self.contents.keys() {
            if RESERVED_FIELDS.contains(&key.as_str())
                || key == "description"
                || key == "nodes"
            {
                return Err(FieldNameCollision {
                    entity: "Sample",
                    name: self.name.clone(),
                    field: key.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::actor::Actor;
    use crate::models::material::Material;
    use crate::models::measurement::Measurement;

    fn operator() -> Actor {
        Actor::new("Operator", "A human operator")
    }

    #[test]
    fn empty_sample_has_no_valid_graph() {
        let sample = Sample::new("empty");
        assert!(!sample.has_valid_graph());
    }

    #[test]
    fn add_node_is_idempotent() {
        let mut sample = Sample::new("s");
        let material = Material::new("TiO2");
        sample.add_node(material.clone());
        sample.add_node(material);
        assert_eq!(sample.nodes().len(), 1);
    }

    #[test]
    fn disjoint_pairs_break_connectivity() {
        let actor = operator();

        let mut a = Material::new("A");
        let mut make_a = Action::new("make A", &actor);
        make_a.add_generated_material(&mut a);

        let mut b = Material::new("B");
        let mut make_b = Action::new("make B", &actor);
        make_b.add_generated_material(&mut b);

        let mut sample = Sample::new("disjoint");
        sample.add_node(a.clone());
        sample.add_node(make_a);
        sample.add_node(b.clone());
        sample.add_node(make_b);
        assert!(!sample.has_valid_graph());

        // a connecting action joins the two components
        let mut combine = Action::new("combine", &actor);
        combine.add_whole_ingredient(&mut a, None);
        combine.add_whole_ingredient(&mut b, None);
        let mut sample = Sample::new("joined");
        sample.add_node(a);
        sample.add_node(b);
        sample.add_node(combine);
        assert!(sample.has_valid_graph());
    }

    #[test]
    fn directed_cycle_invalidates_graph() {
        let actor = operator();
        let mut powder = Material::new("powder");
        let mut grind = Action::new("grind", &actor);
        grind.add_whole_ingredient(&mut powder, None);
        // force a cycle: the action also "generates" its own ingredient
        grind.add_generated_material(&mut powder);

        let mut sample = Sample::new("cyclic");
        sample.add_node(powder);
        sample.add_node(grind);
        assert!(!sample.has_valid_graph());
    }

    #[test]
    fn linear_process_synthesizes_intermediates() {
        let actor = operator();
        let mut tio2 = Material::new("TiO2");
        let mut procure = Action::new("procurement", &actor);
        procure.add_generated_material(&mut tio2);

        let mut grind = Action::new("grind", &actor);
        grind.add_whole_ingredient(&mut tio2, None);
        let sinter = Action::new("sinter", &actor);
        let regrind = Action::new("grind", &actor);

        let mut sample = Sample::new("chain");
        sample.add_node(tio2);
        sample.add_node(procure);
        sample
            .add_linear_process(vec![grind, sinter, regrind])
            .unwrap();

        assert!(sample.has_valid_graph());
        // 2 seed nodes + 3 actions + 2 intermediates + 1 final output
        assert_eq!(sample.nodes().len(), 8);
        let generic_names: Vec<_> = sample
            .nodes()
            .iter()
            .filter(|node| node.node_type() == NodeType::Material)
            .map(|node| node.name().to_string())
            .collect();
        assert!(generic_names.contains(&"TiO2 - grind".to_string()));
    }

    #[test]
    fn linear_process_rejects_disconnected_steps() {
        let actor = operator();
        let mut tio2 = Material::new("TiO2");
        let mut unrelated = Material::new("ZrO2");

        let mut grind = Action::new("grind", &actor);
        grind.add_whole_ingredient(&mut tio2, None);
        let mut sinter = Action::new("sinter", &actor);
        sinter.add_whole_ingredient(&mut unrelated, None);

        let mut sample = Sample::new("broken chain");
        let err = sample.add_linear_process(vec![grind, sinter]).unwrap_err();
        assert!(matches!(err, LinearProcessError::DisconnectedStep { .. }));
    }

    #[test]
    fn sort_nodes_is_topological() {
        let actor = operator();
        let mut tio2 = Material::new("TiO2");
        let mut procure = Action::new("procurement", &actor);
        procure.add_generated_material(&mut tio2);
        let xrd = Measurement::new("XRD", &mut tio2, &actor);

        let mut sample = Sample::new("ordered");
        // insert in reverse
        sample.add_node(xrd.clone());
        sample.add_node(tio2.clone());
        sample.add_node(procure.clone());
        sample.sort_nodes();

        let ids: Vec<_> = sample.nodes().iter().map(|n| n.id().to_string()).collect();
        let pos = |id: &str| ids.iter().position(|x| x == id).unwrap();
        assert!(pos(procure.id()) < pos(tio2.id()));
        assert!(pos(tio2.id()) < pos(xrd.id()));
    }
}
