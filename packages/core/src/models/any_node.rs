//! Type-erased node values
//!
//! [`AnyNode`] carries one node of any of the four variants. It is what
//! lazy edge resolution returns and what a Sample's node set is made of.

use super::action::Action;
use super::analysis::Analysis;
use super::material::Material;
use super::measurement::Measurement;
use super::node::{GraphNode, InvalidNodeDefinition, NodeCore, NodeRef, NodeType};
use crate::config::CoreConfig;

/// One node of any variant.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyNode {
    Material(Material),
    Action(Action),
    Measurement(Measurement),
    Analysis(Analysis),
}

impl AnyNode {
    pub fn node_type(&self) -> NodeType {
        match self {
            AnyNode::Material(_) => NodeType::Material,
            AnyNode::Action(_) => NodeType::Action,
            AnyNode::Measurement(_) => NodeType::Measurement,
            AnyNode::Analysis(_) => NodeType::Analysis,
        }
    }

    pub fn core(&self) -> &NodeCore {
        match self {
            AnyNode::Material(node) => node.core(),
            AnyNode::Action(node) => node.core(),
            AnyNode::Measurement(node) => node.core(),
            AnyNode::Analysis(node) => node.core(),
        }
    }

    pub(crate) fn core_mut(&mut self) -> &mut NodeCore {
        match self {
            AnyNode::Material(node) => node.core_mut(),
            AnyNode::Action(node) => node.core_mut(),
            AnyNode::Measurement(node) => node.core_mut(),
            AnyNode::Analysis(node) => node.core_mut(),
        }
    }

    pub fn id(&self) -> &str {
        &self.core().id
    }

    pub fn name(&self) -> &str {
        &self.core().name
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.node_type(), self.id())
    }

    pub fn check_valid(&self, config: &CoreConfig) -> Result<(), InvalidNodeDefinition> {
        match self {
            AnyNode::Material(node) => node.check_valid(config),
            AnyNode::Action(node) => node.check_valid(config),
            AnyNode::Measurement(node) => node.check_valid(config),
            AnyNode::Analysis(node) => node.check_valid(config),
        }
    }

    pub fn as_material(&self) -> Option<&Material> {
        match self {
            AnyNode::Material(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&Action> {
        match self {
            AnyNode::Action(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_measurement(&self) -> Option<&Measurement> {
        match self {
            AnyNode::Measurement(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_analysis(&self) -> Option<&Analysis> {
        match self {
            AnyNode::Analysis(node) => Some(node),
            _ => None,
        }
    }
}

impl From<Material> for AnyNode {
    fn from(node: Material) -> Self {
        AnyNode::Material(node)
    }
}

impl From<Action> for AnyNode {
    fn from(node: Action) -> Self {
        AnyNode::Action(node)
    }
}

impl From<Measurement> for AnyNode {
    fn from(node: Measurement) -> Self {
        AnyNode::Measurement(node)
    }
}

impl From<Analysis> for AnyNode {
    fn from(node: Analysis) -> Self {
        AnyNode::Analysis(node)
    }
}
