//! Material nodes

use serde_json::Value;

use super::node::{GraphNode, InvalidNodeDefinition, NodeCore, NodeType};
use crate::config::CoreConfig;

/// A material in a given state.
///
/// Every Material is created by an Action; Measurements and further Actions
/// act on it downstream. The name is a human label and does not need to be
/// unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    core: NodeCore,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: NodeCore::new(name),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.core.tags = tags;
        self
    }

    /// Attach a user content value (e.g. a chemical formula).
    pub fn insert_content(&mut self, key: impl Into<String>, value: Value) {
        self.core.contents.insert(key.into(), value);
    }

    pub fn content(&self, key: &str) -> Option<&Value> {
        self.core.contents.get(key)
    }

    pub(crate) fn from_core(core: NodeCore) -> Self {
        Self { core }
    }
}

impl GraphNode for Material {
    const NODE_TYPE: NodeType = NodeType::Material;

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn check_valid(&self, _config: &CoreConfig) -> Result<(), InvalidNodeDefinition> {
        self.core.check_edges(Self::NODE_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::node::NodeRef;
    use serde_json::json;

    #[test]
    fn material_accepts_action_neighbors() {
        let config = CoreConfig::default();
        let mut material = Material::new("TiO2");
        material.add_upstream(NodeRef::new(NodeType::Action, "a-1"));
        material.add_downstream(NodeRef::new(NodeType::Measurement, "m-1"));
        assert!(material.check_valid(&config).is_ok());
    }

    #[test]
    fn material_rejects_material_neighbor() {
        let config = CoreConfig::default();
        let mut material = Material::new("TiO2");
        material.add_downstream(NodeRef::new(NodeType::Material, "m-2"));
        assert!(material.check_valid(&config).is_err());
    }

    #[test]
    fn contents_are_plain_json() {
        let mut material = Material::new("Titanium Dioxide");
        material.insert_content("formula", json!("TiO2"));
        assert_eq!(material.content("formula"), Some(&json!("TiO2")));
    }
}
