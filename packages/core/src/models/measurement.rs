//! Measurement nodes

use serde_json::Value;

use super::actor::{Actor, HasActors};
use super::material::Material;
use super::node::{GraphNode, InvalidNodeDefinition, NodeCore, NodeType};
use crate::config::CoreConfig;

/// Raw characterization of exactly one Material, performed by an Actor.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    core: NodeCore,
    actor_ids: Vec<String>,
}

impl Measurement {
    /// Create a Measurement of `material`, wiring the upstream edge here
    /// and the downstream edge on the caller's Material.
    pub fn new(name: impl Into<String>, material: &mut Material, actor: &Actor) -> Self {
        let mut measurement = Self {
            core: NodeCore::new(name),
            actor_ids: vec![actor.id().to_string()],
        };
        measurement.add_upstream(material.node_ref());
        material.add_downstream(measurement.node_ref());
        measurement
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.core.tags = tags;
        self
    }

    pub fn insert_content(&mut self, key: impl Into<String>, value: Value) {
        self.core.contents.insert(key.into(), value);
    }

    pub fn content(&self, key: &str) -> Option<&Value> {
        self.core.contents.get(key)
    }

    pub(crate) fn from_parts(core: NodeCore, actor_ids: Vec<String>) -> Self {
        Self { core, actor_ids }
    }
}

impl GraphNode for Measurement {
    const NODE_TYPE: NodeType = NodeType::Measurement;

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn check_valid(&self, _config: &CoreConfig) -> Result<(), InvalidNodeDefinition> {
        self.core.check_edges(Self::NODE_TYPE)?;
        if self.core.upstream.len() != 1 {
            return Err(InvalidNodeDefinition::MeasurementUpstreamCount {
                name: self.name().to_string(),
                count: self.core.upstream.len(),
            });
        }
        if self.actor_ids.is_empty() {
            return Err(InvalidNodeDefinition::MissingActorRelation {
                node_type: Self::NODE_TYPE,
                name: self.name().to_string(),
                relation: "actor",
            });
        }
        Ok(())
    }
}

impl HasActors for Measurement {
    fn actor_ids(&self) -> &[String] {
        &self.actor_ids
    }

    fn add_actor_id(&mut self, id: String) {
        if !self.actor_ids.contains(&id) {
            self.actor_ids.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::node::NodeRef;

    #[test]
    fn measurement_requires_exactly_one_upstream_material() {
        let config = CoreConfig::default();
        let actor = Actor::new("Aeris", "Benchtop diffractometer");
        let mut pellet = Material::new("pellet");
        let mut xrd = Measurement::new("XRD pattern", &mut pellet, &actor);
        assert!(xrd.check_valid(&config).is_ok());

        xrd.add_upstream(NodeRef::new(NodeType::Material, "other-material"));
        assert!(matches!(
            xrd.check_valid(&config),
            Err(InvalidNodeDefinition::MeasurementUpstreamCount { count: 2, .. })
        ));
    }

    #[test]
    fn measurement_wires_material_downstream() {
        let actor = Actor::new("Aeris", "Benchtop diffractometer");
        let mut pellet = Material::new("pellet");
        let xrd = Measurement::new("XRD pattern", &mut pellet, &actor);
        assert!(pellet.core().downstream.contains(&xrd.node_ref()));
    }
}
