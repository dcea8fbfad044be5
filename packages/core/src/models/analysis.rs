//! Analysis nodes

use serde_json::Value;

use super::actor::{AnalysisMethod, HasActors};
use super::measurement::Measurement;
use super::node::{GraphNode, InvalidNodeDefinition, NodeCore, NodeType};
use crate::config::CoreConfig;

/// Data processing over upstream Measurements and/or Analyses.
///
/// A "Density" Analysis might combine "Mass" and "Volume" measurements, and
/// a downstream Analysis can build on it in turn. Whether an Analysis may
/// exist with no upstream sources at all (simulation or ML output) is
/// governed by [`CoreConfig::allow_sourceless_analysis`].
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    core: NodeCore,
    method_ids: Vec<String>,
}

impl Analysis {
    pub fn new(name: impl Into<String>, method: &AnalysisMethod) -> Self {
        Self {
            core: NodeCore::new(name),
            method_ids: vec![method.id().to_string()],
        }
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

    /// Base this Analysis on a Measurement, wiring both edge sets.
    pub fn add_measurement(&mut self, measurement: &mut Measurement) {
        self.add_upstream(measurement.node_ref());
        measurement.add_downstream(self.node_ref());
    }

    /// Base this Analysis on another Analysis, wiring both edge sets.
    pub fn add_upstream_analysis(&mut self, upstream: &mut Analysis) {
        self.add_upstream(upstream.node_ref());
        upstream.add_downstream(self.node_ref());
    }

    pub(crate) fn from_parts(core: NodeCore, method_ids: Vec<String>) -> Self {
        Self { core, method_ids }
    }
}

impl GraphNode for Analysis {
    const NODE_TYPE: NodeType = NodeType::Analysis;

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn check_valid(&self, config: &CoreConfig) -> Result<(), InvalidNodeDefinition> {
        self.core.check_edges(Self::NODE_TYPE)?;
        if self.core.upstream.is_empty() && !config.allow_sourceless_analysis {
            return Err(InvalidNodeDefinition::AnalysisWithoutSources {
                name: self.name().to_string(),
            });
        }
        if self.method_ids.is_empty() {
            return Err(InvalidNodeDefinition::MissingActorRelation {
                node_type: Self::NODE_TYPE,
                name: self.name().to_string(),
                relation: "analysis method",
            });
        }
        Ok(())
    }
}

impl HasActors for Analysis {
    fn actor_ids(&self) -> &[String] {
        &self.method_ids
    }

    fn add_actor_id(&mut self, id: String) {
        if !self.method_ids.contains(&id) {
            self.method_ids.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::actor::Actor;
    use crate::models::material::Material;

    fn phase_id() -> AnalysisMethod {
        AnalysisMethod::new("Phase Identification", "XRD phase matching")
    }

    #[test]
    fn analysis_chains_on_measurement_and_analysis() {
        let config = CoreConfig::default();
        let actor = Actor::new("Aeris", "Benchtop diffractometer");
        let mut pellet = Material::new("pellet");
        let mut xrd = Measurement::new("XRD pattern", &mut pellet, &actor);

        let mut phases = Analysis::new("phases", &phase_id());
        phases.add_measurement(&mut xrd);
        assert!(phases.check_valid(&config).is_ok());
        assert!(xrd.core().downstream.contains(&phases.node_ref()));

        let mut refinement = Analysis::new("refinement", &phase_id());
        refinement.add_upstream_analysis(&mut phases);
        assert!(refinement.check_valid(&config).is_ok());
        assert!(phases.core().downstream.contains(&refinement.node_ref()));
    }

    #[test]
    fn sourceless_analysis_is_configurable() {
        let simulated = Analysis::new("DFT energies", &phase_id());

        let permissive = CoreConfig::default();
        assert!(simulated.check_valid(&permissive).is_ok());

        let strict = CoreConfig {
            allow_sourceless_analysis: false,
            ..CoreConfig::default()
        };
        assert!(matches!(
            simulated.check_valid(&strict),
            Err(InvalidNodeDefinition::AnalysisWithoutSources { .. })
        ));
    }
}
