//! Actors and analysis methods
//!
//! [`Actor`] represents the hardware, person, or script that performed an
//! Action or Measurement. [`AnalysisMethod`] describes how an Analysis was
//! computed. Both are versioned reference entities: they live in their own
//! collections, nodes reference them by id, and every revision is recorded
//! in a monotonic version history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::node::{FieldNameCollision, RESERVED_FIELDS};
use crate::time::truncated_now;

/// One entry of a reference entity's version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: u32,
    pub description: String,
    pub version_date: DateTime<Utc>,
}

/// Shared state of [`Actor`] and [`AnalysisMethod`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCore {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub contents: Map<String, Value>,
    pub version_history: Vec<VersionEntry>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReferenceCore {
    fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            tags: Vec::new(),
            contents: Map::new(),
            version_history: vec![VersionEntry {
                version: 1,
                description: "Initial version.".to_string(),
                version_date: truncated_now(),
            }],
            created_at: None,
            updated_at: None,
        }
    }

    /// Highest recorded version.
    pub fn version(&self) -> u32 {
        self.version_history
            .iter()
            .map(|entry| entry.version)
            .max()
            .unwrap_or(1)
    }

    /// Record a new version locally. The store is only touched when the
    /// entity is passed back through its view's `update`.
    pub fn new_version(&mut self, description: impl Into<String>) {
        self.version_history.push(VersionEntry {
            version: self.version() + 1,
            description: description.into(),
            version_date: truncated_now(),
        });
    }

    pub(crate) fn check_contents(&self, entity: &'static str) -> Result<(), FieldNameCollision> {
        for key in self.contents.keys() {
            if RESERVED_FIELDS.contains(&key.as_str()) || key == "description" || key == "version" {
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

macro_rules! reference_entity_accessors {
    () => {
        pub fn id(&self) -> &str {
            &self.core.id
        }

        pub fn name(&self) -> &str {
            &self.core.name
        }

        pub fn description(&self) -> &str {
            &self.core.description
        }

        pub fn version(&self) -> u32 {
            self.core.version()
        }

        /// Record a new version with a description of what changed.
        pub fn new_version(&mut self, description: impl Into<String>) {
            self.core.new_version(description);
        }

        pub fn with_tags(mut self, tags: Vec<String>) -> Self {
            self.core.tags = tags;
            self
        }

        /// Attach a user content value.
        pub fn insert_content(&mut self, key: impl Into<String>, value: Value) {
            self.core.contents.insert(key.into(), value);
        }

        pub fn content(&self, key: &str) -> Option<&Value> {
            self.core.contents.get(key)
        }

        pub(crate) fn core(&self) -> &ReferenceCore {
            &self.core
        }

        pub(crate) fn core_mut(&mut self) -> &mut ReferenceCore {
            &mut self.core
        }

        pub(crate) fn from_core(core: ReferenceCore) -> Self {
            Self { core }
        }
    };
}

/// An experimental actor (hardware, operator, or script) that performs
/// Actions and Measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    core: ReferenceCore,
}

impl Actor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            core: ReferenceCore::new(name, description),
        }
    }

    reference_entity_accessors!();
}

/// A procedure that turns Measurement data into Analysis results.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisMethod {
    core: ReferenceCore,
}

impl AnalysisMethod {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            core: ReferenceCore::new(name, description),
        }
    }

    reference_entity_accessors!();
}

/// Capability shared by node types that are performed by an actor-like
/// entity. For Action and Measurement the ids reference [`Actor`]s; for
/// Analysis they reference [`AnalysisMethod`]s.
pub trait HasActors {
    fn actor_ids(&self) -> &[String];

    /// Append a reference, skipping duplicates.
    fn add_actor_id(&mut self, id: String);
}
