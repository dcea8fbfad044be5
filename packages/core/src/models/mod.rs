//! Data model
//!
//! The typed node variants of the provenance DAG, the actor-like reference
//! entities they point at, and the Sample container that groups nodes into
//! one experimental record. Everything here is a plain in-memory value:
//! identity is assigned at construction, but nothing touches the document
//! store until a view persists it.

mod action;
mod actor;
mod analysis;
mod any_node;
mod material;
mod measurement;
mod node;
mod sample;

pub use action::{Action, Ingredient, Quantity};
pub use actor::{Actor, AnalysisMethod, HasActors, ReferenceCore, VersionEntry};
pub use analysis::Analysis;
pub use any_node::AnyNode;
pub use material::Material;
pub use measurement::Measurement;
pub use node::{
    allowed_neighbors, EdgeDirection, EdgeList, FieldNameCollision, GraphNode,
    InvalidNodeDefinition, NodeCore, NodeRef, NodeType, RESERVED_FIELDS,
};
pub use sample::{LinearProcessError, Sample};
