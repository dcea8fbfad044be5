//! View-layer error types
//!
//! The error taxonomy of the persistence layer. Absence is always signaled
//! by a distinct NotFound-class condition, never by a sentinel value, and a
//! malformed request is never conflated with an empty result.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::{EdgeDirection, FieldNameCollision, InvalidNodeDefinition, NodeRef};

/// Errors raised by persistence views and the graph-integrity engine.
#[derive(Error, Debug)]
pub enum ViewError {
    /// No document matches the requested id/name/tag combination.
    /// Recoverable: the caller can fall back to "not yet persisted".
    #[error("cannot find {label} matching {lookup}")]
    NotFoundInDatabase { label: &'static str, lookup: String },

    /// Insert attempted under the `Raise` conflict policy while the entity
    /// already exists.
    #[error("{label} (name={name:?}, id={id}) already exists in the database")]
    AlreadyInDatabase {
        label: &'static str,
        name: String,
        id: String,
    },

    /// A node's edges or required relations violate the fixed schema.
    #[error(transparent)]
    InvalidNode(#[from] InvalidNodeDefinition),

    /// A user content key shadows a reserved document field.
    #[error(transparent)]
    FieldCollision(#[from] FieldNameCollision),

    /// An update tried to drop a previously persisted edge. Edges only
    /// grow through the update path; removal is the cascade engine's job.
    #[error(
        "cannot remove {direction} edge {removed} from persisted {label} {id}; \
         edges can only be added through updates"
    )]
    EdgeRemoval {
        label: &'static str,
        id: String,
        direction: EdgeDirection,
        removed: NodeRef,
    },

    /// Lazy resolution found no document for a stored reference. The
    /// entity referenced a neighbor that was deleted after the fact (or
    /// was never persisted through a view).
    #[error("dangling reference: no {entity} document with id {id}")]
    DanglingReference { entity: &'static str, id: String },

    /// Edge index handed to `resolve_one` is out of bounds.
    #[error("edge index {index} out of bounds for edge list of length {len}")]
    EdgeIndexOutOfBounds { index: usize, len: usize },

    /// A removal would cascade and the caller did not pass `force`.
    /// Surfaces the counts so an interactive caller can ask for
    /// confirmation before retrying with `force = true`.
    #[error(
        "removal would delete {affected_nodes} dependent node(s), fully delete \
         {invalidated_samples} sample(s) and update {affected_samples} sample(s); \
         pass force=true to proceed"
    )]
    ConfirmationRequired {
        affected_nodes: usize,
        affected_samples: usize,
        invalidated_samples: usize,
    },

    /// Lost-update protection on versioned reference entities.
    #[error(
        "cannot update {label} {id}: stored version {stored} is ahead of \
         candidate version {candidate}"
    )]
    VersionConflict {
        label: &'static str,
        id: String,
        stored: u32,
        candidate: u32,
    },

    /// A sample's graph is not a single connected acyclic component, or
    /// depends on nodes that are neither persisted nor upcoming.
    #[error("sample {name:?} graph is not valid: {reason}")]
    InvalidSampleGraph { name: String, reason: String },

    /// A stored document could not be interpreted as the expected entity.
    #[error("malformed {label} document: {reason}")]
    Decode { label: &'static str, reason: String },

    /// The document store itself failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ViewError {
    pub fn not_found(label: &'static str, lookup: impl Into<String>) -> Self {
        Self::NotFoundInDatabase {
            label,
            lookup: lookup.into(),
        }
    }

    pub fn decode(label: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            label,
            reason: reason.into(),
        }
    }

    pub fn invalid_sample_graph(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSampleGraph {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is the recoverable "nothing matched" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFoundInDatabase { .. })
    }
}
