//! Database error types
//!
//! Errors raised by the document-store boundary itself. Higher-level
//! conditions (not found, already exists, broken graphs) are view-layer
//! errors; everything here means the store could not carry out a request.

use thiserror::Error;

/// Document store operation errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// A document was handed to the store without a string `_id`.
    #[error("document for collection {collection:?} is missing a string _id")]
    MissingId { collection: String },

    /// Insert attempted with an `_id` that already exists.
    #[error("duplicate _id {id:?} in collection {collection:?}")]
    DuplicateId { collection: String, id: String },

    /// A stored document cannot be interpreted.
    #[error("malformed document in collection {collection:?}: {reason}")]
    MalformedDocument { collection: String, reason: String },

    /// Backend-specific failure (connection, I/O, query execution).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl DatabaseError {
    pub fn missing_id(collection: impl Into<String>) -> Self {
        Self::MissingId {
            collection: collection.into(),
        }
    }

    pub fn duplicate_id(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn malformed(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend(reason.into())
    }
}
