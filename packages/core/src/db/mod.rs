//! Database layer
//!
//! The document-store boundary of the graph engine:
//!
//! - [`DocumentStore`] - the async trait every backend implements
//! - [`Filter`] - the supported query shapes (equality, all-of, time range)
//! - [`MemoryStore`] - the in-process reference implementation
//! - [`DatabaseError`] - store-level failures
//!
//! Views hold the store as `Arc<dyn DocumentStore>` handed in by the
//! caller; there is no module-level default connection.

mod error;
mod memory;
mod store;

pub use error::DatabaseError;
pub use memory::MemoryStore;
pub use store::{Clause, Document, DocumentStore, Filter};
