//! LabTrace core: experimental provenance as a typed DAG
//!
//! This crate models laboratory provenance as a directed acyclic graph of
//! four node types (Material, Action, Measurement, Analysis) persisted
//! as flat per-node documents in a black-box document store.
//!
//! # Architecture
//!
//! - [`models`] - in-memory node, actor and sample values; adjacency rules
//! - [`db`] - the [`DocumentStore`](db::DocumentStore) trait, query
//!   filters, and the in-memory reference backend
//! - [`views`] - per-type CRUD views, the versioning update engine, lazy
//!   edge resolution, and the cascade-delete engine
//! - [`config`] - explicit runtime configuration, injected everywhere
//!
//! # Integrity rules, in short
//!
//! Every node owns two edge lists (`upstream`, `downstream`) of
//! `(node_type, node_id)` pairs checked against a fixed adjacency schema
//! at write time. Edges only grow through updates; pure edge growth
//! patches documents in place while any other change appends a full prior
//! snapshot to `version_history`. Removal cascades over the downstream
//! closure and repairs every remaining reference.

pub mod config;
pub mod db;
pub mod models;
pub mod time;
pub mod views;

pub use config::CoreConfig;
pub use models::*;
pub use views::*;
