//! Lazy node resolution
//!
//! Edge lists store `(node_type, node_id)` pairs; nothing is fetched until
//! a caller asks. [`NodeResolver`] is the explicit dependency bundle that
//! turns a stored reference into a typed node, and [`EdgeList::resolve`]
//! is the materialization point. A reference whose document is gone yields
//! a dangling-reference error, which is distinct from the recoverable
//! NotFound of an ordinary lookup: it means the neighbor was deleted after
//! the edge was written (or the edge's owner was never persisted through a
//! view).

use std::sync::Arc;

use super::actors::{decode_reference, ReferenceEntity};
use super::base::NodeEntity;
use super::error::ViewError;
use crate::db::{Document, DocumentStore, Filter};
use crate::models::{
    Action, Actor, Analysis, AnalysisMethod, AnyNode, EdgeList, Material, Measurement, NodeRef,
    NodeType,
};

/// Resolves stored references into typed nodes.
///
/// Carries only the store handle, so every view can hand one out cheaply.
/// Nothing is cached: each resolution re-reads the store.
#[derive(Clone)]
pub struct NodeResolver {
    store: Arc<dyn DocumentStore>,
}

impl NodeResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn fetch(
        &self,
        collection: &str,
        entity: &'static str,
        id: &str,
    ) -> Result<Document, ViewError> {
        self.store
            .find_one(collection, &Filter::by_id(id))
            .await?
            .ok_or_else(|| ViewError::DanglingReference {
                entity,
                id: id.to_string(),
            })
    }

    /// Materialize one stored reference into a typed node.
    pub async fn resolve(&self, reference: &NodeRef) -> Result<AnyNode, ViewError> {
        let document = self
            .fetch(
                reference.node_type.collection(),
                reference.node_type.as_str(),
                &reference.node_id,
            )
            .await?;
        Ok(match reference.node_type {
            NodeType::Material => Material::from_document(document, self).await?.into(),
            NodeType::Action => Action::from_document(document, self).await?.into(),
            NodeType::Measurement => Measurement::from_document(document, self).await?.into(),
            NodeType::Analysis => Analysis::from_document(document, self).await?.into(),
        })
    }

    pub async fn resolve_material(&self, id: &str) -> Result<Material, ViewError> {
        let document = self.fetch(NodeType::Material.collection(), "Material", id).await?;
        Material::from_document(document, self).await
    }

    pub async fn resolve_actor(&self, id: &str) -> Result<Actor, ViewError> {
        let document = self
            .fetch(<Actor as ReferenceEntity>::COLLECTION, Actor::LABEL, id)
            .await?;
        decode_reference::<Actor>(document)
    }

    pub async fn resolve_analysis_method(&self, id: &str) -> Result<AnalysisMethod, ViewError> {
        let document = self
            .fetch(
                <AnalysisMethod as ReferenceEntity>::COLLECTION,
                AnalysisMethod::LABEL,
                id,
            )
            .await?;
        decode_reference::<AnalysisMethod>(document)
    }
}

impl EdgeList {
    /// Fetch every referenced node, in list order.
    pub async fn resolve(&self, resolver: &NodeResolver) -> Result<Vec<AnyNode>, ViewError> {
        let mut nodes = Vec::with_capacity(self.len());
        for reference in self {
            nodes.push(resolver.resolve(reference).await?);
        }
        Ok(nodes)
    }

    /// Fetch the referenced node at `index`.
    pub async fn resolve_one(
        &self,
        index: usize,
        resolver: &NodeResolver,
    ) -> Result<AnyNode, ViewError> {
        let reference = self.get(index).ok_or(ViewError::EdgeIndexOutOfBounds {
            index,
            len: self.len(),
        })?;
        resolver.resolve(reference).await
    }
}
