//! Per-type node views and their document codecs
//!
//! One [`NodeView`] alias per node type, plus the explicit serialization
//! each type needs on top of the shared core fields: the `actor_id` list
//! for actor-carrying types and the embedded ingredient sub-documents for
//! Actions.
//!
//! Deserialization re-resolves what the in-memory types carry live: actor
//! and analysis-method references are fetched (a missing one is a dangling
//! reference), and an Action rebuilds its ingredients and generated
//! materials as full Material values. Plain upstream/downstream neighbors
//! stay lazy behind [`EdgeList::resolve`].
//!
//! [`EdgeList::resolve`]: crate::models::EdgeList::resolve

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::actors::ReferenceEntity;
use super::base::{ActorPrecondition, NodeEntity, NodeView, OnConflict};
use super::codec::{decode_core, encode_core, take_id_list};
use super::error::ViewError;
use super::resolver::NodeResolver;
use crate::db::Document;
use crate::models::{
    Action, Actor, Analysis, AnalysisMethod, AnyNode, GraphNode, HasActors, Ingredient, Material,
    Measurement, NodeType, Quantity,
};

/// View over the `materials` collection.
pub type MaterialView = NodeView<Material>;
/// View over the `actions` collection.
pub type ActionView = NodeView<Action>;
/// View over the `measurements` collection.
pub type MeasurementView = NodeView<Measurement>;
/// View over the `analyses` collection.
pub type AnalysisView = NodeView<Analysis>;

fn actor_id_value(ids: &[String]) -> Value {
    Value::Array(ids.iter().cloned().map(Value::String).collect())
}

#[async_trait]
impl NodeEntity for Material {
    const COLLECTION: &'static str = "materials";
    const LABEL: &'static str = "Material";

    fn to_document(&self) -> Result<Document, ViewError> {
        encode_core(self.core(), Self::LABEL)
    }

    async fn from_document(
        mut document: Document,
        _resolver: &NodeResolver,
    ) -> Result<Self, ViewError> {
        let core = decode_core(&mut document, Self::LABEL)?;
        Ok(Material::from_core(core))
    }
}

#[async_trait]
impl NodeEntity for Action {
    const COLLECTION: &'static str = "actions";
    const LABEL: &'static str = "Action";

    fn to_document(&self) -> Result<Document, ViewError> {
        let mut document = encode_core(self.core(), Self::LABEL)?;
        document.insert("actor_id".to_string(), actor_id_value(self.actor_ids()));
        let ingredients: Vec<Value> = self
            .ingredients()
            .iter()
            .map(encode_ingredient)
            .collect::<Result<_, _>>()?;
        document.insert("ingredients".to_string(), Value::Array(ingredients));
        Ok(document)
    }

    async fn from_document(
        mut document: Document,
        resolver: &NodeResolver,
    ) -> Result<Self, ViewError> {
        let actor_ids = take_id_list(&mut document, "actor_id", Self::LABEL)?;
        let ingredient_entries = match document.remove("ingredients") {
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(ViewError::decode(
                    Self::LABEL,
                    format!("ingredients must be an array, got {other}"),
                ))
            }
            None => Vec::new(),
        };
        let core = decode_core(&mut document, Self::LABEL)?;

        for id in &actor_ids {
            resolver.resolve_actor(id).await?;
        }

        let mut ingredients = Vec::with_capacity(ingredient_entries.len());
        for entry in ingredient_entries {
            ingredients.push(decode_ingredient(entry, resolver).await?);
        }

        // generated materials are the downstream Material edges, fetched live
        let mut generated_materials = Vec::new();
        for edge in &core.downstream {
            if edge.node_type == NodeType::Material {
                generated_materials.push(resolver.resolve_material(&edge.node_id).await?);
            }
        }

        Ok(Action::from_parts(
            core,
            actor_ids,
            ingredients,
            generated_materials,
        ))
    }

    fn actor_precondition(&self) -> Option<ActorPrecondition> {
        Some(ActorPrecondition {
            collection: Actor::COLLECTION,
            label: Actor::LABEL,
            ids: self.actor_ids().to_vec(),
        })
    }
}

#[async_trait]
impl NodeEntity for Measurement {
    const COLLECTION: &'static str = "measurements";
    const LABEL: &'static str = "Measurement";

    fn to_document(&self) -> Result<Document, ViewError> {
        let mut document = encode_core(self.core(), Self::LABEL)?;
        document.insert("actor_id".to_string(), actor_id_value(self.actor_ids()));
        Ok(document)
    }

    async fn from_document(
        mut document: Document,
        resolver: &NodeResolver,
    ) -> Result<Self, ViewError> {
        let actor_ids = take_id_list(&mut document, "actor_id", Self::LABEL)?;
        let core = decode_core(&mut document, Self::LABEL)?;
        for id in &actor_ids {
            resolver.resolve_actor(id).await?;
        }
        Ok(Measurement::from_parts(core, actor_ids))
    }

    fn actor_precondition(&self) -> Option<ActorPrecondition> {
        Some(ActorPrecondition {
            collection: Actor::COLLECTION,
            label: Actor::LABEL,
            ids: self.actor_ids().to_vec(),
        })
    }
}

#[async_trait]
impl NodeEntity for Analysis {
    const COLLECTION: &'static str = "analyses";
    const LABEL: &'static str = "Analysis";

    fn to_document(&self) -> Result<Document, ViewError> {
        let mut document = encode_core(self.core(), Self::LABEL)?;
        document.insert("actor_id".to_string(), actor_id_value(self.actor_ids()));
        Ok(document)
    }

    async fn from_document(
        mut document: Document,
        resolver: &NodeResolver,
    ) -> Result<Self, ViewError> {
        let method_ids = take_id_list(&mut document, "actor_id", Self::LABEL)?;
        let core = decode_core(&mut document, Self::LABEL)?;
        for id in &method_ids {
            resolver.resolve_analysis_method(id).await?;
        }
        Ok(Analysis::from_parts(core, method_ids))
    }

    fn actor_precondition(&self) -> Option<ActorPrecondition> {
        Some(ActorPrecondition {
            collection: AnalysisMethod::COLLECTION,
            label: AnalysisMethod::LABEL,
            ids: self.actor_ids().to_vec(),
        })
    }
}

fn encode_ingredient(ingredient: &Ingredient) -> Result<Value, ViewError> {
    let mut entry = Map::new();
    entry.insert(
        "material_id".to_string(),
        Value::String(ingredient.material_id().to_string()),
    );
    entry.insert("name".to_string(), Value::String(ingredient.name.clone()));
    match &ingredient.quantity {
        Some(quantity) => {
            entry.insert(
                "amount".to_string(),
                serde_json::Number::from_f64(quantity.amount)
                    .map(Value::Number)
                    .ok_or_else(|| {
                        ViewError::decode("Ingredient", "amount is not a finite number")
                    })?,
            );
            entry.insert("unit".to_string(), Value::String(quantity.unit.clone()));
        }
        None => {
            entry.insert("amount".to_string(), Value::Null);
            entry.insert("unit".to_string(), Value::Null);
        }
    }
    entry.insert(
        "contents".to_string(),
        Value::Object(ingredient.contents.clone()),
    );
    Ok(Value::Object(entry))
}

async fn decode_ingredient(entry: Value, resolver: &NodeResolver) -> Result<Ingredient, ViewError> {
    let Value::Object(mut entry) = entry else {
        return Err(ViewError::decode(
            "Ingredient",
            format!("ingredient entries must be objects, got {entry}"),
        ));
    };
    let material_id = match entry.remove("material_id") {
        Some(Value::String(id)) => id,
        other => {
            return Err(ViewError::decode(
                "Ingredient",
                format!("material_id must be a string, got {other:?}"),
            ))
        }
    };
    let material = resolver.resolve_material(&material_id).await?;
    let name = match entry.remove("name") {
        Some(Value::String(name)) => name,
        _ => material.name().to_string(),
    };
    let amount = entry.remove("amount").and_then(|v| v.as_f64());
    let unit = match entry.remove("unit") {
        Some(Value::String(unit)) => Some(unit),
        _ => None,
    };
    let quantity = match (amount, unit) {
        (Some(amount), Some(unit)) => Some(Quantity { amount, unit }),
        _ => None,
    };
    let contents = match entry.remove("contents") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    Ok(Ingredient {
        name,
        material,
        quantity,
        contents,
    })
}

/// Persist one type-erased node through the matching view, with the given
/// conflict policy. Used wherever a mixed node set is written (samples,
/// dev seeding).
pub(crate) async fn add_any(
    node: &mut AnyNode,
    materials: &MaterialView,
    actions: &ActionView,
    measurements: &MeasurementView,
    analyses: &AnalysisView,
    on_conflict: OnConflict,
) -> Result<String, ViewError> {
    match node {
        AnyNode::Material(material) => materials.add(material, on_conflict).await,
        AnyNode::Action(action) => actions.add(action, on_conflict).await,
        AnyNode::Measurement(measurement) => measurements.add(measurement, on_conflict).await,
        AnyNode::Analysis(analysis) => analyses.add(analysis, on_conflict).await,
    }
}
