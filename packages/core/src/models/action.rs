//! Action nodes and their ingredients
//!
//! Actions are the only way new Materials come into existence. An Action
//! consumes zero or more [`Ingredient`]s (existing Materials with an
//! optional quantity) and generates zero or more Materials. An Action with
//! neither is meaningless and is rejected at write time.

use serde_json::{Map, Value};

use super::actor::{Actor, HasActors};
use super::material::Material;
use super::node::{GraphNode, InvalidNodeDefinition, NodeCore, NodeType};
use crate::config::CoreConfig;

/// Amount of material consumed by an ingredient.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub amount: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(amount: f64, unit: impl Into<String>) -> Self {
        Self {
            amount,
            unit: unit.into(),
        }
    }

    /// The conventional "all of it" quantity used when an intermediate
    /// material is fully consumed by the next step.
    pub fn whole() -> Self {
        Self::new(100.0, "percent")
    }
}

/// A Material consumed by an Action, with an optional quantity and a
/// display name of its own.
///
/// The display name may differ from the material name: a Material "cheese"
/// can be the Ingredient "topping" of a "make pizza" Action. A `None`
/// quantity means the consumed amount was not recorded. Ingredients are
/// owned by their Action and serialize to an embedded sub-document; the
/// embedded [`Material`] is re-resolved from the store on deserialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub name: String,
    pub material: Material,
    pub quantity: Option<Quantity>,
    pub contents: Map<String, Value>,
}

impl Ingredient {
    pub fn material_id(&self) -> &str {
        self.material.id()
    }
}

/// An Action node: a process step performed by one or more Actors.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    core: NodeCore,
    actor_ids: Vec<String>,
    ingredients: Vec<Ingredient>,
    generated_materials: Vec<Material>,
}

impl Action {
    pub fn new(name: impl Into<String>, actor: &Actor) -> Self {
        Self {
            core: NodeCore::new(name),
            actor_ids: vec![actor.id().to_string()],
            ingredients: Vec::new(),
            generated_materials: Vec::new(),
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

    pub fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }

    pub fn generated_materials(&self) -> &[Material] {
        &self.generated_materials
    }

    /// Declare `material` as an ingredient of this Action.
    ///
    /// Wires both edge sets: the upstream edge on this Action and the
    /// downstream edge on the caller's Material. The Ingredient keeps its
    /// own copy of the material; the store is the source of truth once
    /// either side is persisted.
    pub fn add_ingredient(
        &mut self,
        material: &mut Material,
        quantity: Option<Quantity>,
        name: Option<&str>,
    ) {
        self.add_upstream(material.node_ref());
        material.add_downstream(self.node_ref());
        self.ingredients.push(Ingredient {
            name: name.unwrap_or(material.name()).to_string(),
            material: material.clone(),
            quantity,
            contents: Map::new(),
        });
    }

    /// Shortcut for consuming all of a material, common for intermediates.
    pub fn add_whole_ingredient(&mut self, material: &mut Material, name: Option<&str>) {
        self.add_ingredient(material, Some(Quantity::whole()), name);
    }

    /// Declare `material` as generated by this Action, wiring both edge
    /// sets.
    pub fn add_generated_material(&mut self, material: &mut Material) {
        self.add_downstream(material.node_ref());
        material.add_upstream(self.node_ref());
        self.generated_materials.push(material.clone());
    }

    /// Create a generically named output Material for this Action.
    ///
    /// Useful for intermediate process steps where the output was never
    /// characterized on its own. The default name joins the ingredient
    /// names with `+` and appends ` - <action name>`; an Action without
    /// ingredients yields `noingredients - <action name>`.
    ///
    /// Returns an error if generated materials are already declared.
    pub fn make_generic_generated_material(
        &mut self,
        name: Option<&str>,
    ) -> Result<Material, InvalidNodeDefinition> {
        if !self.generated_materials.is_empty() {
            return Err(InvalidNodeDefinition::GeneratedMaterialsAlreadyDeclared {
                name: self.name().to_string(),
            });
        }
        let generated_name = match name {
            Some(explicit) => explicit.to_string(),
            None => {
                if self.ingredients.is_empty() {
                    format!("noingredients - {}", self.name())
                } else {
                    let joined = self
                        .ingredients
                        .iter()
                        .map(|ingredient| ingredient.name.as_str())
                        .collect::<Vec<_>>()
                        .join("+");
                    format!("{} - {}", joined, self.name())
                }
            }
        };

        let mut material = Material::new(generated_name);
        self.add_generated_material(&mut material);
        Ok(material)
    }

    pub(crate) fn from_parts(
        core: NodeCore,
        actor_ids: Vec<String>,
        ingredients: Vec<Ingredient>,
        generated_materials: Vec<Material>,
    ) -> Self {
        Self {
            core,
            actor_ids,
            ingredients,
            generated_materials,
        }
    }
}

impl GraphNode for Action {
    const NODE_TYPE: NodeType = NodeType::Action;

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn check_valid(&self, _config: &CoreConfig) -> Result<(), InvalidNodeDefinition> {
        self.core.check_edges(Self::NODE_TYPE)?;
        if self.core.upstream.is_empty() && self.core.downstream.is_empty() {
            return Err(InvalidNodeDefinition::ActionWithoutEdges {
                name: self.name().to_string(),
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

impl HasActors for Action {
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

    fn operator() -> Actor {
        Actor::new("Operator", "A human operator")
    }

    #[test]
    fn ingredient_wires_both_edge_sets() {
        let actor = operator();
        let mut tio2 = Material::new("TiO2");
        let mut grind = Action::new("grind", &actor);
        grind.add_ingredient(&mut tio2, Some(Quantity::new(1.0, "g")), None);

        assert!(grind.core().upstream.contains(&tio2.node_ref()));
        assert!(tio2.core().downstream.contains(&grind.node_ref()));
        assert_eq!(grind.ingredients()[0].name, "TiO2");
    }

    #[test]
    fn generic_material_name_joins_ingredients() {
        let actor = operator();
        let mut tio2 = Material::new("TiO2");
        let mut grind = Action::new("grind", &actor);
        grind.add_ingredient(&mut tio2, Some(Quantity::new(1.0, "g")), None);

        let output = grind.make_generic_generated_material(None).unwrap();
        assert_eq!(output.name(), "TiO2 - grind");
        assert!(output.core().upstream.contains(&grind.node_ref()));
        assert!(grind.core().downstream.contains(&output.node_ref()));
    }

    #[test]
    fn generic_material_without_ingredients() {
        let actor = operator();
        let mut procure = Action::new("procurement", &actor);
        let output = procure.make_generic_generated_material(None).unwrap();
        assert_eq!(output.name(), "noingredients - procurement");
    }

    #[test]
    fn generic_material_rejected_when_outputs_exist() {
        let actor = operator();
        let mut sinter = Action::new("sinter", &actor);
        let mut pellet = Material::new("pellet");
        sinter.add_generated_material(&mut pellet);
        assert!(sinter.make_generic_generated_material(None).is_err());
    }

    #[test]
    fn action_without_edges_is_invalid() {
        let config = CoreConfig::default();
        let actor = operator();
        let lonely = Action::new("noop", &actor);
        assert!(matches!(
            lonely.check_valid(&config),
            Err(InvalidNodeDefinition::ActionWithoutEdges { .. })
        ));
    }

    #[test]
    fn whole_ingredient_uses_percent_quantity() {
        let actor = operator();
        let mut powder = Material::new("powder");
        let mut press = Action::new("press", &actor);
        press.add_whole_ingredient(&mut powder, None);
        let quantity = press.ingredients()[0].quantity.as_ref().unwrap();
        assert_eq!(quantity.amount, 100.0);
        assert_eq!(quantity.unit, "percent");
    }
}
