//! Recipes: the loaded aggregate, its step graph, and TOML authoring.
//!
//! A [`Recipe`] owns its steps and prep tasks. Steps refer to products of
//! earlier steps by product id; those references become the edges of the
//! step graph in [`graph`].

pub mod graph;
pub mod parser;
pub mod service;
pub mod toml_format;

use serde::{Deserialize, Serialize};

use crate::quantity::QuantityRange;

pub use graph::{RecipeGraph, build_graph};
pub use parser::parse_recipe_toml;
pub use service::{create_recipe_from_toml, load_recipe};
pub use toml_format::RecipeToml;

/// Ingredients whose minimum ideal storage temperature is at or below this
/// many degrees Celsius are treated as kept frozen.
pub const FROZEN_STORAGE_MAX_C: f32 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub household_id: String,
    pub name: String,
    pub description: String,
    /// Sorted by `index`.
    pub steps: Vec<RecipeStep>,
    pub prep_tasks: Vec<RecipePrepTask>,
}

impl Recipe {
    pub fn step_by_id(&self, step_id: &str) -> Option<&RecipeStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStep {
    pub id: String,
    /// 0-based position, unique within the recipe.
    pub index: u32,
    pub preparation: String,
    pub notes: String,
    pub ingredients: Vec<IngredientUse>,
    pub instruments: Vec<ToolUse>,
    pub vessels: Vec<ToolUse>,
    pub products: Vec<StepProduct>,
    pub completion_conditions: Vec<CompletionCondition>,
}

impl RecipeStep {
    /// 1-based step number as shown to people and used as the graph node.
    pub fn number(&self) -> u32 {
        self.index + 1
    }
}

/// An ingredient consumed by a step: either a catalog ingredient, the
/// product of an earlier step, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientUse {
    pub id: String,
    pub ingredient: Option<Ingredient>,
    pub product_ref: Option<String>,
    pub measurement_unit_id: String,
    pub quantity: QuantityRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub min_ideal_storage_temp_c: Option<f32>,
}

impl Ingredient {
    pub fn is_frozen(&self) -> bool {
        self.min_ideal_storage_temp_c
            .is_some_and(|t| t <= FROZEN_STORAGE_MAX_C)
    }
}

/// Instrument or vessel use. `product_ref` is set when the tool is itself
/// the output of an earlier step (a lined tin, a preheated pan).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub product_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProduct {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionCondition {
    pub id: String,
    pub ingredient_state: String,
    pub optional: bool,
    pub notes: String,
}

/// Out-of-band preparation done ahead of the meal, e.g. marinating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipePrepTask {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Lead time window, in seconds before the meal starts.
    pub min_lead_secs: u32,
    pub max_lead_secs: Option<u32>,
    pub min_storage_temp_c: Option<f32>,
    pub max_storage_temp_c: Option<f32>,
    pub steps: Vec<PrepTaskStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepTaskStep {
    pub id: String,
    pub step_id: String,
    pub satisfies_step: bool,
}

/// Builders for hand-assembled recipes in unit tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::quantity::Quantity;

    pub fn step(index: u32) -> RecipeStep {
        RecipeStep {
            id: format!("step-{index}"),
            index,
            preparation: format!("prep {index}"),
            notes: String::new(),
            ingredients: Vec::new(),
            instruments: Vec::new(),
            vessels: Vec::new(),
            products: Vec::new(),
            completion_conditions: Vec::new(),
        }
    }

    pub fn ingredient_use(id: &str, ingredient_id: &str, unit: &str, hundredths: u32) -> IngredientUse {
        IngredientUse {
            id: id.to_owned(),
            ingredient: Some(Ingredient {
                id: ingredient_id.to_owned(),
                name: ingredient_id.to_owned(),
                min_ideal_storage_temp_c: None,
            }),
            product_ref: None,
            measurement_unit_id: unit.to_owned(),
            quantity: QuantityRange::exact(Quantity::from_hundredths(hundredths)),
        }
    }

    pub fn product_use(id: &str, product_id: &str) -> IngredientUse {
        IngredientUse {
            id: id.to_owned(),
            ingredient: None,
            product_ref: Some(product_id.to_owned()),
            measurement_unit_id: "unit".to_owned(),
            quantity: QuantityRange::exact(Quantity::from_units(1)),
        }
    }

    pub fn product(id: &str) -> StepProduct {
        StepProduct {
            id: id.to_owned(),
            name: id.to_owned(),
        }
    }

    pub fn recipe(id: &str, steps: Vec<RecipeStep>) -> Recipe {
        Recipe {
            id: id.to_owned(),
            household_id: "household".to_owned(),
            name: id.to_owned(),
            description: String::new(),
            steps,
            prep_tasks: Vec::new(),
        }
    }
}
