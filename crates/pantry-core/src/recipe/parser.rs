//! Recipe TOML parser with validation.
//!
//! Parses a recipe file into a [`RecipeToml`] and checks everything that
//! does not need the catalog:
//! - There is at least one step, and names are non-empty.
//! - Product names are unique, and every product reference resolves.
//! - Every ingredient use names an ingredient or a product.
//! - Quantities are valid and `max >= min`.
//! - Prep task step numbers exist.
//! - The step graph is acyclic.
//! - Steps only consume products of earlier steps.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::graph::build_graph;
use super::toml_format::RecipeToml;
use super::{IngredientUse, Recipe, RecipeStep, StepProduct, ToolUse};
use crate::error::PlanError;
use crate::quantity::{Quantity, QuantityRange};

/// Errors that can occur during recipe parsing and validation.
#[derive(Debug, Error)]
pub enum RecipeParseError {
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("recipe must contain at least one step")]
    NoSteps,

    #[error("recipe name must not be empty")]
    EmptyName,

    #[error("duplicate product name: {0:?}")]
    DuplicateProduct(String),

    #[error("step #{step} references unknown product {product:?}")]
    UnknownProduct { step: u32, product: String },

    #[error("ingredient #{position} of step #{step} names neither an ingredient nor a product")]
    UseWithoutSource { step: u32, position: usize },

    #[error("ingredient #{position} of step #{step}: {reason}")]
    InvalidQuantity {
        step: u32,
        position: usize,
        reason: String,
    },

    #[error("prep task {task:?} refers to step #{step}, but the recipe has {steps} steps")]
    UnknownPrepTaskStep { task: String, step: u32, steps: usize },

    #[error("steps form a cycle")]
    CycleDetected,

    #[error("step #{step} uses product {product:?} before the step that makes it")]
    ForwardReference { step: u32, product: String },
}

/// Parse and validate a recipe TOML string.
pub fn parse_recipe_toml(content: &str) -> Result<RecipeToml, RecipeParseError> {
    let recipe: RecipeToml = toml::from_str(content)?;
    validate(&recipe)?;
    Ok(recipe)
}

fn validate(recipe: &RecipeToml) -> Result<(), RecipeParseError> {
    if recipe.recipe.name.trim().is_empty() {
        return Err(RecipeParseError::EmptyName);
    }
    if recipe.steps.is_empty() {
        return Err(RecipeParseError::NoSteps);
    }

    let mut products = HashMap::new();
    for (i, step) in recipe.steps.iter().enumerate() {
        for name in &step.products {
            if products.insert(name.as_str(), i as u32 + 1).is_some() {
                return Err(RecipeParseError::DuplicateProduct(name.clone()));
            }
        }
    }

    for (i, step) in recipe.steps.iter().enumerate() {
        let number = i as u32 + 1;
        let refs = step
            .ingredients
            .iter()
            .filter_map(|u| u.product.as_deref())
            .chain(step.instruments.iter().filter_map(|u| u.product.as_deref()))
            .chain(step.vessels.iter().filter_map(|u| u.product.as_deref()));
        for product in refs {
            if !products.contains_key(product) {
                return Err(RecipeParseError::UnknownProduct {
                    step: number,
                    product: product.to_owned(),
                });
            }
        }

        for (j, use_) in step.ingredients.iter().enumerate() {
            let position = j + 1;
            if use_.ingredient.is_none() && use_.product.is_none() {
                return Err(RecipeParseError::UseWithoutSource {
                    step: number,
                    position,
                });
            }
            quantity_range(use_.min, use_.max).map_err(|reason| {
                RecipeParseError::InvalidQuantity {
                    step: number,
                    position,
                    reason,
                }
            })?;
        }
    }

    for task in &recipe.prep_tasks {
        for step in &task.steps {
            if step.step == 0 || step.step as usize > recipe.steps.len() {
                return Err(RecipeParseError::UnknownPrepTaskStep {
                    task: task.name.clone(),
                    step: step.step,
                    steps: recipe.steps.len(),
                });
            }
        }
    }

    // Product names stand in for ids; the graph only needs them unique.
    match build_graph(&provisional_recipe(recipe)) {
        Ok(_) => {}
        Err(PlanError::UnresolvedProductRef { step, product, .. }) => {
            return Err(RecipeParseError::UnknownProduct { step, product });
        }
        Err(_) => return Err(RecipeParseError::CycleDetected),
    }

    check_product_order(recipe, &products)
}

/// Runs after the cycle check so a loop reports as a cycle.
fn check_product_order(
    recipe: &RecipeToml,
    made_at: &HashMap<&str, u32>,
) -> Result<(), RecipeParseError> {
    for (i, step) in recipe.steps.iter().enumerate() {
        let number = i as u32 + 1;
        let consumed: HashSet<&str> = step
            .ingredients
            .iter()
            .filter_map(|u| u.product.as_deref())
            .chain(step.instruments.iter().filter_map(|u| u.product.as_deref()))
            .chain(step.vessels.iter().filter_map(|u| u.product.as_deref()))
            .collect();
        let mut late: Vec<&str> = consumed
            .into_iter()
            .filter(|p| made_at.get(p).is_some_and(|&at| at >= number))
            .collect();
        late.sort_unstable();
        if let Some(product) = late.first() {
            return Err(RecipeParseError::ForwardReference {
                step: number,
                product: (*product).to_owned(),
            });
        }
    }
    Ok(())
}

/// Convert authored min/max into a validated range.
pub(crate) fn quantity_range(min: f64, max: Option<f64>) -> Result<QuantityRange, String> {
    let min_q = Quantity::from_f64(min).map_err(|e| e.to_string())?;
    let max_q = max
        .map(Quantity::from_f64)
        .transpose()
        .map_err(|e| e.to_string())?;
    if let Some(max_q) = max_q {
        if max_q < min_q {
            return Err(format!("max {max_q} is below min {min_q}"));
        }
    }
    Ok(QuantityRange {
        min: min_q,
        max: max_q,
    })
}

/// A catalog-free stand-in used only for the graph check.
fn provisional_recipe(recipe: &RecipeToml) -> Recipe {
    let steps = recipe
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| RecipeStep {
            id: format!("step-{i}"),
            index: i as u32,
            preparation: step.preparation.clone(),
            notes: String::new(),
            ingredients: step
                .ingredients
                .iter()
                .enumerate()
                .map(|(j, u)| IngredientUse {
                    id: format!("use-{i}-{j}"),
                    ingredient: None,
                    product_ref: u.product.clone(),
                    measurement_unit_id: u.unit.clone(),
                    quantity: QuantityRange::default(),
                })
                .collect(),
            instruments: tools(&step.instruments),
            vessels: tools(&step.vessels),
            products: step
                .products
                .iter()
                .map(|name| StepProduct {
                    id: name.clone(),
                    name: name.clone(),
                })
                .collect(),
            completion_conditions: Vec::new(),
        })
        .collect();

    Recipe {
        id: recipe.recipe.name.clone(),
        household_id: String::new(),
        name: recipe.recipe.name.clone(),
        description: String::new(),
        steps,
        prep_tasks: Vec::new(),
    }
}

fn tools(tools: &[super::toml_format::ToolToml]) -> Vec<ToolUse> {
    tools
        .iter()
        .map(|t| ToolUse {
            id: t.name.clone(),
            name: t.name.clone(),
            product_ref: t.product.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BREAD: &str = r#"
[recipe]
name = "Bread"

[[steps]]
preparation = "mix"
products = ["dough"]

[[steps.ingredients]]
ingredient = "flour"
unit = "gram"
min = 500

[[steps]]
preparation = "bake"

[[steps.ingredients]]
product = "dough"
unit = "unit"
min = 1
"#;

    #[test]
    fn parse_valid_recipe() {
        let recipe = parse_recipe_toml(BREAD).expect("should parse");
        assert_eq!(recipe.steps.len(), 2);
    }

    #[test]
    fn reject_no_steps() {
        let err = parse_recipe_toml("[recipe]\nname = \"Air\"\n").unwrap_err();
        assert!(matches!(err, RecipeParseError::NoSteps));
    }

    #[test]
    fn reject_unknown_product() {
        let content = BREAD.replace("product = \"dough\"", "product = \"batter\"");
        let err = parse_recipe_toml(&content).unwrap_err();
        assert!(
            matches!(err, RecipeParseError::UnknownProduct { step: 2, ref product } if product == "batter")
        );
    }

    #[test]
    fn reject_duplicate_product() {
        let content = BREAD.replace(
            "preparation = \"bake\"",
            "preparation = \"bake\"\nproducts = [\"dough\"]",
        );
        let err = parse_recipe_toml(&content).unwrap_err();
        assert!(matches!(err, RecipeParseError::DuplicateProduct(name) if name == "dough"));
    }

    #[test]
    fn reject_use_without_source() {
        let content = BREAD.replace("ingredient = \"flour\"\n", "");
        let err = parse_recipe_toml(&content).unwrap_err();
        assert!(matches!(
            err,
            RecipeParseError::UseWithoutSource {
                step: 1,
                position: 1
            }
        ));
    }

    #[test]
    fn reject_max_below_min() {
        let content = BREAD.replace("min = 500", "min = 500\nmax = 400");
        let err = parse_recipe_toml(&content).unwrap_err();
        assert!(matches!(err, RecipeParseError::InvalidQuantity { step: 1, .. }));
    }

    #[test]
    fn reject_negative_quantity() {
        let content = BREAD.replace("min = 500", "min = -5");
        let err = parse_recipe_toml(&content).unwrap_err();
        assert!(matches!(err, RecipeParseError::InvalidQuantity { .. }));
    }

    #[test]
    fn reject_cycle() {
        let content = r#"
[recipe]
name = "Loop"

[[steps]]
preparation = "a"
products = ["a"]

[[steps.ingredients]]
product = "b"
unit = "unit"
min = 1

[[steps]]
preparation = "b"
products = ["b"]

[[steps.ingredients]]
product = "a"
unit = "unit"
min = 1
"#;
        let err = parse_recipe_toml(content).unwrap_err();
        assert!(matches!(err, RecipeParseError::CycleDetected));
    }

    #[test]
    fn reject_product_of_a_later_step() {
        let content = r#"
[recipe]
name = "Pasta"

[[steps]]
preparation = "toss pasta"

[[steps.ingredients]]
product = "sauce"
unit = "unit"
min = 1

[[steps]]
preparation = "make sauce"
products = ["sauce"]

[[steps.ingredients]]
ingredient = "tomato"
unit = "gram"
min = 400
"#;
        let err = parse_recipe_toml(content).unwrap_err();
        assert!(
            matches!(err, RecipeParseError::ForwardReference { step: 1, ref product } if product == "sauce"),
            "{err}"
        );
    }

    #[test]
    fn later_vessel_holding_a_later_product_is_rejected() {
        let content = format!(
            "{BREAD}\n[[steps.vessels]]\nname = \"tin\"\nproduct = \"crust\"\n\n[[steps]]\npreparation = \"slice\"\nproducts = [\"crust\"]\n"
        );
        let err = parse_recipe_toml(&content).unwrap_err();
        assert!(
            matches!(err, RecipeParseError::ForwardReference { step: 2, ref product } if product == "crust"),
            "{err}"
        );
    }

    #[test]
    fn reject_prep_task_on_missing_step() {
        let content = format!(
            "{BREAD}\n[[prep_tasks]]\nname = \"proof\"\n\n[[prep_tasks.steps]]\nstep = 3\n"
        );
        let err = parse_recipe_toml(&content).unwrap_err();
        assert!(matches!(
            err,
            RecipeParseError::UnknownPrepTaskStep { step: 3, steps: 2, .. }
        ));
    }
}
