//! Recipe service layer.
//!
//! Creates recipes from validated TOML inside a single transaction and
//! loads stored recipes back into the [`Recipe`] aggregate.

use std::collections::HashMap;

use anyhow::Context;
use sqlx::{PgConnection, PgPool};

use pantry_db::queries::recipes::{NewPrepTask, NewStepIngredient, ToolKind};
use pantry_db::queries::{households, ingredients, recipes as db};

use super::graph::{RecipeGraph, build_graph};
use super::parser::quantity_range;
use super::toml_format::{RecipeToml, ToolToml};
use super::{
    CompletionCondition, Ingredient, IngredientUse, PrepTaskStep, Recipe, RecipePrepTask,
    RecipeStep, StepProduct, ToolUse,
};
use crate::error::{PlanError, PlanResult};
use crate::ids::IdGenerator;
use crate::outbox::{DataChangeMessage, DataChangeType, stage_data_change};
use crate::quantity::{Quantity, QuantityRange};

/// Create a recipe and all of its parts from a parsed [`RecipeToml`].
///
/// Catalog ingredient and unit names are resolved first; any unknown name
/// fails the whole operation with [`PlanError::Validation`]. The assembled
/// aggregate is graph-checked before anything is written, and all rows are
/// inserted in one transaction.
#[tracing::instrument(skip(pool, recipe_toml, ids), fields(name = %recipe_toml.recipe.name))]
pub async fn create_recipe_from_toml(
    pool: &PgPool,
    household_id: &str,
    recipe_toml: &RecipeToml,
    ids: &dyn IdGenerator,
) -> PlanResult<Recipe> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    if households::get_household(&mut *tx, household_id)
        .await?
        .is_none()
    {
        return Err(PlanError::not_found("household", household_id));
    }

    // 1. Resolve catalog names.
    let mut catalog_ingredients: HashMap<String, Ingredient> = HashMap::new();
    let mut units: HashMap<String, String> = HashMap::new();
    let mut missing: Vec<String> = Vec::new();

    for use_ in recipe_toml.steps.iter().flat_map(|s| &s.ingredients) {
        if let Some(name) = &use_.ingredient {
            if !catalog_ingredients.contains_key(name) {
                match ingredients::get_ingredient_by_name(&mut *tx, name).await? {
                    Some(row) => {
                        catalog_ingredients.insert(
                            name.clone(),
                            Ingredient {
                                id: row.id,
                                name: row.name,
                                min_ideal_storage_temp_c: row.min_ideal_storage_temp_c,
                            },
                        );
                    }
                    None => missing.push(format!("ingredient {name:?}")),
                }
            }
        }
        if !units.contains_key(&use_.unit) {
            match ingredients::get_measurement_unit_by_name(&mut *tx, &use_.unit).await? {
                Some(row) => {
                    units.insert(use_.unit.clone(), row.id);
                }
                None => missing.push(format!("measurement unit {:?}", use_.unit)),
            }
        }
    }

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(PlanError::Validation(format!(
            "recipe references unknown catalog entries: {}",
            missing.join(", ")
        )));
    }

    // 2. Assemble the aggregate with fresh ids.
    let recipe = assemble(household_id, recipe_toml, &catalog_ingredients, &units, ids)?;
    build_graph(&recipe)?;

    // 3. Insert. Products go in before any use so references resolve.
    db::insert_recipe(
        &mut *tx,
        &recipe.id,
        household_id,
        &recipe.name,
        &recipe.description,
    )
    .await?;

    for step in &recipe.steps {
        db::insert_step(
            &mut *tx,
            &step.id,
            &recipe.id,
            step.index as i32,
            &step.preparation,
            &step.notes,
        )
        .await?;
        for (ordinal, product) in step.products.iter().enumerate() {
            db::insert_step_product(&mut *tx, &product.id, &step.id, &product.name, ordinal as i32)
                .await?;
        }
    }

    for step in &recipe.steps {
        for (ordinal, use_) in step.ingredients.iter().enumerate() {
            db::insert_step_ingredient(
                &mut *tx,
                &NewStepIngredient {
                    id: &use_.id,
                    step_id: &step.id,
                    ingredient_id: use_.ingredient.as_ref().map(|i| i.id.as_str()),
                    product_id: use_.product_ref.as_deref(),
                    measurement_unit_id: &use_.measurement_unit_id,
                    min_quantity: use_.quantity.min.to_db(),
                    max_quantity: use_.quantity.max.map(Quantity::to_db),
                    ordinal: ordinal as i32,
                },
            )
            .await?;
        }
        for (kind, tools) in [
            (ToolKind::Instrument, &step.instruments),
            (ToolKind::Vessel, &step.vessels),
        ] {
            for (ordinal, tool) in tools.iter().enumerate() {
                db::insert_step_tool(
                    &mut *tx,
                    kind,
                    &tool.id,
                    &step.id,
                    &tool.name,
                    tool.product_ref.as_deref(),
                    ordinal as i32,
                )
                .await?;
            }
        }
        for (ordinal, condition) in step.completion_conditions.iter().enumerate() {
            db::insert_completion_condition(
                &mut *tx,
                &condition.id,
                &step.id,
                &condition.ingredient_state,
                condition.optional,
                &condition.notes,
                ordinal as i32,
            )
            .await?;
        }
    }

    for (ordinal, task) in recipe.prep_tasks.iter().enumerate() {
        db::insert_prep_task(
            &mut *tx,
            &NewPrepTask {
                id: &task.id,
                recipe_id: &recipe.id,
                name: &task.name,
                description: &task.description,
                min_lead_secs: task.min_lead_secs as i32,
                max_lead_secs: task.max_lead_secs.map(|s| s as i32),
                min_storage_temp_c: task.min_storage_temp_c,
                max_storage_temp_c: task.max_storage_temp_c,
                ordinal: ordinal as i32,
            },
        )
        .await?;
        for step in &task.steps {
            db::insert_prep_task_step(
                &mut *tx,
                &step.id,
                &task.id,
                &step.step_id,
                step.satisfies_step,
            )
            .await?;
        }
    }

    stage_data_change(
        &mut *tx,
        &DataChangeMessage::new(DataChangeType::RecipeCreated, household_id)
            .with_context(serde_json::json!({ "recipe_id": recipe.id, "steps": recipe.steps.len() })),
    )
    .await?;
    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(recipe_id = %recipe.id, steps = recipe.steps.len(), "recipe created");
    Ok(recipe)
}

fn assemble(
    household_id: &str,
    recipe_toml: &RecipeToml,
    catalog_ingredients: &HashMap<String, Ingredient>,
    units: &HashMap<String, String>,
    ids: &dyn IdGenerator,
) -> PlanResult<Recipe> {
    let recipe_id = ids.next_id();

    let step_ids: Vec<String> = recipe_toml.steps.iter().map(|_| ids.next_id()).collect();
    let mut product_ids: HashMap<&str, String> = HashMap::new();
    for step in &recipe_toml.steps {
        for name in &step.products {
            product_ids.insert(name.as_str(), ids.next_id());
        }
    }
    let product_id = |name: &Option<String>| -> Option<String> {
        name.as_deref().and_then(|n| product_ids.get(n).cloned())
    };
    let tools = |tools: &[ToolToml]| -> Vec<ToolUse> {
        tools
            .iter()
            .map(|t| ToolUse {
                id: ids.next_id(),
                name: t.name.clone(),
                product_ref: product_id(&t.product),
            })
            .collect()
    };

    let mut steps = Vec::with_capacity(recipe_toml.steps.len());
    for (i, step) in recipe_toml.steps.iter().enumerate() {
        let mut uses = Vec::with_capacity(step.ingredients.len());
        for use_ in &step.ingredients {
            let quantity = quantity_range(use_.min, use_.max).map_err(PlanError::Validation)?;
            uses.push(IngredientUse {
                id: ids.next_id(),
                ingredient: use_
                    .ingredient
                    .as_ref()
                    .and_then(|n| catalog_ingredients.get(n).cloned()),
                product_ref: product_id(&use_.product),
                measurement_unit_id: units.get(&use_.unit).cloned().unwrap_or_default(),
                quantity,
            });
        }

        steps.push(RecipeStep {
            id: step_ids[i].clone(),
            index: i as u32,
            preparation: step.preparation.clone(),
            notes: step.notes.clone(),
            ingredients: uses,
            instruments: tools(&step.instruments),
            vessels: tools(&step.vessels),
            products: step
                .products
                .iter()
                .map(|name| StepProduct {
                    id: product_ids[name.as_str()].clone(),
                    name: name.clone(),
                })
                .collect(),
            completion_conditions: step
                .completion_conditions
                .iter()
                .map(|c| CompletionCondition {
                    id: ids.next_id(),
                    ingredient_state: c.ingredient_state.clone(),
                    optional: c.optional,
                    notes: c.notes.clone(),
                })
                .collect(),
        });
    }

    let mut prep_tasks = Vec::with_capacity(recipe_toml.prep_tasks.len());
    for task in &recipe_toml.prep_tasks {
        let mut task_steps = Vec::with_capacity(task.steps.len());
        for s in &task.steps {
            let step_id = (s.step as usize)
                .checked_sub(1)
                .and_then(|i| step_ids.get(i))
                .ok_or_else(|| {
                    PlanError::Validation(format!(
                        "prep task {:?} refers to missing step #{}",
                        task.name, s.step
                    ))
                })?;
            task_steps.push(PrepTaskStep {
                id: ids.next_id(),
                step_id: step_id.clone(),
                satisfies_step: s.satisfies_step,
            });
        }
        prep_tasks.push(RecipePrepTask {
            id: ids.next_id(),
            name: task.name.clone(),
            description: task.description.clone(),
            min_lead_secs: task.min_lead_secs,
            max_lead_secs: task.max_lead_secs,
            min_storage_temp_c: task.min_storage_temp_c,
            max_storage_temp_c: task.max_storage_temp_c,
            steps: task_steps,
        });
    }

    Ok(Recipe {
        id: recipe_id,
        household_id: household_id.to_owned(),
        name: recipe_toml.recipe.name.clone(),
        description: recipe_toml.recipe.description.clone(),
        steps,
        prep_tasks,
    })
}

/// Load a stored recipe with all of its steps, uses, and prep tasks.
pub async fn load_recipe(conn: &mut PgConnection, recipe_id: &str) -> PlanResult<Recipe> {
    let header = db::get_recipe(&mut *conn, recipe_id)
        .await?
        .ok_or_else(|| PlanError::not_found("recipe", recipe_id))?;

    let step_rows = db::list_steps(&mut *conn, recipe_id).await?;
    let product_rows = db::list_step_products(&mut *conn, recipe_id).await?;
    let ingredient_rows = db::list_step_ingredients(&mut *conn, recipe_id).await?;
    let instrument_rows = db::list_step_tools(&mut *conn, ToolKind::Instrument, recipe_id).await?;
    let vessel_rows = db::list_step_tools(&mut *conn, ToolKind::Vessel, recipe_id).await?;
    let condition_rows = db::list_completion_conditions(&mut *conn, recipe_id).await?;
    let prep_task_rows = db::list_prep_tasks(&mut *conn, recipe_id).await?;
    let prep_task_step_rows = db::list_prep_task_steps(&mut *conn, recipe_id).await?;

    let mut steps: Vec<RecipeStep> = step_rows
        .into_iter()
        .map(|row| RecipeStep {
            id: row.id,
            index: row.step_index as u32,
            preparation: row.preparation,
            notes: row.notes,
            ingredients: Vec::new(),
            instruments: Vec::new(),
            vessels: Vec::new(),
            products: Vec::new(),
            completion_conditions: Vec::new(),
        })
        .collect();
    let position: HashMap<String, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.clone(), i))
        .collect();

    for row in product_rows {
        if let Some(&i) = position.get(&row.step_id) {
            steps[i].products.push(StepProduct {
                id: row.id,
                name: row.name,
            });
        }
    }

    for row in ingredient_rows {
        let Some(&i) = position.get(&row.step_id) else {
            continue;
        };
        let quantity = QuantityRange {
            min: Quantity::from_db(row.min_quantity)?,
            max: row.max_quantity.map(Quantity::from_db).transpose()?,
        };
        let ingredient = match (row.ingredient_id, row.ingredient_name) {
            (Some(id), Some(name)) => Some(Ingredient {
                id,
                name,
                min_ideal_storage_temp_c: row.min_ideal_storage_temp_c,
            }),
            _ => None,
        };
        steps[i].ingredients.push(IngredientUse {
            id: row.id,
            ingredient,
            product_ref: row.product_id,
            measurement_unit_id: row.measurement_unit_id,
            quantity,
        });
    }

    for (rows, is_vessel) in [(instrument_rows, false), (vessel_rows, true)] {
        for row in rows {
            if let Some(&i) = position.get(&row.step_id) {
                let tool = ToolUse {
                    id: row.id,
                    name: row.name,
                    product_ref: row.product_id,
                };
                if is_vessel {
                    steps[i].vessels.push(tool);
                } else {
                    steps[i].instruments.push(tool);
                }
            }
        }
    }

    for row in condition_rows {
        if let Some(&i) = position.get(&row.step_id) {
            steps[i].completion_conditions.push(CompletionCondition {
                id: row.id,
                ingredient_state: row.ingredient_state,
                optional: row.optional,
                notes: row.notes,
            });
        }
    }

    let mut task_steps: HashMap<String, Vec<PrepTaskStep>> = HashMap::new();
    for row in prep_task_step_rows {
        task_steps
            .entry(row.prep_task_id)
            .or_default()
            .push(PrepTaskStep {
                id: row.id,
                step_id: row.step_id,
                satisfies_step: row.satisfies_step,
            });
    }

    let prep_tasks = prep_task_rows
        .into_iter()
        .map(|row| RecipePrepTask {
            steps: task_steps.remove(&row.id).unwrap_or_default(),
            id: row.id,
            name: row.name,
            description: row.description,
            min_lead_secs: row.min_lead_secs.max(0) as u32,
            max_lead_secs: row.max_lead_secs.map(|s| s.max(0) as u32),
            min_storage_temp_c: row.min_storage_temp_c,
            max_storage_temp_c: row.max_storage_temp_c,
        })
        .collect();

    Ok(Recipe {
        id: header.id,
        household_id: header.household_id,
        name: header.name,
        description: header.description,
        steps,
        prep_tasks,
    })
}

/// Load a recipe and build its step graph.
pub async fn load_recipe_graph(pool: &PgPool, recipe_id: &str) -> PlanResult<RecipeGraph> {
    let mut conn = pool.acquire().await.context("failed to acquire connection")?;
    let recipe = load_recipe(&mut conn, recipe_id).await?;
    build_graph(&recipe)
}
