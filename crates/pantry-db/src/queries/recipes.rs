//! Database query functions for `recipes` and the tables hanging off
//! `recipe_steps`: products, ingredient uses, instrument and vessel uses,
//! completion conditions, and prep tasks.
//!
//! Listing functions return rows for a whole recipe in a stable order
//! (step index, then ordinal) so the core can assemble the aggregate in one
//! pass.

use anyhow::{Context, Result};
use sqlx::PgExecutor;

use crate::models::{
    Recipe, RecipePrepTask, RecipePrepTaskStep, RecipeStep, RecipeStepCompletionCondition,
    RecipeStepIngredient, RecipeStepProduct, RecipeStepTool,
};

/// Which of the two tool tables a use belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Instrument,
    Vessel,
}

impl ToolKind {
    fn table(self) -> &'static str {
        match self {
            Self::Instrument => "recipe_step_instruments",
            Self::Vessel => "recipe_step_vessels",
        }
    }
}

/// Fields of a new ingredient use. Quantities are hundredths.
#[derive(Debug, Clone)]
pub struct NewStepIngredient<'a> {
    pub id: &'a str,
    pub step_id: &'a str,
    pub ingredient_id: Option<&'a str>,
    pub product_id: Option<&'a str>,
    pub measurement_unit_id: &'a str,
    pub min_quantity: i64,
    pub max_quantity: Option<i64>,
    pub ordinal: i32,
}

/// Fields of a new recipe prep task.
#[derive(Debug, Clone)]
pub struct NewPrepTask<'a> {
    pub id: &'a str,
    pub recipe_id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub min_lead_secs: i32,
    pub max_lead_secs: Option<i32>,
    pub min_storage_temp_c: Option<f32>,
    pub max_storage_temp_c: Option<f32>,
    pub ordinal: i32,
}

pub async fn insert_recipe<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    household_id: &str,
    name: &str,
    description: &str,
) -> Result<Recipe> {
    let recipe = sqlx::query_as::<_, Recipe>(
        "INSERT INTO recipes (id, household_id, name, description) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(id)
    .bind(household_id)
    .bind(name)
    .bind(description)
    .fetch_one(executor)
    .await
    .context("failed to insert recipe")?;

    Ok(recipe)
}

pub async fn insert_step<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    recipe_id: &str,
    step_index: i32,
    preparation: &str,
    notes: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO recipe_steps (id, recipe_id, step_index, preparation, notes) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(recipe_id)
    .bind(step_index)
    .bind(preparation)
    .bind(notes)
    .execute(executor)
    .await
    .with_context(|| format!("failed to insert step {step_index}"))?;

    Ok(())
}

pub async fn insert_step_product<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    step_id: &str,
    name: &str,
    ordinal: i32,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO recipe_step_products (id, step_id, name, ordinal) VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(step_id)
    .bind(name)
    .bind(ordinal)
    .execute(executor)
    .await
    .with_context(|| format!("failed to insert step product {name:?}"))?;

    Ok(())
}

pub async fn insert_step_ingredient<'e>(
    executor: impl PgExecutor<'e>,
    new: &NewStepIngredient<'_>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO recipe_step_ingredients \
         (id, step_id, ingredient_id, product_id, measurement_unit_id, min_quantity, max_quantity, ordinal) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(new.id)
    .bind(new.step_id)
    .bind(new.ingredient_id)
    .bind(new.product_id)
    .bind(new.measurement_unit_id)
    .bind(new.min_quantity)
    .bind(new.max_quantity)
    .bind(new.ordinal)
    .execute(executor)
    .await
    .context("failed to insert step ingredient")?;

    Ok(())
}

/// Insert an instrument or vessel use.
pub async fn insert_step_tool<'e>(
    executor: impl PgExecutor<'e>,
    kind: ToolKind,
    id: &str,
    step_id: &str,
    name: &str,
    product_id: Option<&str>,
    ordinal: i32,
) -> Result<()> {
    let stmt = format!(
        "INSERT INTO {} (id, step_id, name, product_id, ordinal) VALUES ($1, $2, $3, $4, $5)",
        kind.table()
    );
    sqlx::query(&stmt)
        .bind(id)
        .bind(step_id)
        .bind(name)
        .bind(product_id)
        .bind(ordinal)
        .execute(executor)
        .await
        .with_context(|| format!("failed to insert into {}", kind.table()))?;

    Ok(())
}

pub async fn insert_completion_condition<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    step_id: &str,
    ingredient_state: &str,
    optional: bool,
    notes: &str,
    ordinal: i32,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO recipe_step_completion_conditions \
         (id, step_id, ingredient_state, optional, notes, ordinal) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(step_id)
    .bind(ingredient_state)
    .bind(optional)
    .bind(notes)
    .bind(ordinal)
    .execute(executor)
    .await
    .context("failed to insert completion condition")?;

    Ok(())
}

pub async fn insert_prep_task<'e>(
    executor: impl PgExecutor<'e>,
    new: &NewPrepTask<'_>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO recipe_prep_tasks \
         (id, recipe_id, name, description, min_lead_secs, max_lead_secs, \
          min_storage_temp_c, max_storage_temp_c, ordinal) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(new.id)
    .bind(new.recipe_id)
    .bind(new.name)
    .bind(new.description)
    .bind(new.min_lead_secs)
    .bind(new.max_lead_secs)
    .bind(new.min_storage_temp_c)
    .bind(new.max_storage_temp_c)
    .bind(new.ordinal)
    .execute(executor)
    .await
    .with_context(|| format!("failed to insert prep task {:?}", new.name))?;

    Ok(())
}

pub async fn insert_prep_task_step<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    prep_task_id: &str,
    step_id: &str,
    satisfies_step: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO recipe_prep_task_steps (id, prep_task_id, step_id, satisfies_step) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(prep_task_id)
    .bind(step_id)
    .bind(satisfies_step)
    .execute(executor)
    .await
    .context("failed to insert prep task step")?;

    Ok(())
}

pub async fn get_recipe<'e>(executor: impl PgExecutor<'e>, id: &str) -> Result<Option<Recipe>> {
    let recipe = sqlx::query_as::<_, Recipe>("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch recipe")?;

    Ok(recipe)
}

/// List a household's active recipes by name.
pub async fn list_recipes<'e>(
    executor: impl PgExecutor<'e>,
    household_id: &str,
) -> Result<Vec<Recipe>> {
    let recipes = sqlx::query_as::<_, Recipe>(
        "SELECT * FROM recipes \
         WHERE household_id = $1 AND archived_at IS NULL \
         ORDER BY name ASC, id ASC",
    )
    .bind(household_id)
    .fetch_all(executor)
    .await
    .context("failed to list recipes")?;

    Ok(recipes)
}

pub async fn list_steps<'e>(
    executor: impl PgExecutor<'e>,
    recipe_id: &str,
) -> Result<Vec<RecipeStep>> {
    let steps = sqlx::query_as::<_, RecipeStep>(
        "SELECT * FROM recipe_steps WHERE recipe_id = $1 ORDER BY step_index ASC",
    )
    .bind(recipe_id)
    .fetch_all(executor)
    .await
    .context("failed to list recipe steps")?;

    Ok(steps)
}

pub async fn list_step_products<'e>(
    executor: impl PgExecutor<'e>,
    recipe_id: &str,
) -> Result<Vec<RecipeStepProduct>> {
    let products = sqlx::query_as::<_, RecipeStepProduct>(
        "SELECT p.* FROM recipe_step_products p \
         JOIN recipe_steps s ON s.id = p.step_id \
         WHERE s.recipe_id = $1 \
         ORDER BY s.step_index ASC, p.ordinal ASC",
    )
    .bind(recipe_id)
    .fetch_all(executor)
    .await
    .context("failed to list step products")?;

    Ok(products)
}

/// Ingredient uses of a recipe, joined with the catalog ingredient (if any).
pub async fn list_step_ingredients<'e>(
    executor: impl PgExecutor<'e>,
    recipe_id: &str,
) -> Result<Vec<RecipeStepIngredient>> {
    let uses = sqlx::query_as::<_, RecipeStepIngredient>(
        "SELECT u.id, u.step_id, u.ingredient_id, i.name AS ingredient_name, \
                i.min_ideal_storage_temp_c, u.product_id, u.measurement_unit_id, \
                u.min_quantity, u.max_quantity, u.ordinal \
         FROM recipe_step_ingredients u \
         JOIN recipe_steps s ON s.id = u.step_id \
         LEFT JOIN valid_ingredients i ON i.id = u.ingredient_id \
         WHERE s.recipe_id = $1 \
         ORDER BY s.step_index ASC, u.ordinal ASC",
    )
    .bind(recipe_id)
    .fetch_all(executor)
    .await
    .context("failed to list step ingredients")?;

    Ok(uses)
}

pub async fn list_step_tools<'e>(
    executor: impl PgExecutor<'e>,
    kind: ToolKind,
    recipe_id: &str,
) -> Result<Vec<RecipeStepTool>> {
    let stmt = format!(
        "SELECT t.* FROM {} t \
         JOIN recipe_steps s ON s.id = t.step_id \
         WHERE s.recipe_id = $1 \
         ORDER BY s.step_index ASC, t.ordinal ASC",
        kind.table()
    );
    let tools = sqlx::query_as::<_, RecipeStepTool>(&stmt)
        .bind(recipe_id)
        .fetch_all(executor)
        .await
        .with_context(|| format!("failed to list {}", kind.table()))?;

    Ok(tools)
}

pub async fn list_completion_conditions<'e>(
    executor: impl PgExecutor<'e>,
    recipe_id: &str,
) -> Result<Vec<RecipeStepCompletionCondition>> {
    let conditions = sqlx::query_as::<_, RecipeStepCompletionCondition>(
        "SELECT c.* FROM recipe_step_completion_conditions c \
         JOIN recipe_steps s ON s.id = c.step_id \
         WHERE s.recipe_id = $1 \
         ORDER BY s.step_index ASC, c.ordinal ASC",
    )
    .bind(recipe_id)
    .fetch_all(executor)
    .await
    .context("failed to list completion conditions")?;

    Ok(conditions)
}

pub async fn list_prep_tasks<'e>(
    executor: impl PgExecutor<'e>,
    recipe_id: &str,
) -> Result<Vec<RecipePrepTask>> {
    let tasks = sqlx::query_as::<_, RecipePrepTask>(
        "SELECT * FROM recipe_prep_tasks WHERE recipe_id = $1 ORDER BY ordinal ASC",
    )
    .bind(recipe_id)
    .fetch_all(executor)
    .await
    .context("failed to list recipe prep tasks")?;

    Ok(tasks)
}

pub async fn list_prep_task_steps<'e>(
    executor: impl PgExecutor<'e>,
    recipe_id: &str,
) -> Result<Vec<RecipePrepTaskStep>> {
    let steps = sqlx::query_as::<_, RecipePrepTaskStep>(
        "SELECT ps.* FROM recipe_prep_task_steps ps \
         JOIN recipe_prep_tasks t ON t.id = ps.prep_task_id \
         WHERE t.recipe_id = $1 \
         ORDER BY t.ordinal ASC, ps.id ASC",
    )
    .bind(recipe_id)
    .fetch_all(executor)
    .await
    .context("failed to list prep task steps")?;

    Ok(steps)
}
