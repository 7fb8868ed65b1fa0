//! Database query functions for `meals` and `meal_components`.

use anyhow::{Context, Result};
use sqlx::PgExecutor;

use crate::models::{Meal, MealComponent};

pub async fn insert_meal<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    name: &str,
    description: &str,
) -> Result<Meal> {
    let meal = sqlx::query_as::<_, Meal>(
        "INSERT INTO meals (id, name, description) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .fetch_one(executor)
    .await
    .context("failed to insert meal")?;

    Ok(meal)
}

pub async fn insert_component<'e>(
    executor: impl PgExecutor<'e>,
    meal_id: &str,
    recipe_id: &str,
    recipe_scale: f64,
    ordinal: i32,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO meal_components (meal_id, recipe_id, recipe_scale, ordinal) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(meal_id)
    .bind(recipe_id)
    .bind(recipe_scale)
    .bind(ordinal)
    .execute(executor)
    .await
    .context("failed to insert meal component")?;

    Ok(())
}

pub async fn get_meal<'e>(executor: impl PgExecutor<'e>, id: &str) -> Result<Option<Meal>> {
    let meal = sqlx::query_as::<_, Meal>("SELECT * FROM meals WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch meal")?;

    Ok(meal)
}

pub async fn list_meals<'e>(executor: impl PgExecutor<'e>) -> Result<Vec<Meal>> {
    let meals = sqlx::query_as::<_, Meal>(
        "SELECT * FROM meals WHERE archived_at IS NULL ORDER BY name ASC, id ASC",
    )
    .fetch_all(executor)
    .await
    .context("failed to list meals")?;

    Ok(meals)
}

/// Components of a meal in position order.
pub async fn list_components<'e>(
    executor: impl PgExecutor<'e>,
    meal_id: &str,
) -> Result<Vec<MealComponent>> {
    let components = sqlx::query_as::<_, MealComponent>(
        "SELECT * FROM meal_components WHERE meal_id = $1 ORDER BY ordinal ASC",
    )
    .bind(meal_id)
    .fetch_all(executor)
    .await
    .context("failed to list meal components")?;

    Ok(components)
}
