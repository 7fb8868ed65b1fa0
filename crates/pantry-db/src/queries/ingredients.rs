//! Database query functions for the catalog tables `valid_ingredients` and
//! `valid_measurement_units`.

use anyhow::{Context, Result};
use sqlx::PgExecutor;

use crate::models::{ValidIngredient, ValidMeasurementUnit};

/// Insert a catalog ingredient. Temperatures are degrees Celsius.
pub async fn insert_ingredient<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    name: &str,
    min_ideal_storage_temp_c: Option<f32>,
    max_ideal_storage_temp_c: Option<f32>,
) -> Result<ValidIngredient> {
    let ingredient = sqlx::query_as::<_, ValidIngredient>(
        "INSERT INTO valid_ingredients (id, name, min_ideal_storage_temp_c, max_ideal_storage_temp_c) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(id)
    .bind(name)
    .bind(min_ideal_storage_temp_c)
    .bind(max_ideal_storage_temp_c)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert ingredient {name:?}"))?;

    Ok(ingredient)
}

pub async fn get_ingredient<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<ValidIngredient>> {
    let ingredient =
        sqlx::query_as::<_, ValidIngredient>("SELECT * FROM valid_ingredients WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .context("failed to fetch ingredient")?;

    Ok(ingredient)
}

pub async fn get_ingredient_by_name<'e>(
    executor: impl PgExecutor<'e>,
    name: &str,
) -> Result<Option<ValidIngredient>> {
    let ingredient =
        sqlx::query_as::<_, ValidIngredient>("SELECT * FROM valid_ingredients WHERE name = $1")
            .bind(name)
            .fetch_optional(executor)
            .await
            .context("failed to fetch ingredient by name")?;

    Ok(ingredient)
}

pub async fn list_ingredients<'e>(executor: impl PgExecutor<'e>) -> Result<Vec<ValidIngredient>> {
    let ingredients =
        sqlx::query_as::<_, ValidIngredient>("SELECT * FROM valid_ingredients ORDER BY name ASC")
            .fetch_all(executor)
            .await
            .context("failed to list ingredients")?;

    Ok(ingredients)
}

pub async fn insert_measurement_unit<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    name: &str,
) -> Result<ValidMeasurementUnit> {
    let unit = sqlx::query_as::<_, ValidMeasurementUnit>(
        "INSERT INTO valid_measurement_units (id, name) VALUES ($1, $2) RETURNING *",
    )
    .bind(id)
    .bind(name)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert measurement unit {name:?}"))?;

    Ok(unit)
}

pub async fn get_measurement_unit_by_name<'e>(
    executor: impl PgExecutor<'e>,
    name: &str,
) -> Result<Option<ValidMeasurementUnit>> {
    let unit = sqlx::query_as::<_, ValidMeasurementUnit>(
        "SELECT * FROM valid_measurement_units WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(executor)
    .await
    .context("failed to fetch measurement unit by name")?;

    Ok(unit)
}

pub async fn list_measurement_units<'e>(
    executor: impl PgExecutor<'e>,
) -> Result<Vec<ValidMeasurementUnit>> {
    let units = sqlx::query_as::<_, ValidMeasurementUnit>(
        "SELECT * FROM valid_measurement_units ORDER BY name ASC",
    )
    .fetch_all(executor)
    .await
    .context("failed to list measurement units")?;

    Ok(units)
}
