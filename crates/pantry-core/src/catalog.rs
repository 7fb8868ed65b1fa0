//! Shared ingredient and measurement-unit catalog.
//!
//! Catalog names are unique; recipes refer to entries by name when
//! authored and by id once stored.

use sqlx::PgPool;

use pantry_db::models::{ValidIngredient, ValidMeasurementUnit};
use pantry_db::queries::ingredients as db;

use crate::error::{PlanError, PlanResult};
use crate::ids::IdGenerator;

/// Ideal storage range of an ingredient, in degrees Celsius. A minimum at or
/// below [`FROZEN_STORAGE_MAX_C`](crate::recipe::FROZEN_STORAGE_MAX_C) marks
/// the ingredient as frozen for defrost tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StorageTemperature {
    pub min_c: Option<f32>,
    pub max_c: Option<f32>,
}

#[tracing::instrument(skip(pool, ids))]
pub async fn add_ingredient(
    pool: &PgPool,
    name: &str,
    storage: StorageTemperature,
    ids: &dyn IdGenerator,
) -> PlanResult<ValidIngredient> {
    let name = checked_name("ingredient", name)?;
    if let (Some(min), Some(max)) = (storage.min_c, storage.max_c) {
        if min > max {
            return Err(PlanError::Validation(format!(
                "ingredient {name:?}: storage minimum {min} is above maximum {max}"
            )));
        }
    }
    if db::get_ingredient_by_name(pool, name).await?.is_some() {
        return Err(PlanError::Conflict(format!("ingredient {name:?} already exists")));
    }

    let ingredient =
        db::insert_ingredient(pool, &ids.next_id(), name, storage.min_c, storage.max_c).await?;
    tracing::info!(ingredient_id = %ingredient.id, name, "ingredient added");
    Ok(ingredient)
}

#[tracing::instrument(skip(pool, ids))]
pub async fn add_measurement_unit(
    pool: &PgPool,
    name: &str,
    ids: &dyn IdGenerator,
) -> PlanResult<ValidMeasurementUnit> {
    let name = checked_name("measurement unit", name)?;
    if db::get_measurement_unit_by_name(pool, name).await?.is_some() {
        return Err(PlanError::Conflict(format!(
            "measurement unit {name:?} already exists"
        )));
    }

    let unit = db::insert_measurement_unit(pool, &ids.next_id(), name).await?;
    tracing::info!(unit_id = %unit.id, name, "measurement unit added");
    Ok(unit)
}

fn checked_name<'a>(kind: &str, name: &'a str) -> PlanResult<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PlanError::Validation(format!("{kind} name must not be empty")));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed() {
        assert_eq!(checked_name("ingredient", "  flour ").unwrap(), "flour");
    }

    #[test]
    fn blank_names_are_rejected() {
        let err = checked_name("measurement unit", "   ").unwrap_err();
        assert!(matches!(err, PlanError::Validation(msg) if msg.contains("measurement unit")));
    }
}
