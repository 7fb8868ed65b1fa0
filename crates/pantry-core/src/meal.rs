//! Meals: named, ordered groups of scaled recipes that plan options point at.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use pantry_db::models::{Meal, MealComponent};
use pantry_db::queries::{meals as db, recipes};

use crate::error::{PlanError, PlanResult};
use crate::ids::IdGenerator;
use crate::outbox::{DataChangeMessage, DataChangeType, stage_data_change};
use crate::quantity::ScaleFactor;

/// One recipe of a new meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComponent {
    pub recipe_id: String,
    #[serde(default = "default_scale")]
    pub recipe_scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

/// A stored meal with its components in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealWithComponents {
    pub meal: Meal,
    pub components: Vec<MealComponent>,
}

/// Create a meal from recipes owned by `household_id`.
#[tracing::instrument(skip(pool, components, ids))]
pub async fn create_meal(
    pool: &PgPool,
    household_id: &str,
    name: &str,
    description: &str,
    components: &[NewComponent],
    ids: &dyn IdGenerator,
) -> PlanResult<MealWithComponents> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PlanError::Validation("meal name must not be empty".into()));
    }
    if components.is_empty() {
        return Err(PlanError::Validation(format!(
            "meal {name:?} needs at least one recipe"
        )));
    }
    for component in components {
        ScaleFactor::new(component.recipe_scale)?;
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    for component in components {
        let recipe = recipes::get_recipe(&mut *tx, &component.recipe_id)
            .await?
            .ok_or_else(|| PlanError::not_found("recipe", &component.recipe_id))?;
        if recipe.household_id != household_id {
            return Err(PlanError::Validation(format!(
                "recipe {} does not belong to household {household_id}",
                recipe.id
            )));
        }
    }

    let meal = db::insert_meal(&mut *tx, &ids.next_id(), name, description).await?;
    for (ordinal, component) in components.iter().enumerate() {
        db::insert_component(
            &mut *tx,
            &meal.id,
            &component.recipe_id,
            component.recipe_scale,
            ordinal as i32,
        )
        .await?;
    }
    let stored = db::list_components(&mut *tx, &meal.id).await?;
    stage_data_change(
        &mut *tx,
        &DataChangeMessage::new(DataChangeType::MealCreated, household_id)
            .with_context(serde_json::json!({ "meal_id": meal.id })),
    )
    .await?;
    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(meal_id = %meal.id, components = stored.len(), "meal created");
    Ok(MealWithComponents {
        meal,
        components: stored,
    })
}

pub async fn get_meal(pool: &PgPool, meal_id: &str) -> PlanResult<MealWithComponents> {
    let meal = db::get_meal(pool, meal_id)
        .await?
        .ok_or_else(|| PlanError::not_found("meal", meal_id))?;
    let components = db::list_components(pool, meal_id).await?;
    Ok(MealWithComponents { meal, components })
}
