//! Meal-plan service layer.

use std::collections::HashMap;

use anyhow::Context;
use serde_json::json;
use sqlx::{PgConnection, PgPool};

use pantry_db::queries::{households, meal_plans as db, meals};

use super::toml_format::MealPlanToml;
use super::{ChosenMeal, EventWithOptions, MealRecipe, PlanAggregate};
use crate::clock::Clock;
use crate::error::{PlanError, PlanResult};
use crate::ids::IdGenerator;
use crate::outbox::{DataChangeMessage, DataChangeType, stage_data_change};
use crate::recipe::{Recipe, load_recipe};

/// Create a meal plan in `awaiting_votes` from a parsed [`MealPlanToml`].
///
/// The household and every referenced meal must exist. The plan, its
/// events and options, and a `meal_plan_created` data-change message are
/// written in one transaction.
#[tracing::instrument(skip(pool, plan_toml, ids, clock), fields(household = %plan_toml.plan.household))]
pub async fn create_meal_plan_from_toml(
    pool: &PgPool,
    plan_toml: &MealPlanToml,
    created_by_user: &str,
    ids: &dyn IdGenerator,
    clock: &dyn Clock,
) -> PlanResult<PlanAggregate> {
    let household_id = plan_toml.plan.household.as_str();
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    if households::get_household(&mut *tx, household_id)
        .await?
        .is_none()
    {
        return Err(PlanError::not_found("household", household_id));
    }

    let mut missing: Vec<&str> = Vec::new();
    for option in plan_toml.events.iter().flat_map(|e| &e.options) {
        if !missing.contains(&option.meal.as_str())
            && meals::get_meal(&mut *tx, &option.meal).await?.is_none()
        {
            missing.push(&option.meal);
        }
    }
    if !missing.is_empty() {
        return Err(PlanError::Validation(format!(
            "meal plan references unknown meals: {}",
            missing.join(", ")
        )));
    }

    let now = clock.now();
    let plan_id = ids.next_id();
    db::insert_meal_plan(
        &mut *tx,
        &plan_id,
        household_id,
        &plan_toml.plan.notes,
        plan_toml.plan.voting_deadline,
        created_by_user,
        now,
    )
    .await?;

    for event in &plan_toml.events {
        let event_id = ids.next_id();
        db::insert_event(
            &mut *tx,
            &event_id,
            &plan_id,
            event.meal_name,
            event.starts_at,
            event.ends_at,
            &event.notes,
        )
        .await?;
        for option in &event.options {
            db::insert_option(
                &mut *tx,
                &ids.next_id(),
                &event_id,
                &option.meal,
                option.scale,
                &option.notes,
            )
            .await?;
        }
    }

    stage_data_change(
        &mut *tx,
        &DataChangeMessage::new(DataChangeType::MealPlanCreated, household_id)
            .meal_plan(&plan_id)
            .user(created_by_user)
            .with_context(json!({ "events": plan_toml.events.len() })),
    )
    .await?;

    let aggregate = load_plan(&mut tx, &plan_id).await?;
    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(meal_plan_id = %plan_id, events = aggregate.events.len(), "meal plan created");
    Ok(aggregate)
}

/// Load a plan with its events and options.
pub async fn load_plan(conn: &mut PgConnection, plan_id: &str) -> PlanResult<PlanAggregate> {
    let plan = db::get_meal_plan(&mut *conn, plan_id)
        .await?
        .ok_or_else(|| PlanError::not_found("meal plan", plan_id))?;
    let events = db::list_events(&mut *conn, plan_id).await?;
    let options = db::list_options_for_plan(&mut *conn, plan_id).await?;

    let mut by_event: HashMap<String, Vec<_>> = HashMap::new();
    for option in options {
        by_event.entry(option.event_id.clone()).or_default().push(option);
    }

    let events = events
        .into_iter()
        .map(|event| EventWithOptions {
            options: by_event.remove(&event.id).unwrap_or_default(),
            event,
        })
        .collect();

    Ok(PlanAggregate { plan, events })
}

/// Load the chosen option of every finalized event, with recipes, in event
/// order. Events without a chosen option are skipped.
pub async fn load_chosen_meals(
    conn: &mut PgConnection,
    aggregate: &PlanAggregate,
) -> PlanResult<Vec<ChosenMeal>> {
    let mut recipes: HashMap<String, Recipe> = HashMap::new();
    let mut chosen_meals = Vec::new();

    for entry in &aggregate.events {
        let Some(option) = entry.chosen() else {
            tracing::warn!(
                meal_plan_id = %aggregate.plan.id,
                event_id = %entry.event.id,
                "event has no chosen option, skipping"
            );
            continue;
        };

        let components = meals::list_components(&mut *conn, &option.meal_id).await?;
        let mut meal_recipes = Vec::with_capacity(components.len());
        for component in components {
            let recipe = match recipes.get(&component.recipe_id) {
                Some(recipe) => recipe.clone(),
                None => {
                    let recipe = load_recipe(&mut *conn, &component.recipe_id).await?;
                    recipes.insert(component.recipe_id.clone(), recipe.clone());
                    recipe
                }
            };
            meal_recipes.push(MealRecipe {
                recipe_scale: component.recipe_scale,
                recipe,
            });
        }

        chosen_meals.push(ChosenMeal {
            event_id: entry.event.id.clone(),
            starts_at: entry.event.starts_at,
            option_id: option.id.clone(),
            meal_id: option.meal_id.clone(),
            meal_scale: option.meal_scale,
            recipes: meal_recipes,
        });
    }

    Ok(chosen_meals)
}
