//! Database query functions for the `meal_plan_tasks` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::models::{MealPlanTask, MealPlanTaskStatus};

/// Fields of a task about to be inserted. New tasks are always `unfinished`.
#[derive(Debug, Clone)]
pub struct NewMealPlanTask<'a> {
    pub id: &'a str,
    pub meal_plan_id: &'a str,
    pub option_id: &'a str,
    pub recipe_id: &'a str,
    pub recipe_prep_task_id: Option<&'a str>,
    pub explanation: &'a str,
    pub assigned_user: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_task<'e>(
    executor: impl PgExecutor<'e>,
    new: &NewMealPlanTask<'_>,
) -> Result<MealPlanTask> {
    let task = sqlx::query_as::<_, MealPlanTask>(
        "INSERT INTO meal_plan_tasks \
         (id, meal_plan_id, option_id, recipe_id, recipe_prep_task_id, explanation, assigned_user, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(new.id)
    .bind(new.meal_plan_id)
    .bind(new.option_id)
    .bind(new.recipe_id)
    .bind(new.recipe_prep_task_id)
    .bind(new.explanation)
    .bind(new.assigned_user)
    .bind(new.created_at)
    .fetch_one(executor)
    .await
    .context("failed to insert meal plan task")?;

    Ok(task)
}

pub async fn get_task<'e>(executor: impl PgExecutor<'e>, id: &str) -> Result<Option<MealPlanTask>> {
    let task = sqlx::query_as::<_, MealPlanTask>("SELECT * FROM meal_plan_tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch meal plan task")?;

    Ok(task)
}

/// Tasks of a plan in creation order.
pub async fn list_tasks_for_plan<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: &str,
) -> Result<Vec<MealPlanTask>> {
    let tasks = sqlx::query_as::<_, MealPlanTask>(
        "SELECT * FROM meal_plan_tasks WHERE meal_plan_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(meal_plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list meal plan tasks")?;

    Ok(tasks)
}

pub async fn count_tasks_for_plan<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: &str,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM meal_plan_tasks WHERE meal_plan_id = $1")
        .bind(meal_plan_id)
        .fetch_one(executor)
        .await
        .context("failed to count meal plan tasks")?;

    Ok(row.0)
}

/// Atomically transition a task from one status to another.
///
/// Uses optimistic locking: the row only changes if its current status is
/// still `from`. `completed_at` is stamped when `to` is terminal. Returns
/// the number of rows affected (0 means the status did not match).
pub async fn transition_task_status<'e>(
    executor: impl PgExecutor<'e>,
    task_id: &str,
    from: MealPlanTaskStatus,
    to: MealPlanTaskStatus,
    explanation: &str,
    at: DateTime<Utc>,
) -> Result<u64> {
    let completed_at = to.is_terminal().then_some(at);
    let result = sqlx::query(
        "UPDATE meal_plan_tasks \
         SET status = $1, \
             status_explanation = $2, \
             completed_at = COALESCE($3, completed_at) \
         WHERE id = $4 AND status = $5",
    )
    .bind(to)
    .bind(explanation)
    .bind(completed_at)
    .bind(task_id)
    .bind(from)
    .execute(executor)
    .await
    .context("failed to transition meal plan task status")?;

    Ok(result.rows_affected())
}
