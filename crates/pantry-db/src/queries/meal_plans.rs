//! Database query functions for `meal_plans`, `meal_plan_events`, and
//! `meal_plan_options`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::models::{MealName, MealPlan, MealPlanEvent, MealPlanOption, MealPlanStatus};

pub async fn insert_meal_plan<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    household_id: &str,
    notes: &str,
    voting_deadline: DateTime<Utc>,
    created_by_user: &str,
    created_at: DateTime<Utc>,
) -> Result<MealPlan> {
    let plan = sqlx::query_as::<_, MealPlan>(
        "INSERT INTO meal_plans (id, household_id, notes, voting_deadline, created_by_user, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(id)
    .bind(household_id)
    .bind(notes)
    .bind(voting_deadline)
    .bind(created_by_user)
    .bind(created_at)
    .fetch_one(executor)
    .await
    .context("failed to insert meal plan")?;

    Ok(plan)
}

pub async fn insert_event<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    meal_plan_id: &str,
    meal_name: MealName,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    notes: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO meal_plan_events (id, meal_plan_id, meal_name, starts_at, ends_at, notes) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(meal_plan_id)
    .bind(meal_name)
    .bind(starts_at)
    .bind(ends_at)
    .bind(notes)
    .execute(executor)
    .await
    .context("failed to insert meal plan event")?;

    Ok(())
}

pub async fn insert_option<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    event_id: &str,
    meal_id: &str,
    meal_scale: f64,
    notes: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO meal_plan_options (id, event_id, meal_id, meal_scale, notes) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(event_id)
    .bind(meal_id)
    .bind(meal_scale)
    .bind(notes)
    .execute(executor)
    .await
    .context("failed to insert meal plan option")?;

    Ok(())
}

pub async fn get_meal_plan<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<MealPlan>> {
    let plan = sqlx::query_as::<_, MealPlan>("SELECT * FROM meal_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch meal plan")?;

    Ok(plan)
}

/// Fetch a plan and hold a row lock on it until the transaction ends.
///
/// Every state-machine transition starts here, which serializes
/// transitions on the same plan while leaving other plans unblocked.
pub async fn lock_meal_plan<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<MealPlan>> {
    let plan = sqlx::query_as::<_, MealPlan>("SELECT * FROM meal_plans WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to lock meal plan")?;

    Ok(plan)
}

/// List plans, newest first, optionally filtered to one household.
pub async fn list_meal_plans<'e>(
    executor: impl PgExecutor<'e>,
    household_id: Option<&str>,
) -> Result<Vec<MealPlan>> {
    let plans = sqlx::query_as::<_, MealPlan>(
        "SELECT * FROM meal_plans \
         WHERE ($1::text IS NULL OR household_id = $1) \
         ORDER BY created_at DESC, id DESC",
    )
    .bind(household_id)
    .fetch_all(executor)
    .await
    .context("failed to list meal plans")?;

    Ok(plans)
}

/// Ids of unarchived plans still awaiting votes whose deadline has passed.
pub async fn list_expired_awaiting_votes<'e>(
    executor: impl PgExecutor<'e>,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT id FROM meal_plans \
         WHERE status = 'awaiting_votes' AND archived_at IS NULL AND voting_deadline <= $1 \
         ORDER BY voting_deadline ASC, id ASC",
    )
    .bind(now)
    .fetch_all(executor)
    .await
    .context("failed to list expired meal plans")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Ids of unarchived plans currently in `status`.
pub async fn list_ids_in_status<'e>(
    executor: impl PgExecutor<'e>,
    status: MealPlanStatus,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT id FROM meal_plans \
         WHERE status = $1 AND archived_at IS NULL \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(status)
    .fetch_all(executor)
    .await
    .context("failed to list meal plans by status")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Atomically move a plan from one status to another, stamping the
/// timestamp column that belongs to the target state.
///
/// Uses optimistic locking on `status = $from`; archived plans never
/// match. Returns the number of rows affected (0 means no transition).
pub async fn transition_plan_status<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    from: MealPlanStatus,
    to: MealPlanStatus,
    at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE meal_plans \
         SET status = $1, \
             finalized_at = CASE WHEN $1 = 'finalized' THEN $3 ELSE finalized_at END, \
             tasks_created_at = CASE WHEN $1 = 'tasks_created' THEN $3 ELSE tasks_created_at END, \
             grocery_list_initialized_at = CASE WHEN $1 = 'grocery_list_initialized' \
                 THEN $3 ELSE grocery_list_initialized_at END \
         WHERE id = $4 AND status = $2 AND archived_at IS NULL",
    )
    .bind(to)
    .bind(from)
    .bind(at)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to transition meal plan status")?;

    Ok(result.rows_affected())
}

/// Set `archived_at` unless already set. Returns rows affected.
pub async fn archive_meal_plan<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    at: DateTime<Utc>,
) -> Result<u64> {
    let result =
        sqlx::query("UPDATE meal_plans SET archived_at = $1 WHERE id = $2 AND archived_at IS NULL")
            .bind(at)
            .bind(id)
            .execute(executor)
            .await
            .context("failed to archive meal plan")?;

    Ok(result.rows_affected())
}

pub async fn get_event<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<MealPlanEvent>> {
    let event = sqlx::query_as::<_, MealPlanEvent>("SELECT * FROM meal_plan_events WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch meal plan event")?;

    Ok(event)
}

/// Events of a plan in chronological order.
pub async fn list_events<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: &str,
) -> Result<Vec<MealPlanEvent>> {
    let events = sqlx::query_as::<_, MealPlanEvent>(
        "SELECT * FROM meal_plan_events WHERE meal_plan_id = $1 ORDER BY starts_at ASC, id ASC",
    )
    .bind(meal_plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list meal plan events")?;

    Ok(events)
}

pub async fn list_options_for_event<'e>(
    executor: impl PgExecutor<'e>,
    event_id: &str,
) -> Result<Vec<MealPlanOption>> {
    let options = sqlx::query_as::<_, MealPlanOption>(
        "SELECT * FROM meal_plan_options WHERE event_id = $1 ORDER BY id ASC",
    )
    .bind(event_id)
    .fetch_all(executor)
    .await
    .context("failed to list meal plan options")?;

    Ok(options)
}

/// Every option of every event in a plan, grouped by event start time.
pub async fn list_options_for_plan<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: &str,
) -> Result<Vec<MealPlanOption>> {
    let options = sqlx::query_as::<_, MealPlanOption>(
        "SELECT o.* FROM meal_plan_options o \
         JOIN meal_plan_events e ON e.id = o.event_id \
         WHERE e.meal_plan_id = $1 \
         ORDER BY e.starts_at ASC, e.id ASC, o.id ASC",
    )
    .bind(meal_plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list options for meal plan")?;

    Ok(options)
}

/// Mark `winner_id` chosen and every other option of the event not chosen.
///
/// Returns the number of options stamped.
pub async fn finalize_option<'e>(
    executor: impl PgExecutor<'e>,
    event_id: &str,
    winner_id: &str,
    tiebroken: bool,
    at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE meal_plan_options \
         SET chosen = (id = $2), \
             tiebroken = (id = $2 AND $3), \
             finalized_at = $4 \
         WHERE event_id = $1",
    )
    .bind(event_id)
    .bind(winner_id)
    .bind(tiebroken)
    .bind(at)
    .execute(executor)
    .await
    .context("failed to finalize meal plan option")?;

    Ok(result.rows_affected())
}

/// Number of events in the plan without a chosen option.
pub async fn count_unchosen_events<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: &str,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM meal_plan_events e \
         WHERE e.meal_plan_id = $1 \
           AND NOT EXISTS ( \
               SELECT 1 FROM meal_plan_options o WHERE o.event_id = e.id AND o.chosen \
           )",
    )
    .bind(meal_plan_id)
    .fetch_one(executor)
    .await
    .context("failed to count unchosen events")?;

    Ok(row.0)
}
