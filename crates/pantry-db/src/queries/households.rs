//! Database query functions for the `households` and `household_members`
//! tables.

use anyhow::{Context, Result};
use sqlx::PgExecutor;

use crate::models::{Household, HouseholdMember};

/// Insert a new household. Returns the row with server defaults.
pub async fn insert_household<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    name: &str,
) -> Result<Household> {
    let household = sqlx::query_as::<_, Household>(
        "INSERT INTO households (id, name) VALUES ($1, $2) RETURNING *",
    )
    .bind(id)
    .bind(name)
    .fetch_one(executor)
    .await
    .context("failed to insert household")?;

    Ok(household)
}

pub async fn get_household<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<Household>> {
    let household = sqlx::query_as::<_, Household>("SELECT * FROM households WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch household")?;

    Ok(household)
}

/// List active households, oldest first.
pub async fn list_households<'e>(executor: impl PgExecutor<'e>) -> Result<Vec<Household>> {
    let households = sqlx::query_as::<_, Household>(
        "SELECT * FROM households WHERE archived_at IS NULL ORDER BY created_at ASC, id ASC",
    )
    .fetch_all(executor)
    .await
    .context("failed to list households")?;

    Ok(households)
}

/// Add a user to a household.
///
/// Uses `ON CONFLICT DO NOTHING` so this is idempotent.
pub async fn add_member<'e>(
    executor: impl PgExecutor<'e>,
    household_id: &str,
    user_id: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO household_members (household_id, user_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(household_id)
    .bind(user_id)
    .execute(executor)
    .await
    .context("failed to add household member")?;

    Ok(())
}

/// Remove a user from a household. Returns the number of rows deleted.
pub async fn remove_member<'e>(
    executor: impl PgExecutor<'e>,
    household_id: &str,
    user_id: &str,
) -> Result<u64> {
    let result =
        sqlx::query("DELETE FROM household_members WHERE household_id = $1 AND user_id = $2")
            .bind(household_id)
            .bind(user_id)
            .execute(executor)
            .await
            .context("failed to remove household member")?;

    Ok(result.rows_affected())
}

pub async fn list_members<'e>(
    executor: impl PgExecutor<'e>,
    household_id: &str,
) -> Result<Vec<HouseholdMember>> {
    let members = sqlx::query_as::<_, HouseholdMember>(
        "SELECT * FROM household_members WHERE household_id = $1 ORDER BY user_id ASC",
    )
    .bind(household_id)
    .fetch_all(executor)
    .await
    .context("failed to list household members")?;

    Ok(members)
}

/// User ids of every member of a household, sorted.
pub async fn list_member_ids<'e>(
    executor: impl PgExecutor<'e>,
    household_id: &str,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT user_id FROM household_members WHERE household_id = $1 ORDER BY user_id ASC",
    )
    .bind(household_id)
    .fetch_all(executor)
    .await
    .context("failed to list household member ids")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
