//! Households and their members.

use anyhow::Context;
use sqlx::PgPool;

use pantry_db::models::{Household, HouseholdMember};
use pantry_db::queries::households as db;

use crate::error::{PlanError, PlanResult};
use crate::ids::IdGenerator;
use crate::outbox::{DataChangeMessage, DataChangeType, stage_data_change};

#[tracing::instrument(skip(pool, ids))]
pub async fn create_household(
    pool: &PgPool,
    name: &str,
    ids: &dyn IdGenerator,
) -> PlanResult<Household> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PlanError::Validation("household name must not be empty".into()));
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let household = db::insert_household(&mut *tx, &ids.next_id(), name).await?;
    stage_data_change(
        &mut *tx,
        &DataChangeMessage::new(DataChangeType::HouseholdCreated, &household.id),
    )
    .await?;
    tx.commit().await.context("failed to commit transaction")?;

    tracing::info!(household_id = %household.id, "household created");
    Ok(household)
}

/// Add `user_id` to a household. Adding an existing member is a no-op.
#[tracing::instrument(skip(pool))]
pub async fn add_member(pool: &PgPool, household_id: &str, user_id: &str) -> PlanResult<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    require_household(&mut tx, household_id).await?;
    db::add_member(&mut *tx, household_id, user_id).await?;
    stage_data_change(
        &mut *tx,
        &DataChangeMessage::new(DataChangeType::HouseholdMemberAdded, household_id).user(user_id),
    )
    .await?;
    tx.commit().await.context("failed to commit transaction")?;
    Ok(())
}

/// Remove `user_id` from a household. Ballots already cast are kept.
#[tracing::instrument(skip(pool))]
pub async fn remove_member(pool: &PgPool, household_id: &str, user_id: &str) -> PlanResult<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    require_household(&mut tx, household_id).await?;
    if db::remove_member(&mut *tx, household_id, user_id).await? == 0 {
        return Err(PlanError::not_found("household member", user_id));
    }
    stage_data_change(
        &mut *tx,
        &DataChangeMessage::new(DataChangeType::HouseholdMemberRemoved, household_id)
            .user(user_id),
    )
    .await?;
    tx.commit().await.context("failed to commit transaction")?;
    Ok(())
}

pub async fn list_members(pool: &PgPool, household_id: &str) -> PlanResult<Vec<HouseholdMember>> {
    let mut conn = pool.acquire().await.context("failed to acquire connection")?;
    require_household(&mut conn, household_id).await?;
    Ok(db::list_members(&mut *conn, household_id).await?)
}

async fn require_household(
    conn: &mut sqlx::PgConnection,
    household_id: &str,
) -> PlanResult<Household> {
    db::get_household(&mut *conn, household_id)
        .await?
        .ok_or_else(|| PlanError::not_found("household", household_id))
}
