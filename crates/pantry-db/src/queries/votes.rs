//! Database query functions for `meal_plan_option_votes`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};

use crate::models::MealPlanOptionVote;

/// One row of a ballot about to be written. `rank` is `None` for abstentions.
#[derive(Debug, Clone)]
pub struct NewVote {
    pub id: String,
    pub option_id: String,
    pub rank: Option<i32>,
    pub abstain: bool,
}

/// Replace a voter's ballot for an event: delete every prior row for
/// (event, voter) and insert `rows`.
///
/// Run this inside a transaction so readers never observe a half-written
/// ballot.
pub async fn replace_ballot(
    conn: &mut PgConnection,
    event_id: &str,
    voter_id: &str,
    rows: &[NewVote],
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("DELETE FROM meal_plan_option_votes WHERE event_id = $1 AND voter_id = $2")
        .bind(event_id)
        .bind(voter_id)
        .execute(&mut *conn)
        .await
        .context("failed to delete previous ballot")?;

    for row in rows {
        sqlx::query(
            "INSERT INTO meal_plan_option_votes \
             (id, event_id, option_id, voter_id, rank, abstain, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&row.id)
        .bind(event_id)
        .bind(&row.option_id)
        .bind(voter_id)
        .bind(row.rank)
        .bind(row.abstain)
        .bind(at)
        .execute(&mut *conn)
        .await
        .context("failed to insert vote")?;
    }

    Ok(())
}

/// All vote rows for an event, grouped by voter.
pub async fn list_votes_for_event<'e>(
    executor: impl PgExecutor<'e>,
    event_id: &str,
) -> Result<Vec<MealPlanOptionVote>> {
    let votes = sqlx::query_as::<_, MealPlanOptionVote>(
        "SELECT * FROM meal_plan_option_votes \
         WHERE event_id = $1 \
         ORDER BY voter_id ASC, rank ASC NULLS LAST, option_id ASC",
    )
    .bind(event_id)
    .fetch_all(executor)
    .await
    .context("failed to list votes for event")?;

    Ok(votes)
}

/// Distinct voters who have cast a ballot (ranked or abstaining) on an event.
pub async fn list_voter_ids_for_event<'e>(
    executor: impl PgExecutor<'e>,
    event_id: &str,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT voter_id FROM meal_plan_option_votes \
         WHERE event_id = $1 \
         ORDER BY voter_id ASC",
    )
    .bind(event_id)
    .fetch_all(executor)
    .await
    .context("failed to list voters for event")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
