//! Database query functions for the `outbox_messages` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::models::{OutboxMessage, OutboxTopic};

/// Append a message. Returns its sequence id.
pub async fn enqueue<'e>(
    executor: impl PgExecutor<'e>,
    topic: OutboxTopic,
    payload: &serde_json::Value,
) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("INSERT INTO outbox_messages (topic, payload) VALUES ($1, $2) RETURNING id")
            .bind(topic)
            .bind(payload)
            .fetch_one(executor)
            .await
            .context("failed to enqueue outbox message")?;

    Ok(row.0)
}

/// Claim up to `limit` unpublished messages in id order.
///
/// Rows are locked with `FOR UPDATE SKIP LOCKED`, so concurrent pumps
/// never claim the same message. Call inside a transaction.
pub async fn claim_pending<'e>(
    executor: impl PgExecutor<'e>,
    limit: i64,
) -> Result<Vec<OutboxMessage>> {
    let messages = sqlx::query_as::<_, OutboxMessage>(
        "SELECT * FROM outbox_messages \
         WHERE published_at IS NULL \
         ORDER BY id ASC \
         LIMIT $1 \
         FOR UPDATE SKIP LOCKED",
    )
    .bind(limit)
    .fetch_all(executor)
    .await
    .context("failed to claim outbox messages")?;

    Ok(messages)
}

pub async fn mark_published<'e>(
    executor: impl PgExecutor<'e>,
    id: i64,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE outbox_messages SET published_at = $1, attempts = attempts + 1, last_error = NULL \
         WHERE id = $2",
    )
    .bind(at)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to mark outbox message published")?;

    Ok(())
}

pub async fn record_failure<'e>(executor: impl PgExecutor<'e>, id: i64, error: &str) -> Result<()> {
    sqlx::query("UPDATE outbox_messages SET attempts = attempts + 1, last_error = $1 WHERE id = $2")
        .bind(error)
        .bind(id)
        .execute(executor)
        .await
        .context("failed to record outbox failure")?;

    Ok(())
}

pub async fn count_pending<'e>(executor: impl PgExecutor<'e>) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM outbox_messages WHERE published_at IS NULL")
            .fetch_one(executor)
            .await
            .context("failed to count pending outbox messages")?;

    Ok(row.0)
}

/// Most recent messages first, for inspection.
pub async fn list_recent<'e>(
    executor: impl PgExecutor<'e>,
    limit: i64,
) -> Result<Vec<OutboxMessage>> {
    let messages = sqlx::query_as::<_, OutboxMessage>(
        "SELECT * FROM outbox_messages ORDER BY id DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(executor)
    .await
    .context("failed to list outbox messages")?;

    Ok(messages)
}
