//! Transactional outbox.
//!
//! State transitions stage a [`DataChangeMessage`] in the same transaction
//! that changes the plan. After commit, an [`OutboxPump`] claims staged rows
//! and hands them to a [`Publisher`]. A failed publish is recorded on the
//! row and retried on a later drain; it never touches the committed change.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use pantry_db::models::OutboxTopic;
use pantry_db::queries::outbox as db;

use crate::clock::Clock;
use crate::error::PlanResult;

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataChangeType {
    HouseholdCreated,
    HouseholdMemberAdded,
    HouseholdMemberRemoved,
    RecipeCreated,
    MealCreated,
    MealPlanCreated,
    MealPlanVoteRecorded,
    MealPlanEventFinalized,
    MealPlanFinalized,
    MealPlanTasksCreated,
    MealPlanGroceryListInitialized,
    MealPlanArchived,
    MealPlanTaskStatusChanged,
    MealPlanGroceryListItemUpdated,
}

/// Payload of a `data_changes` outbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChangeMessage {
    pub event_type: DataChangeType,
    pub household_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl DataChangeMessage {
    pub fn new(event_type: DataChangeType, household_id: impl Into<String>) -> Self {
        Self {
            event_type,
            household_id: household_id.into(),
            meal_plan_id: None,
            event_id: None,
            option_id: None,
            task_id: None,
            user_id: None,
            context: serde_json::Value::Null,
        }
    }

    pub fn meal_plan(mut self, id: impl Into<String>) -> Self {
        self.meal_plan_id = Some(id.into());
        self
    }

    pub fn event(mut self, id: impl Into<String>) -> Self {
        self.event_id = Some(id.into());
        self
    }

    pub fn option(mut self, id: impl Into<String>) -> Self {
        self.option_id = Some(id.into());
        self
    }

    pub fn task(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn user(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Write `message` to the `data_changes` topic using the caller's
/// transaction.
pub async fn stage_data_change<'e>(
    executor: impl PgExecutor<'e>,
    message: &DataChangeMessage,
) -> PlanResult<i64> {
    let payload = serde_json::to_value(message).context("failed to encode data change")?;
    let id = db::enqueue(executor, OutboxTopic::DataChanges, &payload).await?;
    Ok(id)
}

/// Destination for outbox messages: a queue, a webhook relay, a log.
///
/// # Object Safety
///
/// Stored as `Arc<dyn Publisher>` by the pump.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: OutboxTopic, payload: &serde_json::Value) -> anyhow::Result<()>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Publisher) {}
};

/// Publisher that emits each message as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

#[async_trait]
impl Publisher for TracingPublisher {
    async fn publish(&self, topic: OutboxTopic, payload: &serde_json::Value) -> anyhow::Result<()> {
        tracing::info!(topic = %topic, payload = %payload, "outbox message published");
        Ok(())
    }
}

/// Counts from one [`OutboxPump::drain_once`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub published: usize,
    pub failed: usize,
}

/// Moves staged rows to a [`Publisher`].
pub struct OutboxPump {
    pool: PgPool,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    batch_size: i64,
}

impl OutboxPump {
    pub fn new(
        pool: PgPool,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        batch_size: i64,
    ) -> Self {
        Self {
            pool,
            publisher,
            clock,
            batch_size: batch_size.max(1),
        }
    }

    /// Claim up to one batch of unpublished rows and publish them in id
    /// order. Rows claimed by a concurrent pump are skipped.
    pub async fn drain_once(&self) -> PlanResult<DrainReport> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let messages = db::claim_pending(&mut *tx, self.batch_size).await?;

        let mut report = DrainReport::default();
        for message in messages {
            match self.publisher.publish(message.topic, &message.payload).await {
                Ok(()) => {
                    db::mark_published(&mut *tx, message.id, self.clock.now()).await?;
                    report.published += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        outbox_id = message.id,
                        topic = %message.topic,
                        attempts = message.attempts + 1,
                        error = %e,
                        "failed to publish outbox message"
                    );
                    db::record_failure(&mut *tx, message.id, &format!("{e:#}")).await?;
                    report.failed += 1;
                }
            }
        }

        tx.commit().await.context("failed to commit transaction")?;
        if report.published + report.failed > 0 {
            tracing::info!(
                published = report.published,
                failed = report.failed,
                "outbox drained"
            );
        }
        Ok(report)
    }

    /// Drain until a batch comes back short.
    pub async fn drain_all(&self) -> PlanResult<DrainReport> {
        let mut total = DrainReport::default();
        loop {
            let report = self.drain_once().await?;
            total.published += report.published;
            total.failed += report.failed;
            // Failed rows stay pending, so stop after any failure to avoid
            // spinning on them.
            if report.failed > 0 || ((report.published as i64) < self.batch_size) {
                return Ok(total);
            }
        }
    }
}
