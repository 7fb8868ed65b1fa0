//! Meal-plan state machine.
//!
//! Drives a plan through
//!
//! ```text
//! awaiting_votes -> finalized -> tasks_created -> grocery_list_initialized
//! ```
//!
//! with archival orthogonal to all of them. Every transition runs in one
//! transaction that first locks the plan row (`SELECT ... FOR UPDATE`), so
//! transitions on one plan are serialized while different plans proceed in
//! parallel. Each transition stages a `data_changes` outbox row before
//! commit. Transient storage failures are retried per [`RetryPolicy`];
//! cancellation drops the in-flight transaction.

pub mod policy;
pub mod retry;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use tokio_util::sync::CancellationToken;

use pantry_db::models::{GroceryListItem, MealPlan, MealPlanStatus, MealPlanTask, MealPlanTaskStatus};
use pantry_db::queries::grocery_list_items::{
    self as grocery_db, GroceryListItemUpdate, NewGroceryListItem,
};
use pantry_db::queries::tasks::{self as task_db, NewMealPlanTask};
use pantry_db::queries::votes::{self as vote_db, NewVote};
use pantry_db::queries::{households, meal_plans as plan_db};

use crate::clock::Clock;
use crate::config::PlannerConfig;
use crate::error::{PlanError, PlanResult};
use crate::grocery::{self, UnitMismatch};
use crate::ids::IdGenerator;
use crate::mealplan::{load_chosen_meals, load_plan};
use crate::outbox::{DataChangeMessage, DataChangeType, stage_data_change};
use crate::prep::derive_tasks;
use crate::quantity::Quantity;
use crate::vote::{Ballot, BallotChoice, Tally, ballots_from_votes, tally, validate_ballot};

use self::policy::TaskStatusPolicy;
use self::retry::{RetryPolicy, with_retry};

/// Where a plan ended up after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub status: MealPlanStatus,
    pub archived: bool,
    /// True when the plan was already past this transition and nothing
    /// was written.
    pub no_op: bool,
}

impl TransitionOutcome {
    fn changed(plan: &MealPlan, status: MealPlanStatus) -> Self {
        Self {
            status,
            archived: plan.archived_at.is_some(),
            no_op: false,
        }
    }

    fn unchanged(plan: &MealPlan) -> Self {
        Self {
            status: plan.status,
            archived: plan.archived_at.is_some(),
            no_op: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFinalization {
    pub event_id: String,
    pub winner: String,
    pub tiebroken: bool,
    /// `None` when the event had already been finalized.
    pub tally: Option<Tally>,
    pub outcome: TransitionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEvent {
    pub event_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFinalization {
    pub finalized: Vec<EventFinalization>,
    pub skipped: Vec<SkippedEvent>,
    pub status: MealPlanStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingVote {
    pub event_id: String,
    pub voter_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksCreated {
    pub outcome: TransitionOutcome,
    pub created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroceryListInitialized {
    pub outcome: TransitionOutcome,
    pub items: usize,
    pub unit_mismatches: Vec<UnitMismatch>,
}

/// The meal-plan state machine. Cheap to clone; share one per process.
#[derive(Clone)]
pub struct MealPlanStateMachine {
    pool: PgPool,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    task_policy: TaskStatusPolicy,
}

impl MealPlanStateMachine {
    pub fn new(
        pool: PgPool,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        config: &PlannerConfig,
    ) -> Self {
        Self {
            pool,
            ids,
            clock,
            retry: config.retry,
            task_policy: config.task_transitions.clone(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Replace `ballot.voter_id`'s ballot for an event. Only allowed while
    /// the plan awaits votes and the event has no chosen option.
    #[tracing::instrument(skip(self, ballot, cancel), fields(voter_id = %ballot.voter_id))]
    pub async fn record_vote(
        &self,
        plan_id: &str,
        event_id: &str,
        ballot: &Ballot,
        cancel: &CancellationToken,
    ) -> PlanResult<TransitionOutcome> {
        with_retry(&self.retry, cancel, "record_vote", move || {
            self.record_vote_once(plan_id, event_id, ballot)
        })
        .await
    }

    async fn record_vote_once(
        &self,
        plan_id: &str,
        event_id: &str,
        ballot: &Ballot,
    ) -> PlanResult<TransitionOutcome> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let plan = lock_open_plan(&mut tx, plan_id).await?;
        require_status(&plan, "vote on", MealPlanStatus::AwaitingVotes)?;

        let event = plan_db::get_event(&mut *tx, event_id)
            .await?
            .filter(|e| e.meal_plan_id == plan.id)
            .ok_or_else(|| PlanError::not_found("meal plan event", event_id))?;
        let options = plan_db::list_options_for_event(&mut *tx, &event.id).await?;
        if options.iter().any(|o| o.chosen) {
            return Err(PlanError::Conflict(format!(
                "event {event_id} has already been finalized"
            )));
        }

        let members = households::list_member_ids(&mut *tx, &plan.household_id).await?;
        if !members.contains(&ballot.voter_id) {
            return Err(PlanError::InvalidBallot {
                voter_id: ballot.voter_id.clone(),
                reason: format!("not a member of household {}", plan.household_id),
            });
        }

        let option_ids: Vec<String> = options.iter().map(|o| o.id.clone()).collect();
        validate_ballot(&option_ids, ballot)?;

        let rows: Vec<NewVote> = match &ballot.choice {
            BallotChoice::Ranked(ranking) => ranking
                .iter()
                .enumerate()
                .map(|(i, option_id)| NewVote {
                    id: self.ids.next_id(),
                    option_id: option_id.clone(),
                    rank: Some(i as i32 + 1),
                    abstain: false,
                })
                .collect(),
            BallotChoice::Abstain => option_ids
                .iter()
                .map(|option_id| NewVote {
                    id: self.ids.next_id(),
                    option_id: option_id.clone(),
                    rank: None,
                    abstain: true,
                })
                .collect(),
        };

        let now = self.clock.now();
        vote_db::replace_ballot(&mut tx, event_id, &ballot.voter_id, &rows, now).await?;
        stage_data_change(
            &mut *tx,
            &DataChangeMessage::new(DataChangeType::MealPlanVoteRecorded, &plan.household_id)
                .meal_plan(&plan.id)
                .event(event_id)
                .user(&ballot.voter_id)
                .with_context(json!({ "abstain": ballot.is_abstain(), "ranked": rows.iter().filter(|r| !r.abstain).count() })),
        )
        .await?;
        tx.commit().await.context("failed to commit transaction")?;

        tracing::info!(meal_plan_id = %plan.id, event_id, "vote recorded");
        Ok(TransitionOutcome::changed(&plan, plan.status))
    }

    /// Tally an event and mark its winner chosen. Allowed once the voting
    /// deadline has passed, once every household member has a ballot, or
    /// with `admin_override`. Finalizing the last open event moves the plan
    /// to `finalized`.
    ///
    /// An event that already has a chosen option is a no-op.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn finalize_event(
        &self,
        plan_id: &str,
        event_id: &str,
        admin_override: bool,
        cancel: &CancellationToken,
    ) -> PlanResult<EventFinalization> {
        with_retry(&self.retry, cancel, "finalize_event", move || {
            self.finalize_event_once(plan_id, event_id, admin_override)
        })
        .await
    }

    async fn finalize_event_once(
        &self,
        plan_id: &str,
        event_id: &str,
        admin_override: bool,
    ) -> PlanResult<EventFinalization> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let plan = lock_open_plan(&mut tx, plan_id).await?;
        let aggregate = load_plan(&mut tx, plan_id).await?;
        let entry = aggregate
            .event(event_id)
            .ok_or_else(|| PlanError::not_found("meal plan event", event_id))?;

        if let Some(chosen) = entry.chosen() {
            return Ok(EventFinalization {
                event_id: event_id.to_owned(),
                winner: chosen.id.clone(),
                tiebroken: chosen.tiebroken,
                tally: None,
                outcome: TransitionOutcome::unchanged(&plan),
            });
        }
        require_status(&plan, "finalize an event of", MealPlanStatus::AwaitingVotes)?;

        let now = self.clock.now();
        if !admin_override && now < plan.voting_deadline {
            let members = households::list_member_ids(&mut *tx, &plan.household_id).await?;
            let voters: HashSet<String> = vote_db::list_voter_ids_for_event(&mut *tx, event_id)
                .await?
                .into_iter()
                .collect();
            if !members.iter().all(|m| voters.contains(m)) {
                return Err(PlanError::VotingOpen {
                    event_id: event_id.to_owned(),
                });
            }
        }

        let votes = vote_db::list_votes_for_event(&mut *tx, event_id).await?;
        let result = tally(event_id, &entry.option_ids(), &ballots_from_votes(&votes))?;

        let rows =
            plan_db::finalize_option(&mut *tx, event_id, &result.winner, result.tiebroken, now)
                .await?;
        if rows == 0 {
            return Err(PlanError::Conflict(format!(
                "event {event_id} has no options to finalize"
            )));
        }
        stage_data_change(
            &mut *tx,
            &DataChangeMessage::new(DataChangeType::MealPlanEventFinalized, &plan.household_id)
                .meal_plan(&plan.id)
                .event(event_id)
                .option(&result.winner)
                .with_context(json!({ "tiebroken": result.tiebroken, "scores": result.scores })),
        )
        .await?;

        let mut status = plan.status;
        if plan_db::count_unchosen_events(&mut *tx, plan_id).await? == 0 {
            self.advance(
                &mut tx,
                &plan,
                MealPlanStatus::AwaitingVotes,
                MealPlanStatus::Finalized,
                DataChangeType::MealPlanFinalized,
                json!({}),
            )
            .await?;
            status = MealPlanStatus::Finalized;
        }

        tx.commit().await.context("failed to commit transaction")?;

        tracing::info!(
            meal_plan_id = %plan.id,
            event_id,
            winner = %result.winner,
            tiebroken = result.tiebroken,
            status = %status,
            "event finalized"
        );
        Ok(EventFinalization {
            event_id: event_id.to_owned(),
            winner: result.winner.clone(),
            tiebroken: result.tiebroken,
            tally: Some(result),
            outcome: TransitionOutcome::changed(&plan, status),
        })
    }

    /// Try to finalize every open event of the plan. Events whose
    /// preconditions fail, or that have no usable votes, are skipped.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn finalize_plan(
        &self,
        plan_id: &str,
        admin_override: bool,
        cancel: &CancellationToken,
    ) -> PlanResult<PlanFinalization> {
        let aggregate = {
            let mut conn = self.pool.acquire().await.context("failed to acquire connection")?;
            load_plan(&mut conn, plan_id).await?
        };
        if aggregate.plan.archived_at.is_some() {
            return Err(archived(plan_id));
        }

        let open: Vec<String> = aggregate
            .unchosen_events()
            .map(|e| e.event.id.clone())
            .collect();

        let mut finalized = Vec::new();
        let mut skipped = Vec::new();
        let mut status = aggregate.plan.status;
        for event_id in open {
            match self.finalize_event(plan_id, &event_id, admin_override, cancel).await {
                Ok(result) => {
                    status = result.outcome.status;
                    if !result.outcome.no_op {
                        finalized.push(result);
                    }
                }
                Err(
                    e @ (PlanError::VotingOpen { .. }
                    | PlanError::NoVotes { .. }
                    | PlanError::AllAbstained { .. }),
                ) => {
                    tracing::info!(meal_plan_id = plan_id, event_id = %event_id, reason = %e, "event not finalized");
                    skipped.push(SkippedEvent {
                        event_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(PlanFinalization {
            finalized,
            skipped,
            status,
        })
    }

    /// Household members without a ballot on each open event, ordered by
    /// event start then voter id.
    pub async fn missing_votes(&self, plan_id: &str) -> PlanResult<Vec<MissingVote>> {
        let mut conn = self.pool.acquire().await.context("failed to acquire connection")?;
        let aggregate = load_plan(&mut conn, plan_id).await?;
        let members = households::list_member_ids(&mut *conn, &aggregate.plan.household_id).await?;

        let mut missing = Vec::new();
        for entry in aggregate.unchosen_events() {
            let voters: HashSet<String> = vote_db::list_voter_ids_for_event(&mut *conn, &entry.event.id)
                .await?
                .into_iter()
                .collect();
            for member in &members {
                if !voters.contains(member) {
                    missing.push(MissingVote {
                        event_id: entry.event.id.clone(),
                        voter_id: member.clone(),
                    });
                }
            }
        }
        Ok(missing)
    }

    /// Derive and persist tasks for every recipe of every chosen option,
    /// then move the plan to `tasks_created`.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn create_tasks(
        &self,
        plan_id: &str,
        cancel: &CancellationToken,
    ) -> PlanResult<TasksCreated> {
        with_retry(&self.retry, cancel, "create_tasks", move || {
            self.create_tasks_once(plan_id)
        })
        .await
    }

    async fn create_tasks_once(&self, plan_id: &str) -> PlanResult<TasksCreated> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let plan = lock_open_plan(&mut tx, plan_id).await?;
        match plan.status {
            MealPlanStatus::TasksCreated | MealPlanStatus::GroceryListInitialized => {
                return Ok(TasksCreated {
                    outcome: TransitionOutcome::unchanged(&plan),
                    created: 0,
                });
            }
            MealPlanStatus::AwaitingVotes => {
                return Err(wrong_status(&plan, "create tasks for", MealPlanStatus::Finalized));
            }
            MealPlanStatus::Finalized => {}
        }

        let now = self.clock.now();
        let mut created = 0;
        if task_db::count_tasks_for_plan(&mut *tx, plan_id).await? > 0 {
            tracing::warn!(meal_plan_id = plan_id, "tasks already exist, advancing status only");
        } else {
            let aggregate = load_plan(&mut tx, plan_id).await?;
            let meals = load_chosen_meals(&mut tx, &aggregate).await?;
            for meal in &meals {
                for component in &meal.recipes {
                    for task in derive_tasks(&meal.option_id, &component.recipe, self.ids.as_ref()) {
                        task_db::insert_task(
                            &mut *tx,
                            &NewMealPlanTask {
                                id: &task.id,
                                meal_plan_id: plan_id,
                                option_id: &task.meal_plan_option_id,
                                recipe_id: &task.recipe_id,
                                recipe_prep_task_id: task.recipe_prep_task_id.as_deref(),
                                explanation: &task.explanation,
                                assigned_user: task.assigned_user.as_deref(),
                                created_at: now,
                            },
                        )
                        .await?;
                        created += 1;
                    }
                }
            }
        }

        self.advance(
            &mut tx,
            &plan,
            MealPlanStatus::Finalized,
            MealPlanStatus::TasksCreated,
            DataChangeType::MealPlanTasksCreated,
            json!({ "tasks": created }),
        )
        .await?;
        tx.commit().await.context("failed to commit transaction")?;

        tracing::info!(meal_plan_id = plan_id, created, "meal plan tasks created");
        Ok(TasksCreated {
            outcome: TransitionOutcome::changed(&plan, MealPlanStatus::TasksCreated),
            created,
        })
    }

    /// Aggregate the grocery list across chosen options and persist it,
    /// then move the plan to `grocery_list_initialized`.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn init_grocery_list(
        &self,
        plan_id: &str,
        cancel: &CancellationToken,
    ) -> PlanResult<GroceryListInitialized> {
        with_retry(&self.retry, cancel, "init_grocery_list", move || {
            self.init_grocery_list_once(plan_id)
        })
        .await
    }

    async fn init_grocery_list_once(&self, plan_id: &str) -> PlanResult<GroceryListInitialized> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let plan = lock_open_plan(&mut tx, plan_id).await?;
        match plan.status {
            MealPlanStatus::GroceryListInitialized => {
                return Ok(GroceryListInitialized {
                    outcome: TransitionOutcome::unchanged(&plan),
                    items: 0,
                    unit_mismatches: Vec::new(),
                });
            }
            MealPlanStatus::TasksCreated => {}
            _ => {
                return Err(wrong_status(
                    &plan,
                    "initialize the grocery list of",
                    MealPlanStatus::TasksCreated,
                ));
            }
        }

        let now = self.clock.now();
        let mut items = 0;
        let mut unit_mismatches = Vec::new();
        if grocery_db::count_items_for_plan(&mut *tx, plan_id).await? > 0 {
            tracing::warn!(meal_plan_id = plan_id, "grocery list already exists, advancing status only");
        } else {
            let aggregate = load_plan(&mut tx, plan_id).await?;
            let meals = load_chosen_meals(&mut tx, &aggregate).await?;
            let aggregation = grocery::aggregate(&meals)?;
            for line in &aggregation.items {
                let id = self.ids.next_id();
                grocery_db::insert_item(
                    &mut *tx,
                    &NewGroceryListItem {
                        id: &id,
                        meal_plan_id: plan_id,
                        ingredient_id: &line.ingredient_id,
                        measurement_unit_id: &line.measurement_unit_id,
                        min_quantity: line.quantity.min.to_db(),
                        max_quantity: line.quantity.max.map(Quantity::to_db),
                        status: line.status,
                        status_explanation: &line.status_explanation,
                        created_at: now,
                    },
                )
                .await?;
            }
            items = aggregation.items.len();
            unit_mismatches = aggregation.unit_mismatches;
        }

        self.advance(
            &mut tx,
            &plan,
            MealPlanStatus::TasksCreated,
            MealPlanStatus::GroceryListInitialized,
            DataChangeType::MealPlanGroceryListInitialized,
            json!({ "items": items, "unit_mismatches": unit_mismatches.len() }),
        )
        .await?;
        tx.commit().await.context("failed to commit transaction")?;

        tracing::info!(meal_plan_id = plan_id, items, "grocery list initialized");
        Ok(GroceryListInitialized {
            outcome: TransitionOutcome::changed(&plan, MealPlanStatus::GroceryListInitialized),
            items,
            unit_mismatches,
        })
    }

    /// Archive a plan from any state. Archiving twice is a no-op.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn archive_plan(
        &self,
        plan_id: &str,
        cancel: &CancellationToken,
    ) -> PlanResult<TransitionOutcome> {
        with_retry(&self.retry, cancel, "archive_plan", move || {
            self.archive_plan_once(plan_id)
        })
        .await
    }

    async fn archive_plan_once(&self, plan_id: &str) -> PlanResult<TransitionOutcome> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let plan = plan_db::lock_meal_plan(&mut *tx, plan_id)
            .await?
            .ok_or_else(|| PlanError::not_found("meal plan", plan_id))?;
        if plan.archived_at.is_some() {
            return Ok(TransitionOutcome::unchanged(&plan));
        }

        plan_db::archive_meal_plan(&mut *tx, plan_id, self.clock.now()).await?;
        stage_data_change(
            &mut *tx,
            &DataChangeMessage::new(DataChangeType::MealPlanArchived, &plan.household_id)
                .meal_plan(plan_id),
        )
        .await?;
        tx.commit().await.context("failed to commit transaction")?;

        tracing::info!(meal_plan_id = plan_id, "meal plan archived");
        Ok(TransitionOutcome {
            status: plan.status,
            archived: true,
            no_op: false,
        })
    }

    /// Move a task from `from` to `to` if the policy allows it and the task
    /// is still in `from`.
    #[tracing::instrument(skip(self, explanation, cancel))]
    pub async fn change_task_status(
        &self,
        task_id: &str,
        from: MealPlanTaskStatus,
        to: MealPlanTaskStatus,
        explanation: &str,
        cancel: &CancellationToken,
    ) -> PlanResult<MealPlanTask> {
        if !self.task_policy.allows(from, to) {
            return Err(PlanError::Conflict(format!(
                "task status change {from} -> {to} is not allowed"
            )));
        }
        with_retry(&self.retry, cancel, "change_task_status", move || {
            self.change_task_status_once(task_id, from, to, explanation)
        })
        .await
    }

    async fn change_task_status_once(
        &self,
        task_id: &str,
        from: MealPlanTaskStatus,
        to: MealPlanTaskStatus,
        explanation: &str,
    ) -> PlanResult<MealPlanTask> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let task = task_db::get_task(&mut *tx, task_id)
            .await?
            .ok_or_else(|| PlanError::not_found("meal plan task", task_id))?;
        let plan = lock_open_plan(&mut tx, &task.meal_plan_id).await?;

        let rows =
            task_db::transition_task_status(&mut *tx, task_id, from, to, explanation, self.clock.now())
                .await?;
        if rows == 0 {
            return Err(PlanError::Conflict(format!(
                "optimistic lock failed: task {task_id} has status {}, expected {from}",
                task.status
            )));
        }

        stage_data_change(
            &mut *tx,
            &DataChangeMessage::new(DataChangeType::MealPlanTaskStatusChanged, &plan.household_id)
                .meal_plan(&plan.id)
                .option(&task.option_id)
                .task(task_id)
                .with_context(json!({ "from": from, "to": to })),
        )
        .await?;
        let updated = task_db::get_task(&mut *tx, task_id)
            .await?
            .ok_or_else(|| PlanError::not_found("meal plan task", task_id))?;
        tx.commit().await.context("failed to commit transaction")?;

        tracing::info!(task_id, from = %from, to = %to, "task status changed");
        Ok(updated)
    }

    /// Record shopping progress on a grocery list item.
    #[tracing::instrument(skip(self, update, cancel))]
    pub async fn update_grocery_item(
        &self,
        item_id: &str,
        update: &GroceryListItemUpdate,
        cancel: &CancellationToken,
    ) -> PlanResult<GroceryListItem> {
        with_retry(&self.retry, cancel, "update_grocery_item", move || {
            self.update_grocery_item_once(item_id, update)
        })
        .await
    }

    async fn update_grocery_item_once(
        &self,
        item_id: &str,
        update: &GroceryListItemUpdate,
    ) -> PlanResult<GroceryListItem> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let item = grocery_db::get_item(&mut *tx, item_id)
            .await?
            .ok_or_else(|| PlanError::not_found("grocery list item", item_id))?;
        let plan = lock_open_plan(&mut tx, &item.meal_plan_id).await?;

        let updated = grocery_db::update_item(&mut *tx, item_id, update, self.clock.now())
            .await?
            .ok_or_else(|| PlanError::not_found("grocery list item", item_id))?;
        stage_data_change(
            &mut *tx,
            &DataChangeMessage::new(
                DataChangeType::MealPlanGroceryListItemUpdated,
                &plan.household_id,
            )
            .meal_plan(&plan.id)
            .with_context(json!({ "item_id": item_id, "status": updated.status })),
        )
        .await?;
        tx.commit().await.context("failed to commit transaction")?;

        tracing::info!(item_id, status = %updated.status, "grocery list item updated");
        Ok(updated)
    }

    /// Optimistic status change plus its outbox row, inside the caller's
    /// transaction.
    async fn advance(
        &self,
        conn: &mut PgConnection,
        plan: &MealPlan,
        from: MealPlanStatus,
        to: MealPlanStatus,
        change: DataChangeType,
        context: serde_json::Value,
    ) -> PlanResult<()> {
        let rows = plan_db::transition_plan_status(&mut *conn, &plan.id, from, to, self.clock.now())
            .await?;
        if rows == 0 {
            return Err(PlanError::Conflict(format!(
                "meal plan {} is no longer {from}",
                plan.id
            )));
        }
        stage_data_change(
            &mut *conn,
            &DataChangeMessage::new(change, &plan.household_id)
                .meal_plan(&plan.id)
                .with_context(context),
        )
        .await?;
        Ok(())
    }
}

/// Lock the plan row for the rest of the transaction. Archived plans
/// reject every transition.
async fn lock_open_plan(conn: &mut PgConnection, plan_id: &str) -> PlanResult<MealPlan> {
    let plan = plan_db::lock_meal_plan(&mut *conn, plan_id)
        .await?
        .ok_or_else(|| PlanError::not_found("meal plan", plan_id))?;
    if plan.archived_at.is_some() {
        return Err(archived(plan_id));
    }
    Ok(plan)
}

fn archived(plan_id: &str) -> PlanError {
    PlanError::Conflict(format!("meal plan {plan_id} is archived"))
}

fn require_status(plan: &MealPlan, action: &str, expected: MealPlanStatus) -> PlanResult<()> {
    if plan.status == expected {
        Ok(())
    } else {
        Err(wrong_status(plan, action, expected))
    }
}

fn wrong_status(plan: &MealPlan, action: &str, expected: MealPlanStatus) -> PlanError {
    PlanError::Conflict(format!(
        "cannot {action} meal plan {}: status is {}, expected {expected}",
        plan.id, plan.status
    ))
}
