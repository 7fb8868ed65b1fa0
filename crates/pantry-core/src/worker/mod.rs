//! Background worker.
//!
//! Jobs are a closed set decoded from JSON at the boundary. The run loop
//! executes every job once per tick until cancelled; a failure on one plan
//! is logged and counted, and the job moves on to the next plan.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use pantry_db::models::MealPlanStatus;
use pantry_db::queries::meal_plans as plan_db;

use crate::clock::Clock;
use crate::error::{PlanError, PlanResult};
use crate::outbox::OutboxPump;
use crate::state::MealPlanStateMachine;

/// A unit of background work.
///
/// ```json
/// { "job": "finalize_expired_meal_plans" }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum WorkerJob {
    /// Finalize what can be finalized on plans whose voting deadline passed.
    FinalizeExpiredMealPlans,
    /// Create tasks for every finalized plan.
    CreateMealPlanTasks,
    /// Build grocery lists for every plan with tasks.
    InitializeGroceryLists,
    /// Publish staged outbox rows.
    DrainOutbox,
}

impl WorkerJob {
    /// Every job, in the order a tick runs them.
    pub const ALL: [WorkerJob; 4] = [
        WorkerJob::FinalizeExpiredMealPlans,
        WorkerJob::CreateMealPlanTasks,
        WorkerJob::InitializeGroceryLists,
        WorkerJob::DrainOutbox,
    ];

    pub fn from_json(raw: &str) -> PlanResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| PlanError::Validation(format!("invalid worker job: {e}")))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerJob::FinalizeExpiredMealPlans => "finalize_expired_meal_plans",
            WorkerJob::CreateMealPlanTasks => "create_meal_plan_tasks",
            WorkerJob::InitializeGroceryLists => "initialize_grocery_lists",
            WorkerJob::DrainOutbox => "drain_outbox",
        }
    }
}

impl fmt::Display for WorkerJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one job run did. For plan jobs the counts are plans; for
/// `drain_outbox` they are messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: WorkerJob,
    pub processed: usize,
    pub failed: usize,
}

impl JobReport {
    fn new(job: WorkerJob) -> Self {
        Self {
            job,
            processed: 0,
            failed: 0,
        }
    }
}

pub struct Worker {
    machine: MealPlanStateMachine,
    pump: OutboxPump,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Worker {
    pub fn new(
        machine: MealPlanStateMachine,
        pump: OutboxPump,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            machine,
            pump,
            clock,
            interval,
        }
    }

    #[tracing::instrument(skip(self, cancel), fields(job = %job))]
    pub async fn run_job(&self, job: WorkerJob, cancel: &CancellationToken) -> PlanResult<JobReport> {
        let report = match job {
            WorkerJob::FinalizeExpiredMealPlans => {
                let ids =
                    plan_db::list_expired_awaiting_votes(self.machine.pool(), self.clock.now())
                        .await?;
                for_each_plan(job, ids, move |id| async move {
                    self.machine.finalize_plan(&id, false, cancel).await.map(|_| ())
                })
                .await?
            }
            WorkerJob::CreateMealPlanTasks => {
                let ids =
                    plan_db::list_ids_in_status(self.machine.pool(), MealPlanStatus::Finalized)
                        .await?;
                for_each_plan(job, ids, move |id| async move {
                    self.machine.create_tasks(&id, cancel).await.map(|_| ())
                })
                .await?
            }
            WorkerJob::InitializeGroceryLists => {
                let ids =
                    plan_db::list_ids_in_status(self.machine.pool(), MealPlanStatus::TasksCreated)
                        .await?;
                for_each_plan(job, ids, move |id| async move {
                    self.machine.init_grocery_list(&id, cancel).await.map(|_| ())
                })
                .await?
            }
            WorkerJob::DrainOutbox => {
                let drained = tokio::select! {
                    drained = self.pump.drain_all() => drained?,
                    _ = cancel.cancelled() => return Err(PlanError::Cancelled),
                };
                JobReport {
                    job,
                    processed: drained.published,
                    failed: drained.failed,
                }
            }
        };

        if report.processed + report.failed > 0 {
            tracing::info!(processed = report.processed, failed = report.failed, "job finished");
        }
        Ok(report)
    }

    /// Run every job once. Job-level errors are logged; cancellation stops
    /// the tick.
    pub async fn tick(&self, cancel: &CancellationToken) -> PlanResult<Vec<JobReport>> {
        let mut reports = Vec::with_capacity(WorkerJob::ALL.len());
        for job in WorkerJob::ALL {
            match self.run_job(job, cancel).await {
                Ok(report) => reports.push(report),
                Err(PlanError::Cancelled) => return Err(PlanError::Cancelled),
                Err(e) => {
                    tracing::error!(job = %job, error = %e, "worker job failed");
                    reports.push(JobReport {
                        failed: 1,
                        ..JobReport::new(job)
                    });
                }
            }
        }
        Ok(reports)
    }

    /// Tick every `interval` until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "worker started");
        loop {
            if let Err(PlanError::Cancelled) = self.tick(&cancel).await {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
        tracing::info!("worker stopped");
    }
}

async fn for_each_plan<F, Fut>(job: WorkerJob, plan_ids: Vec<String>, mut run: F) -> PlanResult<JobReport>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = PlanResult<()>>,
{
    let mut report = JobReport::new(job);
    for plan_id in plan_ids {
        match run(plan_id.clone()).await {
            Ok(()) => report.processed += 1,
            Err(PlanError::Cancelled) => return Err(PlanError::Cancelled),
            Err(e) => {
                tracing::warn!(job = %job, meal_plan_id = %plan_id, error = %e, "job failed for plan");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}
