//! `pantry worker` commands: the background job loop and one-shot jobs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use pantry_core::clock::{Clock, SystemClock};
use pantry_core::outbox::{OutboxPump, TracingPublisher};
use pantry_core::worker::{Worker, WorkerJob};

use crate::WorkerCommands;
use crate::config::PantryConfig;

pub async fn run_worker_command(
    command: WorkerCommands,
    pool: &PgPool,
    resolved: &PantryConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let interval = match &command {
        WorkerCommands::Run {
            interval: Some(secs),
        } => Duration::from_secs((*secs).max(1)),
        _ => resolved.planner.worker_interval(),
    };
    let worker = build_worker(pool, resolved, interval);

    match command {
        WorkerCommands::Run { .. } => {
            println!(
                "Worker running every {}s. Press Ctrl-C to stop.",
                interval.as_secs()
            );
            worker.run(cancel).await;
            println!("Worker stopped.");
        }
        WorkerCommands::Job { json } => {
            let job = WorkerJob::from_json(&json)?;
            let report = worker.run_job(job, &cancel).await?;
            println!(
                "{}: processed {}, failed {}",
                report.job, report.processed, report.failed
            );
        }
    }
    Ok(())
}

/// The production worker publishes outbox rows as tracing events.
fn build_worker(pool: &PgPool, resolved: &PantryConfig, interval: Duration) -> Worker {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let machine = crate::state_machine(pool, resolved);
    let pump = OutboxPump::new(
        pool.clone(),
        Arc::new(TracingPublisher),
        clock.clone(),
        resolved.planner.outbox_batch_size,
    );
    Worker::new(machine, pump, clock, interval)
}
