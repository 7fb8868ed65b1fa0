//! Planner settings shared by the state machine and the worker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::policy::TaskStatusPolicy;
use crate::state::retry::RetryPolicy;

/// The `[planner]` section of the config file. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub retry: RetryPolicy,
    pub task_transitions: TaskStatusPolicy,
    /// Seconds between worker ticks.
    pub worker_interval_secs: u64,
    /// Outbox rows claimed per drain.
    pub outbox_batch_size: i64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            task_transitions: TaskStatusPolicy::default(),
            worker_interval_secs: 30,
            outbox_batch_size: 100,
        }
    }
}

impl PlannerConfig {
    pub fn worker_interval(&self) -> Duration {
        Duration::from_secs(self.worker_interval_secs.max(1))
    }
}
