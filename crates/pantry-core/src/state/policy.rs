//! Allowed status changes for meal-plan tasks.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use pantry_db::models::MealPlanTaskStatus;

/// Allowed-transition matrix for [`MealPlanTaskStatus`].
///
/// Serialized as a table from a status to the statuses it may move to:
///
/// ```toml
/// [planner.task_transitions]
/// unfinished = ["postponed", "ignored", "canceled", "finished"]
/// postponed = ["unfinished", "ignored", "canceled", "finished"]
/// ignored = ["unfinished"]
/// ```
///
/// `finished` and `canceled` are terminal whatever the table says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskStatusPolicy {
    allowed: HashMap<MealPlanTaskStatus, HashSet<MealPlanTaskStatus>>,
}

impl Default for TaskStatusPolicy {
    fn default() -> Self {
        use MealPlanTaskStatus::*;
        Self::from_edges([
            (Unfinished, Postponed),
            (Unfinished, Ignored),
            (Unfinished, Canceled),
            (Unfinished, Finished),
            (Postponed, Unfinished),
            (Postponed, Ignored),
            (Postponed, Canceled),
            (Postponed, Finished),
            (Ignored, Unfinished),
        ])
    }
}

impl TaskStatusPolicy {
    pub fn from_edges(
        edges: impl IntoIterator<Item = (MealPlanTaskStatus, MealPlanTaskStatus)>,
    ) -> Self {
        let mut allowed: HashMap<_, HashSet<_>> = HashMap::new();
        for (from, to) in edges {
            allowed.entry(from).or_default().insert(to);
        }
        Self { allowed }
    }

    pub fn allows(&self, from: MealPlanTaskStatus, to: MealPlanTaskStatus) -> bool {
        if from.is_terminal() || from == to {
            return false;
        }
        self.allowed.get(&from).is_some_and(|targets| targets.contains(&to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MealPlanTaskStatus::*;

    #[test]
    fn default_matrix() {
        let policy = TaskStatusPolicy::default();
        assert!(policy.allows(Unfinished, Finished));
        assert!(policy.allows(Postponed, Unfinished));
        assert!(policy.allows(Ignored, Unfinished));
        assert!(!policy.allows(Ignored, Finished));
        assert!(!policy.allows(Unfinished, Unfinished));
    }

    #[test]
    fn terminal_states_never_move() {
        let policy = TaskStatusPolicy::from_edges([(Finished, Unfinished), (Canceled, Unfinished)]);
        assert!(!policy.allows(Finished, Unfinished));
        assert!(!policy.allows(Canceled, Unfinished));
    }

    #[test]
    fn loads_from_toml_table() {
        let policy: TaskStatusPolicy =
            toml::from_str("unfinished = [\"finished\"]\nfinished = [\"unfinished\"]\n").unwrap();
        assert!(policy.allows(Unfinished, Finished));
        assert!(!policy.allows(Unfinished, Postponed));
        assert!(!policy.allows(Finished, Unfinished));
    }
}
