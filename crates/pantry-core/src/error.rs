//! Error type shared by the analyzers and the meal-plan state machine.

use thiserror::Error;

/// Everything a planner operation can fail with.
///
/// Analyzer failures carry enough context to be shown to a user as-is.
/// Persistence failures that are not retryable arrive as [`PlanError::Store`].
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("recipe {recipe_id} has a cycle between its steps")]
    RecipeNotAcyclic { recipe_id: String },

    #[error("step #{step} of recipe {recipe_id} references unknown product {product:?}")]
    UnresolvedProductRef {
        recipe_id: String,
        step: u32,
        product: String,
    },

    #[error("cannot merge quantities measured in {left} and {right}")]
    UnitMismatch { left: String, right: String },

    #[error("invalid scale factor {0}: must be finite and greater than zero")]
    InvalidScale(f64),

    #[error("invalid quantity {0}: must be finite and non-negative")]
    InvalidQuantity(f64),

    #[error("no votes have been cast for event {event_id}")]
    NoVotes { event_id: String },

    #[error("every voter abstained on event {event_id}")]
    AllAbstained { event_id: String },

    #[error("invalid ballot from {voter_id}: {reason}")]
    InvalidBallot { voter_id: String, reason: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("voting is still open for event {event_id}")]
    VotingOpen { event_id: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transient storage failure after {attempts} attempts: {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl PlanError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type PlanResult<T> = Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_entity() {
        let err = PlanError::not_found("meal plan", "01HX");
        assert_eq!(err.to_string(), "meal plan 01HX not found");

        let err = PlanError::UnresolvedProductRef {
            recipe_id: "r1".into(),
            step: 2,
            product: "dough".into(),
        };
        assert_eq!(
            err.to_string(),
            "step #2 of recipe r1 references unknown product \"dough\""
        );
    }

    #[test]
    fn anyhow_errors_become_store_errors() {
        let err: PlanError = anyhow::anyhow!("connection reset").into();
        assert!(matches!(err, PlanError::Store(_)));
        assert_eq!(err.to_string(), "connection reset");
    }
}
