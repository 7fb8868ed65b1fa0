//! Meal-plan lifecycle engine: recipe analysis, ranked voting, prep-task
//! derivation, grocery aggregation, and the state machine that drives a
//! household's plan from voting to shopping.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod grocery;
pub mod household;
pub mod ids;
pub mod meal;
pub mod mealplan;
pub mod outbox;
pub mod prep;
pub mod quantity;
pub mod recipe;
pub mod state;
pub mod vote;
pub mod worker;

pub use error::{PlanError, PlanResult};
