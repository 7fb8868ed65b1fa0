//! Query functions, one module per aggregate.
//!
//! Single-statement functions are generic over [`sqlx::PgExecutor`] so they
//! run equally against a pool or inside a transaction (`&mut *tx`).
//! Functions that issue several statements take `&mut PgConnection`.

pub mod grocery_list_items;
pub mod households;
pub mod ingredients;
pub mod meal_plans;
pub mod meals;
pub mod outbox;
pub mod recipes;
pub mod tasks;
pub mod votes;
