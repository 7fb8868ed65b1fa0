//! Meal plans: the loaded aggregate and TOML authoring.

pub mod parser;
pub mod service;
pub mod toml_format;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pantry_db::models::{MealPlan, MealPlanEvent, MealPlanOption};

use crate::recipe::Recipe;

pub use parser::parse_meal_plan_toml;
pub use service::{create_meal_plan_from_toml, load_chosen_meals, load_plan};
pub use toml_format::MealPlanToml;

/// A plan with its events (ordered by `starts_at`) and their options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAggregate {
    pub plan: MealPlan,
    pub events: Vec<EventWithOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventWithOptions {
    pub event: MealPlanEvent,
    pub options: Vec<MealPlanOption>,
}

impl EventWithOptions {
    pub fn chosen(&self) -> Option<&MealPlanOption> {
        self.options.iter().find(|o| o.chosen)
    }

    pub fn option_ids(&self) -> Vec<String> {
        self.options.iter().map(|o| o.id.clone()).collect()
    }
}

impl PlanAggregate {
    pub fn event(&self, event_id: &str) -> Option<&EventWithOptions> {
        self.events.iter().find(|e| e.event.id == event_id)
    }

    /// Events still waiting for a chosen option.
    pub fn unchosen_events(&self) -> impl Iterator<Item = &EventWithOptions> {
        self.events.iter().filter(|e| e.chosen().is_none())
    }
}

/// The chosen option of one event with its recipes loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChosenMeal {
    pub event_id: String,
    pub starts_at: DateTime<Utc>,
    pub option_id: String,
    pub meal_id: String,
    pub meal_scale: f64,
    /// Meal components in position order.
    pub recipes: Vec<MealRecipe>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealRecipe {
    pub recipe_scale: f64,
    pub recipe: Recipe,
}
