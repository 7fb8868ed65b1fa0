//! TOML format types for meal-plan definition files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pantry_db::models::MealName;

/// Top-level structure of a meal-plan file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MealPlanToml {
    pub plan: PlanMeta,
    #[serde(default)]
    pub events: Vec<EventToml>,
}

/// `[plan]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanMeta {
    /// Household id.
    pub household: String,
    #[serde(default)]
    pub notes: String,
    /// RFC 3339 timestamp after which events may be finalized.
    pub voting_deadline: DateTime<Utc>,
}

/// A single `[[events]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventToml {
    pub meal_name: MealName,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub options: Vec<OptionToml>,
}

/// `[[events.options]]`: a meal offered for the event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionToml {
    /// Meal id.
    pub meal: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub notes: String,
}

fn default_scale() -> f64 {
    1.0
}
