use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a meal plan. Archival is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealPlanStatus {
    AwaitingVotes,
    Finalized,
    TasksCreated,
    GroceryListInitialized,
}

impl fmt::Display for MealPlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingVotes => "awaiting_votes",
            Self::Finalized => "finalized",
            Self::TasksCreated => "tasks_created",
            Self::GroceryListInitialized => "grocery_list_initialized",
        };
        f.write_str(s)
    }
}

impl FromStr for MealPlanStatus {
    type Err = MealPlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_votes" => Ok(Self::AwaitingVotes),
            "finalized" => Ok(Self::Finalized),
            "tasks_created" => Ok(Self::TasksCreated),
            "grocery_list_initialized" => Ok(Self::GroceryListInitialized),
            other => Err(MealPlanStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MealPlanStatus`] string.
#[derive(Debug, Clone)]
pub struct MealPlanStatusParseError(pub String);

impl fmt::Display for MealPlanStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid meal plan status: {:?}", self.0)
    }
}

impl std::error::Error for MealPlanStatusParseError {}

// ---------------------------------------------------------------------------

/// Status of a scheduled preparation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealPlanTaskStatus {
    Unfinished,
    Postponed,
    Ignored,
    Canceled,
    Finished,
}

impl MealPlanTaskStatus {
    /// Finished and canceled tasks never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Canceled)
    }
}

impl fmt::Display for MealPlanTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unfinished => "unfinished",
            Self::Postponed => "postponed",
            Self::Ignored => "ignored",
            Self::Canceled => "canceled",
            Self::Finished => "finished",
        };
        f.write_str(s)
    }
}

impl FromStr for MealPlanTaskStatus {
    type Err = MealPlanTaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unfinished" => Ok(Self::Unfinished),
            "postponed" => Ok(Self::Postponed),
            "ignored" => Ok(Self::Ignored),
            "canceled" => Ok(Self::Canceled),
            "finished" => Ok(Self::Finished),
            other => Err(MealPlanTaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MealPlanTaskStatus`] string.
#[derive(Debug, Clone)]
pub struct MealPlanTaskStatusParseError(pub String);

impl fmt::Display for MealPlanTaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for MealPlanTaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Shopping status of a grocery list line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GroceryListItemStatus {
    Needs,
    AlreadyHave,
    Acquired,
    Unavailable,
    Substituted,
}

impl fmt::Display for GroceryListItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Needs => "needs",
            Self::AlreadyHave => "already_have",
            Self::Acquired => "acquired",
            Self::Unavailable => "unavailable",
            Self::Substituted => "substituted",
        };
        f.write_str(s)
    }
}

impl FromStr for GroceryListItemStatus {
    type Err = GroceryListItemStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs" => Ok(Self::Needs),
            "already_have" => Ok(Self::AlreadyHave),
            "acquired" => Ok(Self::Acquired),
            "unavailable" => Ok(Self::Unavailable),
            "substituted" => Ok(Self::Substituted),
            other => Err(GroceryListItemStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`GroceryListItemStatus`] string.
#[derive(Debug, Clone)]
pub struct GroceryListItemStatusParseError(pub String);

impl fmt::Display for GroceryListItemStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid grocery list item status: {:?}", self.0)
    }
}

impl std::error::Error for GroceryListItemStatusParseError {}

// ---------------------------------------------------------------------------

/// Which meal of the day an event is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealName {
    Breakfast,
    SecondBreakfast,
    Brunch,
    Lunch,
    Supper,
    Dinner,
}

impl fmt::Display for MealName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Breakfast => "breakfast",
            Self::SecondBreakfast => "second_breakfast",
            Self::Brunch => "brunch",
            Self::Lunch => "lunch",
            Self::Supper => "supper",
            Self::Dinner => "dinner",
        };
        f.write_str(s)
    }
}

impl FromStr for MealName {
    type Err = MealNameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breakfast" => Ok(Self::Breakfast),
            "second_breakfast" => Ok(Self::SecondBreakfast),
            "brunch" => Ok(Self::Brunch),
            "lunch" => Ok(Self::Lunch),
            "supper" => Ok(Self::Supper),
            "dinner" => Ok(Self::Dinner),
            other => Err(MealNameParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MealName`] string.
#[derive(Debug, Clone)]
pub struct MealNameParseError(pub String);

impl fmt::Display for MealNameParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid meal name: {:?}", self.0)
    }
}

impl std::error::Error for MealNameParseError {}

// ---------------------------------------------------------------------------

/// Destination of an outbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxTopic {
    DataChanges,
    OutboundEmails,
    SearchIndexRequests,
    UserDataAggregator,
    WebhookExecutionRequests,
}

impl fmt::Display for OutboxTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DataChanges => "data_changes",
            Self::OutboundEmails => "outbound_emails",
            Self::SearchIndexRequests => "search_index_requests",
            Self::UserDataAggregator => "user_data_aggregator",
            Self::WebhookExecutionRequests => "webhook_execution_requests",
        };
        f.write_str(s)
    }
}

impl FromStr for OutboxTopic {
    type Err = OutboxTopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data_changes" => Ok(Self::DataChanges),
            "outbound_emails" => Ok(Self::OutboundEmails),
            "search_index_requests" => Ok(Self::SearchIndexRequests),
            "user_data_aggregator" => Ok(Self::UserDataAggregator),
            "webhook_execution_requests" => Ok(Self::WebhookExecutionRequests),
            other => Err(OutboxTopicParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`OutboxTopic`] string.
#[derive(Debug, Clone)]
pub struct OutboxTopicParseError(pub String);

impl fmt::Display for OutboxTopicParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid outbox topic: {:?}", self.0)
    }
}

impl std::error::Error for OutboxTopicParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Household {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HouseholdMember {
    pub household_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// A catalog ingredient. Storage temperatures are in degrees Celsius.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ValidIngredient {
    pub id: String,
    pub name: String,
    pub min_ideal_storage_temp_c: Option<f32>,
    pub max_ideal_storage_temp_c: Option<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ValidMeasurementUnit {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Recipe header row. Steps and prep tasks live in their own tables.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: String,
    pub household_id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeStep {
    pub id: String,
    pub recipe_id: String,
    pub step_index: i32,
    pub preparation: String,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeStepProduct {
    pub id: String,
    pub step_id: String,
    pub name: String,
    pub ordinal: i32,
}

/// An ingredient use joined with the catalog fields the analyzers need.
///
/// Quantities are hundredths of the measurement unit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeStepIngredient {
    pub id: String,
    pub step_id: String,
    pub ingredient_id: Option<String>,
    pub ingredient_name: Option<String>,
    pub min_ideal_storage_temp_c: Option<f32>,
    pub product_id: Option<String>,
    pub measurement_unit_id: String,
    pub min_quantity: i64,
    pub max_quantity: Option<i64>,
    pub ordinal: i32,
}

/// Instrument or vessel use; both tables share this shape.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeStepTool {
    pub id: String,
    pub step_id: String,
    pub name: String,
    pub product_id: Option<String>,
    pub ordinal: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeStepCompletionCondition {
    pub id: String,
    pub step_id: String,
    pub ingredient_state: String,
    pub optional: bool,
    pub notes: String,
    pub ordinal: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipePrepTask {
    pub id: String,
    pub recipe_id: String,
    pub name: String,
    pub description: String,
    pub min_lead_secs: i32,
    pub max_lead_secs: Option<i32>,
    pub min_storage_temp_c: Option<f32>,
    pub max_storage_temp_c: Option<f32>,
    pub ordinal: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipePrepTaskStep {
    pub id: String,
    pub prep_task_id: String,
    pub step_id: String,
    pub satisfies_step: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Meal {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealComponent {
    pub meal_id: String,
    pub recipe_id: String,
    pub recipe_scale: f64,
    pub ordinal: i32,
}

/// A meal plan -- the aggregate the state machine drives.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlan {
    pub id: String,
    pub household_id: String,
    pub notes: String,
    pub status: MealPlanStatus,
    pub voting_deadline: DateTime<Utc>,
    pub created_by_user: String,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub tasks_created_at: Option<DateTime<Utc>>,
    pub grocery_list_initialized_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanEvent {
    pub id: String,
    pub meal_plan_id: String,
    pub meal_name: MealName,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanOption {
    pub id: String,
    pub event_id: String,
    pub meal_id: String,
    pub meal_scale: f64,
    pub notes: String,
    pub chosen: bool,
    pub tiebroken: bool,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// One row of a ballot. `rank` is `None` exactly when `abstain` is set.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanOptionVote {
    pub id: String,
    pub event_id: String,
    pub option_id: String,
    pub voter_id: String,
    pub rank: Option<i32>,
    pub abstain: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanTask {
    pub id: String,
    pub meal_plan_id: String,
    pub option_id: String,
    pub recipe_id: String,
    pub recipe_prep_task_id: Option<String>,
    pub explanation: String,
    pub assigned_user: Option<String>,
    pub status: MealPlanTaskStatus,
    pub status_explanation: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Grocery list line item. Quantities and price are hundredths.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroceryListItem {
    pub id: String,
    pub meal_plan_id: String,
    pub ingredient_id: String,
    pub measurement_unit_id: String,
    pub min_quantity: i64,
    pub max_quantity: Option<i64>,
    pub status: GroceryListItemStatus,
    pub status_explanation: String,
    pub quantity_purchased: Option<i64>,
    pub purchased_measurement_unit_id: Option<String>,
    pub purchased_upc: Option<String>,
    pub purchase_price: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxMessage {
    pub id: i64,
    pub topic: OutboxTopic,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
