//! Database query functions for `meal_plan_grocery_list_items`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::models::{GroceryListItem, GroceryListItemStatus};

/// Fields of a line item produced by grocery aggregation.
#[derive(Debug, Clone)]
pub struct NewGroceryListItem<'a> {
    pub id: &'a str,
    pub meal_plan_id: &'a str,
    pub ingredient_id: &'a str,
    pub measurement_unit_id: &'a str,
    pub min_quantity: i64,
    pub max_quantity: Option<i64>,
    pub status: GroceryListItemStatus,
    pub status_explanation: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Shopping progress recorded against a line item.
#[derive(Debug, Clone, Default)]
pub struct GroceryListItemUpdate {
    pub status: Option<GroceryListItemStatus>,
    pub status_explanation: Option<String>,
    pub quantity_purchased: Option<i64>,
    pub purchased_measurement_unit_id: Option<String>,
    pub purchased_upc: Option<String>,
    pub purchase_price: Option<i64>,
}

pub async fn insert_item<'e>(
    executor: impl PgExecutor<'e>,
    new: &NewGroceryListItem<'_>,
) -> Result<GroceryListItem> {
    let item = sqlx::query_as::<_, GroceryListItem>(
        "INSERT INTO meal_plan_grocery_list_items \
         (id, meal_plan_id, ingredient_id, measurement_unit_id, min_quantity, max_quantity, \
          status, status_explanation, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING *",
    )
    .bind(new.id)
    .bind(new.meal_plan_id)
    .bind(new.ingredient_id)
    .bind(new.measurement_unit_id)
    .bind(new.min_quantity)
    .bind(new.max_quantity)
    .bind(new.status)
    .bind(new.status_explanation)
    .bind(new.created_at)
    .fetch_one(executor)
    .await
    .context("failed to insert grocery list item")?;

    Ok(item)
}

pub async fn get_item<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
) -> Result<Option<GroceryListItem>> {
    let item = sqlx::query_as::<_, GroceryListItem>(
        "SELECT * FROM meal_plan_grocery_list_items WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .context("failed to fetch grocery list item")?;

    Ok(item)
}

/// Line items of a plan ordered by (ingredient, unit).
pub async fn list_items_for_plan<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: &str,
) -> Result<Vec<GroceryListItem>> {
    let items = sqlx::query_as::<_, GroceryListItem>(
        "SELECT * FROM meal_plan_grocery_list_items \
         WHERE meal_plan_id = $1 \
         ORDER BY ingredient_id ASC, measurement_unit_id ASC",
    )
    .bind(meal_plan_id)
    .fetch_all(executor)
    .await
    .context("failed to list grocery list items")?;

    Ok(items)
}

pub async fn count_items_for_plan<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: &str,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM meal_plan_grocery_list_items WHERE meal_plan_id = $1",
    )
    .bind(meal_plan_id)
    .fetch_one(executor)
    .await
    .context("failed to count grocery list items")?;

    Ok(row.0)
}

/// Apply the non-`None` fields of `update`. Returns the updated row, or
/// `None` if the item does not exist.
pub async fn update_item<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    update: &GroceryListItemUpdate,
    at: DateTime<Utc>,
) -> Result<Option<GroceryListItem>> {
    let item = sqlx::query_as::<_, GroceryListItem>(
        "UPDATE meal_plan_grocery_list_items \
         SET status = COALESCE($2, status), \
             status_explanation = COALESCE($3, status_explanation), \
             quantity_purchased = COALESCE($4, quantity_purchased), \
             purchased_measurement_unit_id = COALESCE($5, purchased_measurement_unit_id), \
             purchased_upc = COALESCE($6, purchased_upc), \
             purchase_price = COALESCE($7, purchase_price), \
             last_updated_at = $8 \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(id)
    .bind(update.status)
    .bind(update.status_explanation.as_deref())
    .bind(update.quantity_purchased)
    .bind(update.purchased_measurement_unit_id.as_deref())
    .bind(update.purchased_upc.as_deref())
    .bind(update.purchase_price)
    .bind(at)
    .fetch_optional(executor)
    .await
    .context("failed to update grocery list item")?;

    Ok(item)
}
