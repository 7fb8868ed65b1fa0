//! Integration tests for the embedded migrations and pool helpers.
//!
//! Each test gets its own database on the shared PostgreSQL server from
//! `pantry-test-utils` and drops it when done.

use sqlx::Row;
use uuid::Uuid;

use pantry_db::config::DbConfig;
use pantry_db::pool;
use pantry_test_utils::{create_test_db, drop_test_db, pg_url};

/// Tables created by the initial migration.
const EXPECTED_TABLES: &[&str] = &[
    "household_members",
    "households",
    "meal_components",
    "meal_plan_events",
    "meal_plan_grocery_list_items",
    "meal_plan_option_votes",
    "meal_plan_options",
    "meal_plan_tasks",
    "meal_plans",
    "meals",
    "outbox_messages",
    "recipe_prep_task_steps",
    "recipe_prep_tasks",
    "recipe_step_completion_conditions",
    "recipe_step_ingredients",
    "recipe_step_instruments",
    "recipe_step_products",
    "recipe_step_vessels",
    "recipe_steps",
    "recipes",
    "valid_ingredients",
    "valid_measurement_units",
];

#[tokio::test]
async fn migrations_create_all_tables() {
    let (pool, db_name) = create_test_db().await;

    let counts = pool::table_counts(&pool)
        .await
        .expect("table_counts should succeed");
    let names: Vec<&str> = counts.iter().map(|(name, _)| name.as_str()).collect();

    assert_eq!(names, EXPECTED_TABLES);
    for (name, count) in &counts {
        assert_eq!(*count, 0, "table {name} should be empty");
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (pool, db_name) = create_test_db().await;

    // create_test_db already migrated once.
    pool::run_migrations(&pool)
        .await
        .expect("second migration run should be a no-op");

    let row = sqlx::query("SELECT COUNT(*) AS cnt FROM _sqlx_migrations")
        .fetch_one(&pool)
        .await
        .expect("should read migration table");
    let applied: i64 = row.get("cnt");
    assert_eq!(applied as usize, pool::MIGRATOR.iter().count());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn event_window_must_be_positive() {
    let (pool, db_name) = create_test_db().await;

    sqlx::query("INSERT INTO households (id, name) VALUES ('h1', 'home')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO meal_plans (id, household_id, voting_deadline, created_by_user) \
         VALUES ('p1', 'h1', now(), 'u1')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = sqlx::query(
        "INSERT INTO meal_plan_events (id, meal_plan_id, meal_name, starts_at, ends_at) \
         VALUES ('e1', 'p1', 'dinner', now(), now() - interval '1 hour')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "starts_at >= ends_at must be rejected");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ensure_database_exists_is_idempotent() {
    let db_name = format!("pantry_test_{}", Uuid::new_v4().simple());
    let config = DbConfig::new(format!("{}/{db_name}", pg_url().await));

    pool::ensure_database_exists(&config)
        .await
        .expect("first ensure should create the database");
    pool::ensure_database_exists(&config)
        .await
        .expect("second ensure should be a no-op");

    drop_test_db(&db_name).await;
}
