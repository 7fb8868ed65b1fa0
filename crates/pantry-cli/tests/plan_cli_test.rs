//! Integration tests for the file-driven `pantry` workflows.
//!
//! These exercise what `recipe create`, `plan create`, `vote`, and the plan
//! transition commands do: read authoring files from disk, insert them, and
//! drive the plan to its grocery list against a real PostgreSQL instance.

use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use pantry_core::catalog::{self, StorageTemperature};
use pantry_core::clock::{Clock, ManualClock};
use pantry_core::config::PlannerConfig;
use pantry_core::error::PlanError;
use pantry_core::household;
use pantry_core::ids::{IdGenerator, SequentialIds};
use pantry_core::meal::{self, NewComponent};
use pantry_core::mealplan::{create_meal_plan_from_toml, parse_meal_plan_toml};
use pantry_core::recipe::{create_recipe_from_toml, parse_recipe_toml};
use pantry_core::state::MealPlanStateMachine;
use pantry_core::vote::Ballot;
use pantry_db::models::{GroceryListItemStatus, MealPlanStatus};
use pantry_db::queries::{grocery_list_items, meal_plans, tasks};
use pantry_test_utils::{create_test_db, drop_test_db};

const PORRIDGE: &str = r#"
[recipe]
name = "Porridge"

[[steps]]
preparation = "simmer oats"

[[steps.ingredients]]
ingredient = "oats"
unit = "gram"
min = 100
"#;

fn write_file(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

fn plan_file(household_id: &str, small: &str, large: &str) -> String {
    format!(
        r#"
[plan]
household = "{household_id}"
voting_deadline = "2026-10-19T18:00:00Z"
notes = "week 43"

[[events]]
meal_name = "breakfast"
starts_at = "2026-10-20T07:00:00Z"
ends_at = "2026-10-20T08:00:00Z"

[[events.options]]
meal = "{small}"

[[events.options]]
meal = "{large}"
"#
    )
}

#[tokio::test]
async fn authoring_files_drive_a_plan_to_its_grocery_list() {
    let (pool, db_name) = create_test_db().await;
    let dir = tempfile::TempDir::new().unwrap();
    let ids = Arc::new(SequentialIds::new("id"));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
    ));

    let home = household::create_household(&pool, "home", ids.as_ref()).await.unwrap();
    household::add_member(&pool, &home.id, "alice").await.unwrap();
    household::add_member(&pool, &home.id, "bob").await.unwrap();
    catalog::add_ingredient(&pool, "oats", StorageTemperature::default(), ids.as_ref())
        .await
        .unwrap();
    catalog::add_measurement_unit(&pool, "gram", ids.as_ref()).await.unwrap();

    // recipe create <file> --household <id>
    let recipe_path = write_file(dir.path(), "porridge.toml", PORRIDGE);
    let content = std::fs::read_to_string(&recipe_path).unwrap();
    let recipe = create_recipe_from_toml(
        &pool,
        &home.id,
        &parse_recipe_toml(&content).unwrap(),
        ids.as_ref(),
    )
    .await
    .unwrap();

    // meal create --recipe <id> / --recipe <id>:2
    let mut meal_ids = Vec::new();
    for (name, scale) in [("small porridge", 1.0), ("large porridge", 2.0)] {
        let created = meal::create_meal(
            &pool,
            &home.id,
            name,
            "",
            &[NewComponent {
                recipe_id: recipe.id.clone(),
                recipe_scale: scale,
            }],
            ids.as_ref(),
        )
        .await
        .unwrap();
        meal_ids.push(created.meal.id);
    }

    // plan create <file> --user alice
    let plan_path = write_file(
        dir.path(),
        "week43.toml",
        &plan_file(&home.id, &meal_ids[0], &meal_ids[1]),
    );
    let content = std::fs::read_to_string(&plan_path).unwrap();
    let plan = create_meal_plan_from_toml(
        &pool,
        &parse_meal_plan_toml(&content).unwrap(),
        "alice",
        ids.as_ref(),
        clock.as_ref(),
    )
    .await
    .unwrap();
    assert_eq!(plan.plan.status, MealPlanStatus::AwaitingVotes);
    assert_eq!(plan.plan.notes, "week 43");

    let event = &plan.events[0];
    let option_for = |meal_id: &str| {
        event
            .options
            .iter()
            .find(|o| o.meal_id == meal_id)
            .map(|o| o.id.clone())
            .unwrap()
    };
    let small = option_for(&meal_ids[0]);
    let large = option_for(&meal_ids[1]);

    let config = PlannerConfig::default();
    let ids: Arc<dyn IdGenerator> = ids;
    let clock: Arc<dyn Clock> = clock;
    let machine = MealPlanStateMachine::new(pool.clone(), ids, clock, &config);
    let cancel = CancellationToken::new();

    // vote <plan> <event> --voter ... --rank ...
    machine
        .record_vote(
            &plan.plan.id,
            &event.event.id,
            &Ballot::ranked("alice", &[large.as_str(), small.as_str()]),
            &cancel,
        )
        .await
        .unwrap();
    let missing = machine.missing_votes(&plan.plan.id).await.unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].voter_id, "bob");

    machine
        .record_vote(
            &plan.plan.id,
            &event.event.id,
            &Ballot::ranked("bob", &[large.as_str()]),
            &cancel,
        )
        .await
        .unwrap();

    // Everyone voted, so finalization is allowed before the deadline.
    let finalized = machine
        .finalize_event(&plan.plan.id, &event.event.id, false, &cancel)
        .await
        .unwrap();
    assert_eq!(finalized.winner, large);
    assert!(!finalized.tiebroken);
    assert_eq!(finalized.outcome.status, MealPlanStatus::Finalized);

    // Nothing frozen and no prep tasks: no tasks, but the plan advances.
    let created = machine.create_tasks(&plan.plan.id, &cancel).await.unwrap();
    assert_eq!(created.created, 0);
    assert_eq!(created.outcome.status, MealPlanStatus::TasksCreated);
    assert!(tasks::list_tasks_for_plan(&pool, &plan.plan.id)
        .await
        .unwrap()
        .is_empty());

    let groceries = machine.init_grocery_list(&plan.plan.id, &cancel).await.unwrap();
    assert_eq!(groceries.items, 1);
    let items = grocery_list_items::list_items_for_plan(&pool, &plan.plan.id)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].min_quantity, 20_000);
    assert_eq!(items[0].max_quantity, None);
    assert_eq!(items[0].status, GroceryListItemStatus::Needs);

    let listed = meal_plans::list_meal_plans(&pool, Some(home.id.as_str())).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, MealPlanStatus::GroceryListInitialized);

    let archived = machine.archive_plan(&plan.plan.id, &cancel).await.unwrap();
    assert!(archived.archived);
    assert!(meal_plans::list_meal_plans(&pool, Some("elsewhere"))
        .await
        .unwrap()
        .is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn plan_file_naming_a_missing_meal_is_rejected() {
    let (pool, db_name) = create_test_db().await;
    let ids = SequentialIds::new("id");
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap());
    let home = household::create_household(&pool, "home", &ids).await.unwrap();

    let plan_toml = parse_meal_plan_toml(&plan_file(&home.id, "ghost-a", "ghost-b")).unwrap();
    let err = create_meal_plan_from_toml(&pool, &plan_toml, "alice", &ids, &clock)
        .await
        .unwrap_err();
    let PlanError::Validation(msg) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(msg.contains("ghost-a") && msg.contains("ghost-b"), "{msg}");
    assert!(meal_plans::list_meal_plans(&pool, None).await.unwrap().is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[test]
fn plan_file_with_overlapping_events_fails_to_parse() {
    let err = parse_meal_plan_toml(
        r#"
[plan]
household = "h"
voting_deadline = "2026-10-19T18:00:00Z"

[[events]]
meal_name = "lunch"
starts_at = "2026-10-20T12:00:00Z"
ends_at = "2026-10-20T13:00:00Z"

[[events.options]]
meal = "m1"

[[events]]
meal_name = "dinner"
starts_at = "2026-10-20T12:30:00Z"
ends_at = "2026-10-20T14:00:00Z"

[[events.options]]
meal = "m2"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("overlap"), "{err}");
}
