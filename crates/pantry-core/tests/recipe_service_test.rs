//! Integration tests for recipe authoring: TOML -> database -> aggregate.

use pantry_core::catalog::{self, StorageTemperature};
use pantry_core::error::PlanError;
use pantry_core::household;
use pantry_core::ids::SequentialIds;
use pantry_core::recipe::graph::Edge;
use pantry_core::recipe::service::load_recipe_graph;
use pantry_core::recipe::{create_recipe_from_toml, load_recipe, parse_recipe_toml};
use pantry_db::queries::outbox;
use pantry_test_utils::{create_test_db, drop_test_db};

const CURRY: &str = r#"
[recipe]
name = "Curry"
description = "weeknight curry"

[[steps]]
preparation = "marinate chicken"
products = ["marinated chicken"]

[[steps.ingredients]]
ingredient = "chicken"
unit = "gram"
min = 500

[[steps.vessels]]
name = "bowl"

[[steps]]
preparation = "fry onions"
products = ["fried onions"]

[[steps.ingredients]]
ingredient = "onion"
unit = "piece"
min = 2
max = 3

[[steps]]
preparation = "simmer"

[[steps.ingredients]]
product = "marinated chicken"
unit = "gram"
min = 500

[[steps.ingredients]]
product = "fried onions"
unit = "piece"
min = 2

[[steps.instruments]]
name = "spoon"

[[steps.completion_conditions]]
ingredient_state = "chicken cooked through"

[[prep_tasks]]
name = "marinate"
min_lead_secs = 3600
max_storage_temp_c = 4.0

[[prep_tasks.steps]]
step = 1
satisfies_step = true
"#;

async fn seed_catalog(pool: &sqlx::PgPool, ids: &SequentialIds) -> String {
    let home = household::create_household(pool, "home", ids).await.unwrap();
    catalog::add_ingredient(pool, "chicken", StorageTemperature::default(), ids)
        .await
        .unwrap();
    catalog::add_ingredient(pool, "onion", StorageTemperature::default(), ids)
        .await
        .unwrap();
    catalog::add_measurement_unit(pool, "gram", ids).await.unwrap();
    catalog::add_measurement_unit(pool, "piece", ids).await.unwrap();
    home.id
}

#[tokio::test]
async fn create_and_load_recipe() {
    let (pool, db_name) = create_test_db().await;
    let ids = SequentialIds::new("id");
    let household_id = seed_catalog(&pool, &ids).await;

    let recipe_toml = parse_recipe_toml(CURRY).unwrap();
    let created = create_recipe_from_toml(&pool, &household_id, &recipe_toml, &ids)
        .await
        .unwrap();
    assert_eq!(created.steps.len(), 3);
    assert_eq!(created.prep_tasks.len(), 1);

    let mut conn = pool.acquire().await.unwrap();
    let loaded = load_recipe(&mut conn, &created.id).await.unwrap();
    drop(conn);
    assert_eq!(loaded.name, "Curry");
    assert_eq!(loaded.description, "weeknight curry");
    let step_ids = |r: &pantry_core::recipe::Recipe| -> Vec<String> {
        r.steps.iter().map(|s| s.id.clone()).collect()
    };
    assert_eq!(step_ids(&loaded), step_ids(&created));
    assert_eq!(loaded.prep_tasks, created.prep_tasks);
    assert_eq!(loaded.steps[1].ingredients[0].quantity, created.steps[1].ingredients[0].quantity);

    let simmer = &loaded.steps[2];
    assert_eq!(simmer.ingredients.len(), 2);
    assert!(simmer.ingredients.iter().all(|u| u.product_ref.is_some()));
    assert_eq!(simmer.instruments[0].name, "spoon");
    assert_eq!(simmer.completion_conditions.len(), 1);

    let graph = load_recipe_graph(&pool, &created.id).await.unwrap();
    assert_eq!(
        graph.edges(),
        &[
            Edge {
                producer: 1,
                consumer: 3
            },
            Edge {
                producer: 2,
                consumer: 3
            },
        ]
    );
    assert_eq!(graph.topological_order(), &[1, 2, 3]);

    let staged = outbox::list_recent(&pool, 10).await.unwrap();
    assert!(staged
        .iter()
        .any(|m| m.payload["event_type"] == "recipe_created"
            && m.payload["context"]["recipe_id"] == created.id.as_str()));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn unknown_catalog_names_are_reported_together() {
    let (pool, db_name) = create_test_db().await;
    let ids = SequentialIds::new("id");
    let household_id = seed_catalog(&pool, &ids).await;

    let recipe_toml = parse_recipe_toml(
        r#"
[recipe]
name = "Mystery"

[[steps]]
preparation = "combine"

[[steps.ingredients]]
ingredient = "saffron"
unit = "pinch"
min = 1

[[steps.ingredients]]
ingredient = "saffron"
unit = "gram"
min = 1
"#,
    )
    .unwrap();

    let err = create_recipe_from_toml(&pool, &household_id, &recipe_toml, &ids)
        .await
        .unwrap_err();
    let PlanError::Validation(msg) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(msg.contains("saffron"), "{msg}");
    assert!(msg.contains("pinch"), "{msg}");
    assert_eq!(msg.matches("saffron").count(), 1, "names are deduplicated: {msg}");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn unknown_household_is_not_found() {
    let (pool, db_name) = create_test_db().await;
    let ids = SequentialIds::new("id");
    seed_catalog(&pool, &ids).await;

    let recipe_toml = parse_recipe_toml(CURRY).unwrap();
    let err = create_recipe_from_toml(&pool, "nobody", &recipe_toml, &ids)
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::NotFound { kind: "household", .. }), "got {err:?}");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn missing_recipe_is_not_found() {
    let (pool, db_name) = create_test_db().await;

    let mut conn = pool.acquire().await.unwrap();
    let err = load_recipe(&mut conn, "nope").await.unwrap_err();
    assert!(matches!(err, PlanError::NotFound { kind: "recipe", .. }), "got {err:?}");
    drop(conn);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn duplicate_catalog_entries_conflict() {
    let (pool, db_name) = create_test_db().await;
    let ids = SequentialIds::new("id");
    seed_catalog(&pool, &ids).await;

    let err = catalog::add_ingredient(&pool, "onion", StorageTemperature::default(), &ids)
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::Conflict(_)), "got {err:?}");

    pool.close().await;
    drop_test_db(&db_name).await;
}
