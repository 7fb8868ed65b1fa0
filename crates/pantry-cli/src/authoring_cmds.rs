//! CLI handlers for authoring commands.
//!
//! Implements:
//! - `pantry household {create,add-member,remove-member,members}`
//! - `pantry catalog {add-ingredient,add-unit,list}`
//! - `pantry recipe {create,show,graph}`
//! - `pantry meal {create,show}`

use anyhow::{Context, Result};
use sqlx::PgPool;

use pantry_core::catalog::{self, StorageTemperature};
use pantry_core::household;
use pantry_core::ids::UlidGenerator;
use pantry_core::meal::{self, NewComponent};
use pantry_core::recipe::service::load_recipe_graph;
use pantry_core::recipe::{create_recipe_from_toml, load_recipe, parse_recipe_toml};
use pantry_db::queries::ingredients;

use crate::{CatalogCommands, HouseholdCommands, MealCommands, RecipeCommands};

// -----------------------------------------------------------------------
// pantry household
// -----------------------------------------------------------------------

pub async fn run_household_command(command: HouseholdCommands, pool: &PgPool) -> Result<()> {
    match command {
        HouseholdCommands::Create { name } => {
            let created = household::create_household(pool, &name, &UlidGenerator::new()).await?;
            println!("Household created.");
            println!();
            println!("  Household ID: {}", created.id);
            println!("  Name:         {}", created.name);
        }
        HouseholdCommands::AddMember {
            household_id,
            user_id,
        } => {
            household::add_member(pool, &household_id, &user_id).await?;
            println!("Added {user_id} to household {household_id}.");
        }
        HouseholdCommands::RemoveMember {
            household_id,
            user_id,
        } => {
            household::remove_member(pool, &household_id, &user_id).await?;
            println!("Removed {user_id} from household {household_id}.");
        }
        HouseholdCommands::Members { household_id } => {
            let members = household::list_members(pool, &household_id).await?;
            if members.is_empty() {
                println!("Household {household_id} has no members.");
                return Ok(());
            }
            let user_w = members.iter().map(|m| m.user_id.len()).max().unwrap_or(4).max(4);
            println!("{:<user_w$}  JOINED", "USER");
            for m in &members {
                println!(
                    "{:<user_w$}  {}",
                    m.user_id,
                    m.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------
// pantry catalog
// -----------------------------------------------------------------------

pub async fn run_catalog_command(command: CatalogCommands, pool: &PgPool) -> Result<()> {
    let ids = UlidGenerator::new();
    match command {
        CatalogCommands::AddIngredient {
            name,
            min_temp,
            max_temp,
        } => {
            let storage = StorageTemperature {
                min_c: min_temp,
                max_c: max_temp,
            };
            let ingredient = catalog::add_ingredient(pool, &name, storage, &ids).await?;
            println!("Ingredient {} added ({}).", ingredient.name, ingredient.id);
        }
        CatalogCommands::AddUnit { name } => {
            let unit = catalog::add_measurement_unit(pool, &name, &ids).await?;
            println!("Measurement unit {} added ({}).", unit.name, unit.id);
        }
        CatalogCommands::List => cmd_catalog_list(pool).await?,
    }
    Ok(())
}

async fn cmd_catalog_list(pool: &PgPool) -> Result<()> {
    let all_ingredients = ingredients::list_ingredients(pool).await?;
    let units = ingredients::list_measurement_units(pool).await?;

    println!("Ingredients ({}):", all_ingredients.len());
    let name_w = all_ingredients
        .iter()
        .map(|i| i.name.len())
        .max()
        .unwrap_or(4)
        .max(4);
    for i in &all_ingredients {
        let storage = match (i.min_ideal_storage_temp_c, i.max_ideal_storage_temp_c) {
            (None, None) => String::new(),
            (min, max) => format!(
                "{}..{} C",
                min.map(|t| t.to_string()).unwrap_or_default(),
                max.map(|t| t.to_string()).unwrap_or_default()
            ),
        };
        println!("  {:<26}  {:<name_w$}  {}", i.id, i.name, storage);
    }

    println!();
    println!("Measurement units ({}):", units.len());
    for u in &units {
        println!("  {:<26}  {}", u.id, u.name);
    }
    Ok(())
}

// -----------------------------------------------------------------------
// pantry recipe
// -----------------------------------------------------------------------

pub async fn run_recipe_command(command: RecipeCommands, pool: &PgPool) -> Result<()> {
    match command {
        RecipeCommands::Create { file, household } => cmd_recipe_create(pool, &file, &household).await,
        RecipeCommands::Show { recipe_id } => cmd_recipe_show(pool, &recipe_id).await,
        RecipeCommands::Graph { recipe_id, mermaid } => {
            let graph = load_recipe_graph(pool, &recipe_id).await?;
            if mermaid {
                print!("{}", graph.to_mermaid());
                return Ok(());
            }
            let order: Vec<String> = graph
                .topological_order()
                .iter()
                .map(u32::to_string)
                .collect();
            println!("Step order: {}", order.join(" -> "));
            for step in graph.nodes() {
                let deps = graph.dependencies(*step);
                if deps.is_empty() {
                    continue;
                }
                let deps: Vec<String> = deps.iter().map(|d| format!("#{d}")).collect();
                println!("  #{step} needs {}", deps.join(", "));
            }
            Ok(())
        }
    }
}

/// Read a recipe TOML file, validate it, and insert it for `household_id`.
async fn cmd_recipe_create(pool: &PgPool, file_path: &str, household_id: &str) -> Result<()> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read recipe file: {file_path}"))?;
    let recipe_toml = parse_recipe_toml(&content)
        .with_context(|| format!("failed to parse recipe file: {file_path}"))?;

    let recipe =
        create_recipe_from_toml(pool, household_id, &recipe_toml, &UlidGenerator::new()).await?;

    println!("Recipe created successfully.");
    println!();
    println!("  Recipe ID:  {}", recipe.id);
    println!("  Name:       {}", recipe.name);
    println!("  Steps:      {}", recipe.steps.len());
    println!("  Prep tasks: {}", recipe.prep_tasks.len());
    Ok(())
}

async fn cmd_recipe_show(pool: &PgPool, recipe_id: &str) -> Result<()> {
    let mut conn = pool.acquire().await.context("failed to acquire connection")?;
    let recipe = load_recipe(&mut conn, recipe_id).await?;
    drop(conn);

    println!("Recipe: {} ({})", recipe.name, recipe.id);
    println!("Household: {}", recipe.household_id);
    if !recipe.description.is_empty() {
        println!("Description: {}", recipe.description);
    }
    println!();

    for step in &recipe.steps {
        println!("Step #{}: {}", step.number(), step.preparation);
        for u in &step.ingredients {
            let what = match (&u.ingredient, &u.product_ref) {
                (Some(i), _) => i.name.clone(),
                (None, Some(p)) => format!("product {p}"),
                (None, None) => "?".to_string(),
            };
            println!("    {} {} {}", u.quantity, u.measurement_unit_id, what);
        }
        for p in &step.products {
            println!("    -> {}", p.name);
        }
    }

    if !recipe.prep_tasks.is_empty() {
        println!();
        println!("Prep tasks:");
        for t in &recipe.prep_tasks {
            let lead = match t.max_lead_secs {
                Some(max) => format!("{}-{}s ahead", t.min_lead_secs, max),
                None => format!("{}s+ ahead", t.min_lead_secs),
            };
            println!("  {} ({lead}, {} steps)", t.name, t.steps.len());
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------
// pantry meal
// -----------------------------------------------------------------------

pub async fn run_meal_command(command: MealCommands, pool: &PgPool) -> Result<()> {
    match command {
        MealCommands::Create {
            household,
            name,
            description,
            recipes,
        } => {
            let components = recipes
                .iter()
                .map(|raw| parse_component(raw))
                .collect::<Result<Vec<_>>>()?;
            let created = meal::create_meal(
                pool,
                &household,
                &name,
                &description,
                &components,
                &UlidGenerator::new(),
            )
            .await?;
            println!("Meal created.");
            println!();
            println!("  Meal ID:    {}", created.meal.id);
            println!("  Name:       {}", created.meal.name);
            println!("  Components: {}", created.components.len());
        }
        MealCommands::Show { meal_id } => {
            let found = meal::get_meal(pool, &meal_id).await?;
            println!("Meal: {} ({})", found.meal.name, found.meal.id);
            if !found.meal.description.is_empty() {
                println!("Description: {}", found.meal.description);
            }
            for c in &found.components {
                println!("  {} x{}", c.recipe_id, c.recipe_scale);
            }
        }
    }
    Ok(())
}

/// Parse `RECIPE_ID` or `RECIPE_ID:SCALE`.
pub fn parse_component(raw: &str) -> Result<NewComponent> {
    match raw.split_once(':') {
        Some((recipe_id, scale)) => {
            let recipe_scale: f64 = scale
                .parse()
                .with_context(|| format!("invalid recipe scale in {raw:?}"))?;
            Ok(NewComponent {
                recipe_id: recipe_id.to_string(),
                recipe_scale,
            })
        }
        None => Ok(NewComponent {
            recipe_id: raw.to_string(),
            recipe_scale: 1.0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_defaults_to_unit_scale() {
        let c = parse_component("01J9ZQ").unwrap();
        assert_eq!(c.recipe_id, "01J9ZQ");
        assert_eq!(c.recipe_scale, 1.0);
    }

    #[test]
    fn component_with_scale() {
        let c = parse_component("01J9ZQ:1.5").unwrap();
        assert_eq!(c.recipe_id, "01J9ZQ");
        assert_eq!(c.recipe_scale, 1.5);
    }

    #[test]
    fn component_with_bad_scale() {
        let err = parse_component("01J9ZQ:lots").unwrap_err();
        assert!(err.to_string().contains("invalid recipe scale"));
    }
}
