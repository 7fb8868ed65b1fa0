//! CLI handlers for meal-plan lifecycle commands.
//!
//! Implements:
//! - `pantry plan create <file> --user <id>`   -- create a plan from a TOML file
//! - `pantry plan show [plan-id]`              -- show a plan or list plans
//! - `pantry plan finalize-event|finalize|create-tasks|init-grocery-list|archive`
//! - `pantry plan missing-votes <plan-id>`
//! - `pantry vote`, `pantry task`, `pantry grocery`

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use pantry_core::clock::SystemClock;
use pantry_core::ids::UlidGenerator;
use pantry_core::mealplan::{create_meal_plan_from_toml, load_plan, parse_meal_plan_toml};
use pantry_core::quantity::Quantity;
use pantry_core::state::{EventFinalization, MealPlanStateMachine};
use pantry_core::vote::Ballot;
use pantry_db::models::{GroceryListItemStatus, MealPlanTaskStatus};
use pantry_db::queries::grocery_list_items::{self as grocery_db, GroceryListItemUpdate};
use pantry_db::queries::{meal_plans as plan_db, tasks as task_db};

use crate::{GroceryCommands, PlanCommands, TaskCommands};

// -----------------------------------------------------------------------
// Public entry points
// -----------------------------------------------------------------------

pub async fn run_plan_command(
    command: PlanCommands,
    machine: &MealPlanStateMachine,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        PlanCommands::Create { file, user } => cmd_create(machine, &file, &user).await,
        PlanCommands::Show { plan_id, household } => match plan_id {
            Some(id) => cmd_show_one(machine, &id).await,
            None => cmd_show_all(machine, household.as_deref()).await,
        },
        PlanCommands::FinalizeEvent {
            plan_id,
            event_id,
            admin_override,
        } => {
            let result = machine
                .finalize_event(&plan_id, &event_id, admin_override, cancel)
                .await?;
            print_event_finalization(&result);
            println!("Plan status: {}", result.outcome.status);
            Ok(())
        }
        PlanCommands::Finalize {
            plan_id,
            admin_override,
        } => {
            let result = machine.finalize_plan(&plan_id, admin_override, cancel).await?;
            for f in &result.finalized {
                print_event_finalization(f);
            }
            for s in &result.skipped {
                println!("Event {} skipped: {}", s.event_id, s.reason);
            }
            println!("Plan status: {}", result.status);
            Ok(())
        }
        PlanCommands::CreateTasks { plan_id } => {
            let result = machine.create_tasks(&plan_id, cancel).await?;
            if result.outcome.no_op {
                println!("Tasks already created; nothing to do.");
            } else {
                println!("Created {} tasks.", result.created);
            }
            println!("Plan status: {}", result.outcome.status);
            Ok(())
        }
        PlanCommands::InitGroceryList { plan_id } => {
            let result = machine.init_grocery_list(&plan_id, cancel).await?;
            if result.outcome.no_op {
                println!("Grocery list already initialized; nothing to do.");
            } else {
                println!("Created {} grocery list items.", result.items);
            }
            for m in &result.unit_mismatches {
                println!(
                    "  warning: ingredient {} listed in both {} and {}",
                    m.ingredient_id, m.existing_unit_id, m.unit_id
                );
            }
            println!("Plan status: {}", result.outcome.status);
            Ok(())
        }
        PlanCommands::Archive { plan_id } => {
            let outcome = machine.archive_plan(&plan_id, cancel).await?;
            if outcome.no_op {
                println!("Plan {plan_id} was already archived.");
            } else {
                println!("Plan {plan_id} archived.");
            }
            Ok(())
        }
        PlanCommands::MissingVotes { plan_id } => {
            let missing = machine.missing_votes(&plan_id).await?;
            if missing.is_empty() {
                println!("Every member has voted on every open event.");
                return Ok(());
            }
            println!("{:<26}  VOTER", "EVENT");
            for m in &missing {
                println!("{:<26}  {}", m.event_id, m.voter_id);
            }
            Ok(())
        }
    }
}

pub async fn run_task_command(
    command: TaskCommands,
    machine: &MealPlanStateMachine,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        TaskCommands::List { plan_id } => {
            let tasks = task_db::list_tasks_for_plan(machine.pool(), &plan_id).await?;
            if tasks.is_empty() {
                println!("No tasks for plan {plan_id}.");
                return Ok(());
            }
            println!("{:<26}  {:<10}  EXPLANATION", "ID", "STATUS");
            for t in &tasks {
                println!("{:<26}  {:<10}  {}", t.id, t.status, t.explanation);
            }
            Ok(())
        }
        TaskCommands::Status {
            task_id,
            from,
            to,
            explanation,
        } => {
            let from: MealPlanTaskStatus = from.parse()?;
            let to: MealPlanTaskStatus = to.parse()?;
            let task = machine
                .change_task_status(&task_id, from, to, &explanation, cancel)
                .await?;
            println!("Task {} is now {}.", task.id, task.status);
            Ok(())
        }
    }
}

pub async fn run_grocery_command(
    command: GroceryCommands,
    machine: &MealPlanStateMachine,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        GroceryCommands::List { plan_id } => {
            let items = grocery_db::list_items_for_plan(machine.pool(), &plan_id).await?;
            if items.is_empty() {
                println!("No grocery list items for plan {plan_id}.");
                return Ok(());
            }
            println!(
                "{:<26}  {:<26}  {:>18}  {:<26}  STATUS",
                "ID", "INGREDIENT", "QUANTITY", "UNIT"
            );
            for item in &items {
                let min = Quantity::from_db(item.min_quantity)?;
                let quantity = match item.max_quantity {
                    Some(max) => format!("{min}-{}", Quantity::from_db(max)?),
                    None => min.to_string(),
                };
                println!(
                    "{:<26}  {:<26}  {:>18}  {:<26}  {}",
                    item.id, item.ingredient_id, quantity, item.measurement_unit_id, item.status
                );
            }
            Ok(())
        }
        GroceryCommands::Update {
            item_id,
            status,
            explanation,
            purchased,
            purchased_unit,
            upc,
            price,
        } => {
            let update = GroceryListItemUpdate {
                status: status
                    .as_deref()
                    .map(str::parse::<GroceryListItemStatus>)
                    .transpose()?,
                status_explanation: explanation,
                quantity_purchased: purchased
                    .as_deref()
                    .map(parse_quantity)
                    .transpose()?
                    .map(Quantity::to_db),
                purchased_measurement_unit_id: purchased_unit,
                purchased_upc: upc,
                purchase_price: price,
            };
            let item = machine.update_grocery_item(&item_id, &update, cancel).await?;
            println!("Item {} is now {}.", item.id, item.status);
            Ok(())
        }
    }
}

// -----------------------------------------------------------------------
// pantry vote
// -----------------------------------------------------------------------

/// Build a ballot from `--rank` / `--abstain` arguments.
pub fn ballot_from_args(voter: &str, ranked: &[String], abstain: bool) -> Result<Ballot> {
    if abstain {
        return Ok(Ballot::abstain(voter));
    }
    if ranked.is_empty() {
        anyhow::bail!("pass at least one --rank option id, or --abstain");
    }
    let options: Vec<&str> = ranked.iter().map(String::as_str).collect();
    Ok(Ballot::ranked(voter, &options))
}

pub async fn cmd_vote(
    machine: &MealPlanStateMachine,
    plan_id: &str,
    event_id: &str,
    ballot: &Ballot,
    cancel: &CancellationToken,
) -> Result<()> {
    machine.record_vote(plan_id, event_id, ballot, cancel).await?;
    if ballot.is_abstain() {
        println!("{} abstained on event {event_id}.", ballot.voter_id);
    } else {
        println!("Ballot recorded for {} on event {event_id}.", ballot.voter_id);
    }
    Ok(())
}

// -----------------------------------------------------------------------
// pantry plan create <file>
// -----------------------------------------------------------------------

async fn cmd_create(machine: &MealPlanStateMachine, file_path: &str, user: &str) -> Result<()> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read meal plan file: {file_path}"))?;
    let plan_toml = parse_meal_plan_toml(&content)
        .with_context(|| format!("failed to parse meal plan file: {file_path}"))?;

    let aggregate = create_meal_plan_from_toml(
        machine.pool(),
        &plan_toml,
        user,
        &UlidGenerator::new(),
        &SystemClock::new(),
    )
    .await?;

    let options: usize = aggregate.events.iter().map(|e| e.options.len()).sum();
    println!("Meal plan created successfully.");
    println!();
    println!("  Plan ID:         {}", aggregate.plan.id);
    println!("  Household:       {}", aggregate.plan.household_id);
    println!("  Status:          {}", aggregate.plan.status);
    println!(
        "  Voting deadline: {}",
        aggregate.plan.voting_deadline.format("%Y-%m-%d %H:%M UTC")
    );
    println!("  Events:          {}", aggregate.events.len());
    println!("  Options:         {options}");
    Ok(())
}

// -----------------------------------------------------------------------
// pantry plan show
// -----------------------------------------------------------------------

async fn cmd_show_all(machine: &MealPlanStateMachine, household: Option<&str>) -> Result<()> {
    let plans = plan_db::list_meal_plans(machine.pool(), household).await?;

    if plans.is_empty() {
        println!("No meal plans found. Use `pantry plan create <file>` to create one.");
        return Ok(());
    }

    let id_w = 26;
    let status_w = 24;
    println!(
        "{:<id_w$}  {:<id_w$}  {:<status_w$}  DEADLINE",
        "ID", "HOUSEHOLD", "STATUS"
    );
    for plan in &plans {
        let status = if plan.archived_at.is_some() {
            format!("{} (archived)", plan.status)
        } else {
            plan.status.to_string()
        };
        println!(
            "{:<id_w$}  {:<id_w$}  {:<status_w$}  {}",
            plan.id,
            plan.household_id,
            status,
            plan.voting_deadline.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

async fn cmd_show_one(machine: &MealPlanStateMachine, plan_id: &str) -> Result<()> {
    let mut conn = machine
        .pool()
        .acquire()
        .await
        .context("failed to acquire connection")?;
    let aggregate = load_plan(&mut conn, plan_id).await?;
    drop(conn);
    let plan = &aggregate.plan;

    println!("Meal plan: {}", plan.id);
    println!("Household: {}", plan.household_id);
    println!("Status: {}", plan.status);
    println!(
        "Voting deadline: {}",
        plan.voting_deadline.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for (label, at) in [
        ("Finalized", plan.finalized_at),
        ("Tasks created", plan.tasks_created_at),
        ("Grocery list", plan.grocery_list_initialized_at),
        ("Archived", plan.archived_at),
    ] {
        if let Some(at) = at {
            println!("{label}: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    if !plan.notes.is_empty() {
        println!("Notes: {}", plan.notes);
    }
    println!();

    for e in &aggregate.events {
        println!(
            "Event {} ({}, {} - {})",
            e.event.id,
            e.event.meal_name,
            e.event.starts_at.format("%Y-%m-%d %H:%M"),
            e.event.ends_at.format("%H:%M"),
        );
        for o in &e.options {
            let marker = match (o.chosen, o.tiebroken) {
                (true, true) => "* (tiebroken)",
                (true, false) => "*",
                _ => "",
            };
            println!("  {} meal {} x{} {marker}", o.id, o.meal_id, o.meal_scale);
        }
    }

    let tasks = task_db::count_tasks_for_plan(machine.pool(), plan_id).await?;
    let items = grocery_db::count_items_for_plan(machine.pool(), plan_id).await?;
    println!();
    println!("Tasks: {tasks}  Grocery items: {items}");
    Ok(())
}

fn print_event_finalization(f: &EventFinalization) {
    match &f.tally {
        None => println!("Event {} was already finalized (winner {}).", f.event_id, f.winner),
        Some(tally) => {
            let note = if f.tiebroken { " after a tie-break" } else { "" };
            println!("Event {}: option {} won{note}.", f.event_id, f.winner);
            for (option_id, score) in &tally.scores {
                println!(
                    "  {option_id}: {} points, {} first choices",
                    score.points, score.first_choices
                );
            }
        }
    }
}

fn parse_quantity(raw: &str) -> Result<Quantity> {
    let value: f64 = raw
        .parse()
        .with_context(|| format!("invalid quantity: {raw:?}"))?;
    Ok(Quantity::from_f64(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ballot_ranked_in_given_order() {
        let ballot = ballot_from_args("alice", &["b".into(), "a".into()], false).unwrap();
        assert_eq!(ballot, Ballot::ranked("alice", &["b", "a"]));
    }

    #[test]
    fn ballot_abstain() {
        let ballot = ballot_from_args("bob", &[], true).unwrap();
        assert!(ballot.is_abstain());
    }

    #[test]
    fn ballot_needs_a_choice() {
        assert!(ballot_from_args("bob", &[], false).is_err());
    }

    #[test]
    fn quantity_parsing_truncates_to_hundredths() {
        assert_eq!(parse_quantity("2.349").unwrap(), Quantity::from_hundredths(234));
        assert!(parse_quantity("-1").is_err());
        assert!(parse_quantity("a lot").is_err());
    }
}
