mod authoring_cmds;
mod config;
mod plan_cmds;
mod worker_cmd;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use pantry_core::clock::SystemClock;
use pantry_core::ids::UlidGenerator;
use pantry_core::state::MealPlanStateMachine;
use pantry_db::pool;
use sqlx::PgPool;

use config::PantryConfig;

#[derive(Parser)]
#[command(name = "pantry", about = "Household meal planning: recipes, voting, prep tasks, groceries")]
struct Cli {
    /// Database URL (overrides PANTRY_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a pantry config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/pantry")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the pantry database (requires config file or env vars)
    DbInit,
    /// Households and their members
    Household {
        #[command(subcommand)]
        command: HouseholdCommands,
    },
    /// Ingredient and measurement-unit catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Recipe authoring and inspection
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Meals built from recipes
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Meal-plan lifecycle
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Cast or replace a ballot for a meal-plan event
    Vote {
        plan_id: String,
        event_id: String,
        /// Voting user id (must be a household member)
        #[arg(long)]
        voter: String,
        /// Option ids, most preferred first
        #[arg(long = "rank", conflicts_with = "abstain")]
        ranked: Vec<String>,
        /// Abstain from this event
        #[arg(long)]
        abstain: bool,
    },
    /// Meal-plan tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Grocery list items
    Grocery {
        #[command(subcommand)]
        command: GroceryCommands,
    },
    /// Background jobs
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
}

#[derive(Subcommand)]
pub enum HouseholdCommands {
    /// Create a household
    Create { name: String },
    /// Add a member to a household
    AddMember { household_id: String, user_id: String },
    /// Remove a member from a household
    RemoveMember { household_id: String, user_id: String },
    /// List household members
    Members { household_id: String },
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// Register an ingredient
    AddIngredient {
        name: String,
        /// Minimum ideal storage temperature in Celsius (3 or below means frozen)
        #[arg(long, allow_hyphen_values = true)]
        min_temp: Option<f32>,
        /// Maximum ideal storage temperature in Celsius
        #[arg(long, allow_hyphen_values = true)]
        max_temp: Option<f32>,
    },
    /// Register a measurement unit
    AddUnit { name: String },
    /// List ingredients and units
    List,
}

#[derive(Subcommand)]
pub enum RecipeCommands {
    /// Create a recipe from a TOML file
    Create {
        /// Path to the recipe TOML file
        file: String,
        /// Owning household id
        #[arg(long)]
        household: String,
    },
    /// Show a recipe with its steps and prep tasks
    Show { recipe_id: String },
    /// Print the step graph
    Graph {
        recipe_id: String,
        /// Emit a Mermaid flowchart of the transitive reduction
        #[arg(long)]
        mermaid: bool,
    },
}

#[derive(Subcommand)]
pub enum MealCommands {
    /// Create a meal from one or more recipes
    Create {
        /// Owning household id
        #[arg(long)]
        household: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Component as RECIPE_ID or RECIPE_ID:SCALE (repeatable)
        #[arg(long = "recipe", required = true)]
        recipes: Vec<String>,
    },
    /// Show a meal and its components
    Show { meal_id: String },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Create a meal plan from a TOML file
    Create {
        /// Path to the meal-plan TOML file
        file: String,
        /// User creating the plan
        #[arg(long)]
        user: String,
    },
    /// Show plan details (or list plans)
    Show {
        /// Plan id to show (omit to list)
        plan_id: Option<String>,
        /// Restrict the listing to one household
        #[arg(long)]
        household: Option<String>,
    },
    /// Tally one event and choose its winning option
    FinalizeEvent {
        plan_id: String,
        event_id: String,
        /// Finalize even if voting is still open
        #[arg(long)]
        admin_override: bool,
    },
    /// Finalize every event that can be finalized
    Finalize {
        plan_id: String,
        #[arg(long)]
        admin_override: bool,
    },
    /// Derive prep tasks for a finalized plan
    CreateTasks { plan_id: String },
    /// Build the grocery list for a plan with tasks
    InitGroceryList { plan_id: String },
    /// Archive a plan
    Archive { plan_id: String },
    /// List members who have not voted on open events
    MissingVotes { plan_id: String },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List the tasks of a plan
    List { plan_id: String },
    /// Change a task's status
    Status {
        task_id: String,
        /// Status the task is expected to be in
        #[arg(long)]
        from: String,
        /// Target status
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "")]
        explanation: String,
    },
}

#[derive(Subcommand)]
pub enum GroceryCommands {
    /// List the grocery list of a plan
    List { plan_id: String },
    /// Record shopping progress on an item
    Update {
        item_id: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        explanation: Option<String>,
        /// Purchased quantity (decimal, up to two fractional digits)
        #[arg(long)]
        purchased: Option<String>,
        /// Unit id of the purchased quantity
        #[arg(long)]
        purchased_unit: Option<String>,
        #[arg(long)]
        upc: Option<String>,
        /// Price in cents
        #[arg(long)]
        price: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum WorkerCommands {
    /// Run every job on a fixed interval until interrupted
    Run {
        /// Override the configured interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Run a single job given as JSON, e.g. '{"job":"drain_outbox"}'
    Job { json: String },
}

/// Execute the `pantry init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        planner: None,
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `pantry db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `pantry db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = PantryConfig::resolve(cli_db_url)?;

    println!("Initializing pantry database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    match pool::latest_migration() {
        Some(version) => println!("Database ready at schema version {version}. Tables:"),
        None => println!("Database ready. Tables:"),
    }
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("pantry db-init complete.");
    Ok(())
}

/// Build a state machine over production id and time sources.
pub fn state_machine(pool: &PgPool, resolved: &PantryConfig) -> MealPlanStateMachine {
    MealPlanStateMachine::new(
        pool.clone(),
        Arc::new(UlidGenerator::new()),
        Arc::new(SystemClock::new()),
        &resolved.planner,
    )
}

/// A token cancelled on Ctrl-C. In-flight transitions roll back.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Household { command } => {
            let resolved = PantryConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = authoring_cmds::run_household_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Catalog { command } => {
            let resolved = PantryConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = authoring_cmds::run_catalog_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Recipe { command } => {
            let resolved = PantryConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = authoring_cmds::run_recipe_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Meal { command } => {
            let resolved = PantryConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = authoring_cmds::run_meal_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Plan { command } => {
            let resolved = PantryConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let machine = state_machine(&db_pool, &resolved);
            let cancel = interrupt_token();
            let result = plan_cmds::run_plan_command(command, &machine, &cancel).await;
            db_pool.close().await;
            result?;
        }
        Commands::Vote {
            plan_id,
            event_id,
            voter,
            ranked,
            abstain,
        } => {
            let resolved = PantryConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let machine = state_machine(&db_pool, &resolved);
            let cancel = interrupt_token();
            let ballot = plan_cmds::ballot_from_args(&voter, &ranked, abstain)?;
            let result = plan_cmds::cmd_vote(&machine, &plan_id, &event_id, &ballot, &cancel).await;
            db_pool.close().await;
            result?;
        }
        Commands::Task { command } => {
            let resolved = PantryConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let machine = state_machine(&db_pool, &resolved);
            let cancel = interrupt_token();
            let result = plan_cmds::run_task_command(command, &machine, &cancel).await;
            db_pool.close().await;
            result?;
        }
        Commands::Grocery { command } => {
            let resolved = PantryConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let machine = state_machine(&db_pool, &resolved);
            let cancel = interrupt_token();
            let result = plan_cmds::run_grocery_command(command, &machine, &cancel).await;
            db_pool.close().await;
            result?;
        }
        Commands::Worker { command } => {
            let resolved = PantryConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let cancel = interrupt_token();
            let result = worker_cmd::run_worker_command(command, &db_pool, &resolved, cancel).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that mutate process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
