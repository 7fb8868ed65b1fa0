use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::{debug, info};

use crate::config::DbConfig;

/// Schema migrations compiled in from `crates/pantry-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Open the application pool.
///
/// Every session is pinned to UTC so voting deadlines and event windows
/// compare the same way regardless of the server's configured zone.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET TIME ZONE 'UTC'").await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .with_context(|| format!("cannot reach pantry database at {}", config.database_url))
}

/// Apply any embedded migrations the database has not seen yet.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("pantry schema migration failed")?;
    info!(latest = ?latest_migration(), "pantry schema up to date");
    Ok(())
}

/// Version number of the newest embedded migration.
pub fn latest_migration() -> Option<i64> {
    MIGRATOR.iter().map(|m| m.version).max()
}

/// Create the configured database on first run.
///
/// Goes through the server's `postgres` database because the target one may
/// not exist yet. A database that is already there is left untouched.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<()> {
    let db_name = config
        .database_name()
        .context("database URL has no database name")?;
    check_database_name(db_name)?;

    let maintenance = connect_maintenance(config).await?;
    let present: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&maintenance)
            .await
            .context("failed to look up database in pg_database")?;

    let result = if present {
        debug!(db = db_name, "database present");
        Ok(())
    } else {
        maintenance
            .execute(format!("CREATE DATABASE {db_name}").as_str())
            .await
            .map(|_| info!(db = db_name, "created pantry database"))
            .with_context(|| format!("failed to create database {db_name}"))
    };

    maintenance.close().await;
    result
}

async fn connect_maintenance(config: &DbConfig) -> Result<PgPool> {
    let url = config.maintenance_url();
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(config.acquire_timeout)
        .connect(&url)
        .await
        .with_context(|| format!("cannot reach maintenance database at {url}"))
}

/// `CREATE DATABASE` takes no bind parameters, so the name is spliced in
/// and must be a plain identifier.
fn check_database_name(name: &str) -> Result<()> {
    let plain = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !plain {
        anyhow::bail!("database name {name:?} must be letters, digits and underscores");
    }
    Ok(())
}

/// Row counts for the pantry tables, ordered by table name.
///
/// sqlx bookkeeping tables are skipped. `pantry db-init` prints the result.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = 'public' AND tablename NOT LIKE '\\_sqlx%' \
         ORDER BY tablename",
    )
    .fetch_all(pool)
    .await
    .context("failed to list pantry tables")?;

    if tables.is_empty() {
        return Ok(Vec::new());
    }

    // Table names come straight from pg_tables.
    let counting = tables
        .iter()
        .enumerate()
        .map(|(i, t)| format!("SELECT {i} AS ord, '{t}' AS name, COUNT(*) AS n FROM {t}"))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    let rows: Vec<(i32, String, i64)> =
        sqlx::query_as(&format!("SELECT ord, name, n FROM ({counting}) c ORDER BY ord"))
            .fetch_all(pool)
            .await
            .context("failed to count rows in pantry tables")?;

    Ok(rows.into_iter().map(|(_, name, n)| (name, n)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_database_names_pass() {
        assert!(check_database_name("pantry").is_ok());
        assert!(check_database_name("pantry_test_01").is_ok());
    }

    #[test]
    fn database_names_that_need_quoting_are_refused() {
        for bad in ["", "9lives", "pantry-dev", "pantry;drop", "Pantry Db"] {
            assert!(check_database_name(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn schema_has_an_embedded_migration() {
        assert_eq!(latest_migration(), Some(1));
    }
}
