//! Configuration file management for pantry.
//!
//! Provides a TOML-based config file at `~/.config/pantry/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use pantry_core::config::PlannerConfig;
use pantry_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    /// Omitted from files written by `pantry init`; every field defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner: Option<PlannerConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the pantry config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/pantry` or `~/.config/pantry`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("pantry");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("pantry")
}

/// Return the path to the pantry config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<ConfigFile> {
    toml::from_str(contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // The database URL may carry a password.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct PantryConfig {
    pub db_config: DbConfig,
    pub planner: PlannerConfig,
}

impl PantryConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `PANTRY_DATABASE_URL` env > `config_file.database.url` > `DbConfig::DEFAULT_URL`
    /// - Planner: `config_file.planner` > `PlannerConfig::default()`
    ///
    /// A config file that exists but does not parse is an error; a missing
    /// one is not.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let path = config_path();
        let file_config = if path.exists() {
            Some(load_config()?)
        } else {
            None
        };

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DbConfig::URL_ENV_VAR) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let planner = file_config
            .and_then(|cfg| cfg.planner)
            .unwrap_or_default();

        Ok(Self {
            db_config: DbConfig::new(db_url),
            planner,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use pantry_db::models::MealPlanTaskStatus;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    /// Point `XDG_CONFIG_HOME` at a temp dir for the duration of `f`.
    fn with_config_home<T>(contents: Option<&str>, f: impl FnOnce() -> T) -> T {
        let tmp = tempfile::TempDir::new().unwrap();
        if let Some(contents) = contents {
            let dir = tmp.path().join("pantry");
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("config.toml"), contents).unwrap();
        }
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = f();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        result
    }

    #[test]
    fn init_file_has_no_planner_section() {
        let cfg = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://testhost:5432/testdb".to_string(),
            },
            planner: None,
        };
        let contents = toml::to_string_pretty(&cfg).unwrap();
        assert!(contents.contains("[database]"));
        assert!(!contents.contains("planner"));

        let loaded = parse_config(&contents).unwrap();
        assert_eq!(loaded.database.url, cfg.database.url);
        assert!(loaded.planner.is_none());
    }

    #[test]
    fn planner_section_is_read() {
        let loaded = parse_config(
            r#"
[database]
url = "postgresql://localhost:5432/pantry"

[planner]
worker_interval_secs = 10

[planner.retry]
max_attempts = 6

[planner.task_transitions]
unfinished = ["finished", "canceled"]
"#,
        )
        .unwrap();
        let planner = loaded.planner.unwrap();
        assert_eq!(planner.worker_interval_secs, 10);
        assert_eq!(planner.retry.max_attempts, 6);
        assert!(planner
            .task_transitions
            .allows(MealPlanTaskStatus::Unfinished, MealPlanTaskStatus::Canceled));
        assert!(!planner
            .task_transitions
            .allows(MealPlanTaskStatus::Unfinished, MealPlanTaskStatus::Postponed));
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();

        unsafe { std::env::set_var("PANTRY_DATABASE_URL", "postgresql://env:5432/envdb") };
        let config = with_config_home(None, || {
            PantryConfig::resolve(Some("postgresql://cli:5432/clidb")).unwrap()
        });
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");
        unsafe { std::env::remove_var("PANTRY_DATABASE_URL") };
    }

    #[test]
    fn resolve_with_env_var_overrides_config_file() {
        let _lock = lock_env();

        unsafe { std::env::set_var("PANTRY_DATABASE_URL", "postgresql://env:5432/envdb") };
        let config = with_config_home(
            Some("[database]\nurl = \"postgresql://file:5432/filedb\"\n"),
            || PantryConfig::resolve(None).unwrap(),
        );
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        unsafe { std::env::remove_var("PANTRY_DATABASE_URL") };
    }

    #[test]
    fn resolve_reads_config_file() {
        let _lock = lock_env();

        unsafe { std::env::remove_var("PANTRY_DATABASE_URL") };
        let config = with_config_home(
            Some(
                "[database]\nurl = \"postgresql://file:5432/filedb\"\n\n[planner]\noutbox_batch_size = 7\n",
            ),
            || PantryConfig::resolve(None).unwrap(),
        );
        assert_eq!(config.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(config.planner.outbox_batch_size, 7);
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _lock = lock_env();

        unsafe { std::env::remove_var("PANTRY_DATABASE_URL") };
        let config = with_config_home(None, || PantryConfig::resolve(None).unwrap());
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.planner, PlannerConfig::default());
    }

    #[test]
    fn resolve_rejects_a_broken_config_file() {
        let _lock = lock_env();

        let result = with_config_home(Some("[database"), || PantryConfig::resolve(None));
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("failed to parse config file"), "unexpected error: {msg}");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("pantry/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
