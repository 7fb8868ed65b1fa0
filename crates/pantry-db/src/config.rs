use std::env;
use std::time::Duration;

/// Connection settings for the pantry database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long to wait for a pooled connection before giving up.
    pub acquire_timeout: Duration,
}

/// A connection URL cut at its database path:
/// `<server>/<database>?<params>`.
struct UrlParts<'a> {
    server: &'a str,
    database: &'a str,
    params: Option<&'a str>,
}

impl<'a> UrlParts<'a> {
    fn split(url: &'a str) -> Self {
        let (rest, params) = match url.split_once('?') {
            Some((rest, params)) => (rest, Some(params)),
            None => (url, None),
        };
        let authority_start = rest.find("://").map(|i| i + 3).unwrap_or(0);
        match rest[authority_start..].find('/') {
            Some(slash) => {
                let slash = authority_start + slash;
                Self {
                    server: &rest[..slash],
                    database: &rest[slash + 1..],
                    params,
                }
            }
            None => Self {
                server: rest,
                database: "",
                params,
            },
        }
    }
}

impl DbConfig {
    /// Used when neither a flag, the environment, nor the config file names
    /// a database.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/pantry";

    /// Environment variable consulted by [`DbConfig::from_env`].
    pub const URL_ENV_VAR: &str = "PANTRY_DATABASE_URL";

    /// `PANTRY_DATABASE_URL` if set, else [`DbConfig::DEFAULT_URL`].
    pub fn from_env() -> Self {
        Self::new(env::var(Self::URL_ENV_VAR).unwrap_or_else(|_| Self::DEFAULT_URL.to_owned()))
    }

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    /// Database named in the URL path, if there is one.
    pub fn database_name(&self) -> Option<&str> {
        Some(UrlParts::split(&self.database_url).database).filter(|name| !name.is_empty())
    }

    /// Same server and connection parameters, pointed at the `postgres`
    /// database. `CREATE DATABASE` runs there while the target is missing.
    pub fn maintenance_url(&self) -> String {
        let parts = UrlParts::split(&self.database_url);
        match parts.params {
            Some(params) => format!("{}/postgres?{params}", parts.server),
            None => format!("{}/postgres", parts.server),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL);
        assert_eq!(cfg.database_url, "postgresql://localhost:5432/pantry");
        assert_eq!(cfg.max_connections, 10);
    }

    #[test]
    fn database_name_extraction() {
        let cfg = DbConfig::new("postgresql://localhost:5432/mealdb");
        assert_eq!(cfg.database_name(), Some("mealdb"));
    }

    #[test]
    fn database_name_ignores_query_string() {
        let cfg = DbConfig::new("postgresql://localhost:5432/mealdb?sslmode=disable");
        assert_eq!(cfg.database_name(), Some("mealdb"));
    }

    #[test]
    fn database_name_absent_without_path() {
        for url in [
            "postgresql://user:pw@localhost:5432",
            "postgresql://user:pw@localhost:5432/",
            "postgresql://localhost?sslmode=require",
        ] {
            assert_eq!(DbConfig::new(url).database_name(), None, "{url}");
        }
    }

    #[test]
    fn credentials_with_slashes_in_params_do_not_confuse_the_split() {
        let cfg = DbConfig::new("postgresql://u:p@db:5432/pantry?sslrootcert=/etc/ca.pem");
        assert_eq!(cfg.database_name(), Some("pantry"));
        assert_eq!(
            cfg.maintenance_url(),
            "postgresql://u:p@db:5432/postgres?sslrootcert=/etc/ca.pem"
        );
    }

    #[test]
    fn maintenance_url_replaces_db() {
        let cfg = DbConfig::new("postgresql://localhost:5432/pantry");
        assert_eq!(cfg.maintenance_url(), "postgresql://localhost:5432/postgres");
    }

    #[test]
    fn maintenance_url_keeps_connection_params() {
        let cfg = DbConfig::new("postgresql://localhost:5432/pantry?sslmode=require");
        assert_eq!(
            cfg.maintenance_url(),
            "postgresql://localhost:5432/postgres?sslmode=require"
        );
    }
}
