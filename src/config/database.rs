//! Ledger database settings.
//!
//! Every webhook handler reads and writes through one shared pool. The
//! booking status projection holds a connection for a whole multi-table
//! transaction, so statements carry a server-side timeout: a stuck write
//! fails the event back to the sender instead of pinning the pool.

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::str::FromStr;
use std::time::Duration;

use super::error::ValidationError;

/// Reported to PostgreSQL as `application_name`.
const APPLICATION_NAME: &str = "kitchen-payments";

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://` URL of the database holding ledger, booking and payee tables
    pub url: String,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Upper bound on concurrently processed deliveries that touch the database
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds a delivery waits for a pooled connection before failing retryably
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Server-side `statement_timeout` in seconds
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,

    /// Apply `migrations/` on startup
    #[serde(default)]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Connection options for the pool: the URL plus application name and
    /// statement timeout.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        let timeout_ms = self.statement_timeout_secs.saturating_mul(1000);
        Ok(PgConnectOptions::from_str(&self.url)?
            .application_name(APPLICATION_NAME)
            .options([("statement_timeout", timeout_ms.to_string())]))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("DATABASE_URL"));
        }
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        if self.max_connections > 100 {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        if self.statement_timeout_secs == 0 || self.statement_timeout_secs > 300 {
            return Err(ValidationError::InvalidStatementTimeout);
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            statement_timeout_secs: default_statement_timeout(),
            run_migrations: false,
        }
    }
}

fn default_min_connections() -> u32 {
    2
}

fn default_max_connections() -> u32 {
    10
}

// Stays below the sender's delivery timeout
fn default_acquire_timeout() -> u64 {
    5
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_statement_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_url(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validation_missing_url() {
        assert!(matches!(
            DatabaseConfig::default().validate(),
            Err(ValidationError::MissingRequired("DATABASE_URL"))
        ));
    }

    #[test]
    fn test_validation_rejects_non_postgres_url() {
        assert!(matches!(
            with_url("mysql://localhost/test").validate(),
            Err(ValidationError::InvalidDatabaseUrl)
        ));
    }

    #[test]
    fn test_validation_invalid_pool_size() {
        let config = DatabaseConfig {
            min_connections: 10,
            max_connections: 5,
            ..with_url("postgresql://localhost/test")
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPoolSize)
        ));
    }

    #[test]
    fn test_validation_rejects_unbounded_statement_timeout() {
        let config = DatabaseConfig {
            statement_timeout_secs: 0,
            ..with_url("postgresql://localhost/test")
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidStatementTimeout)
        ));
    }

    #[test]
    fn test_defaults_validate() {
        assert!(with_url("postgres://payments@localhost/kitchen")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_connect_options_carry_service_name() {
        let options = with_url("postgres://payments@localhost:5433/kitchen")
            .connect_options()
            .unwrap();
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_database(), Some("kitchen"));
        assert_eq!(options.get_application_name(), Some(APPLICATION_NAME));
    }

    #[test]
    fn test_durations() {
        let config = DatabaseConfig {
            acquire_timeout_secs: 3,
            idle_timeout_secs: 90,
            ..Default::default()
        };
        assert_eq!(config.acquire_timeout(), Duration::from_secs(3));
        assert_eq!(config.idle_timeout(), Duration::from_secs(90));
    }
}
