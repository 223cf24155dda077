//! Worker configuration loaded from environment variables.

use std::time::Duration;

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL` — PostgreSQL connection string; in-memory storage when unset
/// - `SWEEP_INTERVAL_SECS` — seconds between deadline sweeps (default: `3600`)
/// - `REMINDER_INTERVAL_SECS` — seconds between reminder sweeps (default: `1800`)
/// - `OPS_EMAIL` — address for sweep reports (default: `"ops@marketplace.local"`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub sweep_interval: Duration,
    pub reminder_interval: Duration,
    pub ops_email: String,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            sweep_interval: Duration::from_secs(
                std::env::var("SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3600),
            ),
            reminder_interval: Duration::from_secs(
                std::env::var("REMINDER_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1800),
            ),
            ops_email: std::env::var("OPS_EMAIL")
                .unwrap_or_else(|_| "ops@marketplace.local".to_string()),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            sweep_interval: Duration::from_secs(3600),
            reminder_interval: Duration::from_secs(1800),
            ops_email: "ops@marketplace.local".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.reminder_interval, Duration::from_secs(1800));
        assert_eq!(config.ops_email, "ops@marketplace.local");
        assert_eq!(config.log_level, "info");
    }
}
