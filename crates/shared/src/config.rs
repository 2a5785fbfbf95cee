//! Runtime configuration
//!
//! Environment-based, loaded once at startup. Billing secrets live in
//! `treehouse_billing::BillingConfig`; this struct covers the storage and
//! job-runner surface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Core runtime configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: String,
    /// Retention enforcement switch. Off means the sweeper reports a loud
    /// skip and mutates nothing; this is a compliance-relevant control.
    pub retention_enforcement: bool,
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;

        let retention_enforcement = match std::env::var("RETENTION_ENFORCEMENT") {
            Ok(v) => parse_bool("RETENTION_ENFORCEMENT", &v)?,
            Err(_) => true,
        };

        Ok(Self {
            database_url,
            retention_enforcement,
        })
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_accepts_common_forms() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "ON").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }
}
