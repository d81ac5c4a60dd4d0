//! Engine configuration.
//!
//! Loaded from environment variables with fallback to defaults. Tenant
//! settings (stock mode, store currency) are NOT configuration: they are
//! persisted per tenant and read at the start of each operation.

use std::env;
use std::str::FromStr;

use orbia_core::catalog::CatalogLimits;
use orbia_core::validation::normalize_currency;

use crate::error::DbResult;
use crate::pool::{Database, DbConfig};

/// Process-wide engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db: DbConfig,
    pub catalog: CatalogLimits,
    /// Store currency for tenants created without one.
    pub default_currency: String,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                    | Default      |
    /// |-----------------------------|--------------|
    /// | `ORBIA_DATABASE_PATH`       | `./orbia.db` |
    /// | `ORBIA_MAX_CONNECTIONS`     | `5`          |
    /// | `ORBIA_EXPORT_ROW_CAP`      | `5000`       |
    /// | `ORBIA_MAX_PAGE_SIZE`       | `100`        |
    /// | `ORBIA_DEFAULT_CURRENCY`    | `ARS`        |
    /// | `ORBIA_LOW_STOCK_THRESHOLD` | `5`          |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CatalogLimits::default();

        let path = lookup("ORBIA_DATABASE_PATH").unwrap_or_else(|| "./orbia.db".to_string());
        let max_connections: u32 = parse_var(&lookup, "ORBIA_MAX_CONNECTIONS", 5)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue("ORBIA_MAX_CONNECTIONS".to_string()));
        }

        let catalog = CatalogLimits {
            export_row_cap: parse_var(&lookup, "ORBIA_EXPORT_ROW_CAP", defaults.export_row_cap)?,
            max_page_size: parse_var(&lookup, "ORBIA_MAX_PAGE_SIZE", defaults.max_page_size)?,
            default_low_stock_threshold: parse_var(
                &lookup,
                "ORBIA_LOW_STOCK_THRESHOLD",
                defaults.default_low_stock_threshold,
            )?,
            default_page_size: defaults.default_page_size,
        };
        if catalog.export_row_cap < 1 {
            return Err(ConfigError::InvalidValue("ORBIA_EXPORT_ROW_CAP".to_string()));
        }
        if catalog.max_page_size < 1 {
            return Err(ConfigError::InvalidValue("ORBIA_MAX_PAGE_SIZE".to_string()));
        }
        if !(0..=orbia_core::catalog::MAX_LOW_STOCK_THRESHOLD)
            .contains(&catalog.default_low_stock_threshold)
        {
            return Err(ConfigError::InvalidValue("ORBIA_LOW_STOCK_THRESHOLD".to_string()));
        }

        let default_currency = normalize_currency(
            &lookup("ORBIA_DEFAULT_CURRENCY").unwrap_or_else(|| "ARS".to_string()),
        )
        .map_err(|_| ConfigError::InvalidValue("ORBIA_DEFAULT_CURRENCY".to_string()))?;

        Ok(EngineConfig {
            db: DbConfig::new(path).max_connections(max_connections),
            catalog,
            default_currency,
        })
    }

    /// Opens the database described by this configuration.
    pub async fn connect(&self) -> DbResult<Database> {
        Ok(Database::new(self.db.clone())
            .await?
            .with_catalog_limits(self.catalog))
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
