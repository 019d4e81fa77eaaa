use crate::error::{MarketError, MarketResult};
use crate::id::Amount;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Label used to derive an exchange address when none is configured
pub const DEFAULT_EXCHANGE_LABEL: &str = "atelier-exchange";

/// Settings for an exchange engine.
///
/// The price floor is expressed in the smallest transferable unit of the
/// deployment's currency, so it is configured rather than fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Lowest accepted listing price
    pub min_price: Amount,

    /// Seed mixed into the engine's derived address
    pub label: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            min_price: 1,
            label: DEFAULT_EXCHANGE_LABEL.to_string(),
        }
    }
}

impl ExchangeConfig {
    pub fn with_min_price(min_price: Amount) -> Self {
        Self {
            min_price,
            ..Self::default()
        }
    }

    /// Parse a JSON document; absent fields take their defaults
    pub fn from_json_str(json: &str) -> MarketResult<Self> {
        let config: ExchangeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: &Path) -> MarketResult<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading exchange config {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> MarketResult<()> {
        if self.min_price == 0 {
            return Err(MarketError::Config(
                "min_price must be at least 1: listing prices are strictly positive".to_string(),
            ));
        }
        if self.label.is_empty() {
            return Err(MarketError::Config("label must not be empty".to_string()));
        }
        Ok(())
    }
}
