//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for IG API credentials.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::{AccountMode, Pair, Resolution};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub broker: BrokerConfig,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        // Credentials from environment take precedence over the file
        if let Ok(username) = std::env::var("IG_USERNAME") {
            config.broker.username = Some(username);
        }
        if let Ok(password) = std::env::var("IG_PASSWORD") {
            config.broker.password = Some(password);
        }
        if let Ok(api_key) = std::env::var("IG_API_KEY") {
            config.broker.api_key = Some(api_key);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.trading.pairs.is_empty() {
            bail!("'trading.pairs' must list at least one epic");
        }
        self.risk.validate()
    }
}

/// IG session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub account_mode: AccountMode,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            username: None,
            password: None,
            api_key: None,
            account_mode: AccountMode::Demo,
        }
    }
}

/// Trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// IG epics to evaluate each cycle
    pub pairs: Vec<String>,
    pub resolution: Resolution,
    /// Route completed orders to the log instead of the broker
    #[serde(default = "default_test")]
    pub test: bool,
    /// Currency the IG position ticket is denominated in
    #[serde(default = "default_currency")]
    pub currency_code: String,
}

fn default_test() -> bool {
    true
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            pairs: vec![
                "CS.D.EURUSD.MINI.IP".to_string(),
                "CS.D.GBPUSD.MINI.IP".to_string(),
            ],
            resolution: Resolution::Hour,
            test: true,
            currency_code: "USD".to_string(),
        }
    }
}

impl TradingConfig {
    pub fn pairs(&self) -> Vec<Pair> {
        self.pairs.iter().map(Pair::new).collect()
    }
}

/// Risk parameterization, shared by all pairs for the lifetime of a run
///
/// `momentum_lookback` and `entry_tolerance` default to 5 bars and 0.002
/// price units; both are deliberately configuration rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Contract size per order, copied verbatim onto every order
    pub size: f64,
    /// Stop distance in points, direction-relative at the broker
    pub stop_distance: f64,
    /// Limit distance in points, direction-relative at the broker
    pub limit_distance: f64,
    /// Trailing bars for support/resistance extraction (>= 2)
    pub window: usize,
    /// Trailing closes for the momentum slope (>= 2)
    #[serde(default = "default_momentum_lookback")]
    pub momentum_lookback: usize,
    /// How close to a range edge counts as "at the edge" for mean reversion
    #[serde(default = "default_entry_tolerance")]
    pub entry_tolerance: f64,
}

fn default_momentum_lookback() -> usize {
    5
}

fn default_entry_tolerance() -> f64 {
    0.002
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            size: 1.0,
            stop_distance: 20.0,
            limit_distance: 40.0,
            window: 14,
            momentum_lookback: default_momentum_lookback(),
            entry_tolerance: default_entry_tolerance(),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size <= 0.0 {
            bail!("'risk.size' must be positive, got {}", self.size);
        }
        if self.stop_distance <= 0.0 {
            bail!(
                "'risk.stop_distance' must be positive, got {}",
                self.stop_distance
            );
        }
        if self.limit_distance <= 0.0 {
            bail!(
                "'risk.limit_distance' must be positive, got {}",
                self.limit_distance
            );
        }
        if self.window < 2 {
            bail!("'risk.window' must be at least 2, got {}", self.window);
        }
        if self.momentum_lookback < 2 {
            bail!(
                "'risk.momentum_lookback' must be at least 2, got {}",
                self.momentum_lookback
            );
        }
        if self.entry_tolerance < 0.0 {
            bail!(
                "'risk.entry_tolerance' must not be negative, got {}",
                self.entry_tolerance
            );
        }
        Ok(())
    }

    /// Minimum bars a fetched series must carry for one full evaluation
    pub fn min_bars(&self) -> usize {
        self.window.max(self.momentum_lookback)
    }
}
