//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml
//! structure. Every section carries defaults matching the stock amplitude
//! profiles, so an empty file yields a runnable paper-mode setup.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::engine::scheduler::TradingProfile;

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub accounts: AccountsSection,
    #[serde(default)]
    pub trading: TradingSection,
    #[serde(default)]
    pub chart: ChartSection,
    #[serde(default)]
    pub equalizer: EqualizerSection,
    #[serde(default)]
    pub tax: TaxSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Account pool section
#[derive(Debug, Clone, Deserialize)]
pub struct AccountsSection {
    /// Pool size including the primary account
    #[serde(default = "default_account_count")]
    pub count: usize,
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
    /// Base units seeded per account in paper mode
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
}

/// Normal trade loop section
#[derive(Debug, Clone, Deserialize)]
pub struct TradingSection {
    /// Token the loops trade against
    #[serde(default = "default_token")]
    pub token: String,
    #[serde(default = "default_buy_weight")]
    pub buy_weight: f64,
    #[serde(default = "default_buy_min")]
    pub buy_min: f64,
    #[serde(default = "default_buy_max")]
    pub buy_max: f64,
    #[serde(default = "default_sell_fraction_min")]
    pub sell_fraction_min: f64,
    #[serde(default = "default_sell_fraction_max")]
    pub sell_fraction_max: f64,
    /// Per-account start stagger, seconds
    #[serde(default = "default_initial_delay_min_secs")]
    pub initial_delay_min_secs: u64,
    #[serde(default = "default_initial_delay_max_secs")]
    pub initial_delay_max_secs: u64,
    #[serde(default = "default_tick_min_secs")]
    pub tick_min_secs: u64,
    #[serde(default = "default_tick_max_secs")]
    pub tick_max_secs: u64,
}

/// Chart-activity loop section
#[derive(Debug, Clone, Deserialize)]
pub struct ChartSection {
    #[serde(default = "default_chart_buy_weight")]
    pub buy_weight: f64,
    #[serde(default = "default_chart_buy_min")]
    pub buy_min: f64,
    #[serde(default = "default_chart_buy_max")]
    pub buy_max: f64,
    #[serde(default = "default_chart_sell_fraction_min")]
    pub sell_fraction_min: f64,
    #[serde(default = "default_chart_sell_fraction_max")]
    pub sell_fraction_max: f64,
    /// Fixed period between ticks, seconds
    #[serde(default = "default_chart_tick_secs")]
    pub tick_secs: u64,
}

/// Balance equalization section
#[derive(Debug, Clone, Deserialize)]
pub struct EqualizerSection {
    /// Base units the primary account keeps back for fees
    #[serde(default = "default_reserve")]
    pub reserve: f64,
}

/// Trade tax section
#[derive(Debug, Clone, Deserialize)]
pub struct TaxSection {
    /// Install the policy for the trading token at startup
    #[serde(default = "default_tax_enabled")]
    pub enabled: bool,
    #[serde(default = "default_buy_tax")]
    pub buy_percent: f64,
    #[serde(default = "default_sell_tax")]
    pub sell_percent: f64,
}

/// Auto-extraction monitor section
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_eval_period_secs")]
    pub eval_period_secs: u64,
    /// Number of trades that trips the volume trigger
    #[serde(default = "default_volume_threshold")]
    pub volume_threshold: u64,
    #[serde(default = "default_time_limit_minutes")]
    pub time_limit_minutes: u64,
    #[serde(default = "default_drop_percent")]
    pub drop_percent_threshold: f64,
}

/// Logging section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_account_count() -> usize {
    5
}
fn default_label_prefix() -> String {
    "wallet".to_string()
}
fn default_initial_balance() -> f64 {
    1.0
}
fn default_token() -> String {
    "MEME".to_string()
}
fn default_buy_weight() -> f64 {
    0.7
}
fn default_buy_min() -> f64 {
    0.01
}
fn default_buy_max() -> f64 {
    0.05
}
fn default_sell_fraction_min() -> f64 {
    0.10
}
fn default_sell_fraction_max() -> f64 {
    0.50
}
fn default_initial_delay_min_secs() -> u64 {
    5
}
fn default_initial_delay_max_secs() -> u64 {
    15
}
fn default_tick_min_secs() -> u64 {
    30
}
fn default_tick_max_secs() -> u64 {
    90
}
fn default_chart_buy_weight() -> f64 {
    0.6
}
fn default_chart_buy_min() -> f64 {
    0.005
}
fn default_chart_buy_max() -> f64 {
    0.02
}
fn default_chart_sell_fraction_min() -> f64 {
    0.05
}
fn default_chart_sell_fraction_max() -> f64 {
    0.15
}
fn default_chart_tick_secs() -> u64 {
    600
}
fn default_reserve() -> f64 {
    0.5
}
fn default_tax_enabled() -> bool {
    true
}
fn default_buy_tax() -> f64 {
    3.0
}
fn default_sell_tax() -> f64 {
    5.0
}
fn default_eval_period_secs() -> u64 {
    60
}
fn default_volume_threshold() -> u64 {
    1_000
}
fn default_time_limit_minutes() -> u64 {
    60
}
fn default_drop_percent() -> f64 {
    30.0
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AccountsSection {
    fn default() -> Self {
        Self {
            count: default_account_count(),
            label_prefix: default_label_prefix(),
            initial_balance: default_initial_balance(),
        }
    }
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            token: default_token(),
            buy_weight: default_buy_weight(),
            buy_min: default_buy_min(),
            buy_max: default_buy_max(),
            sell_fraction_min: default_sell_fraction_min(),
            sell_fraction_max: default_sell_fraction_max(),
            initial_delay_min_secs: default_initial_delay_min_secs(),
            initial_delay_max_secs: default_initial_delay_max_secs(),
            tick_min_secs: default_tick_min_secs(),
            tick_max_secs: default_tick_max_secs(),
        }
    }
}

impl Default for ChartSection {
    fn default() -> Self {
        Self {
            buy_weight: default_chart_buy_weight(),
            buy_min: default_chart_buy_min(),
            buy_max: default_chart_buy_max(),
            sell_fraction_min: default_chart_sell_fraction_min(),
            sell_fraction_max: default_chart_sell_fraction_max(),
            tick_secs: default_chart_tick_secs(),
        }
    }
}

impl Default for EqualizerSection {
    fn default() -> Self {
        Self {
            reserve: default_reserve(),
        }
    }
}

impl Default for TaxSection {
    fn default() -> Self {
        Self {
            enabled: default_tax_enabled(),
            buy_percent: default_buy_tax(),
            sell_percent: default_sell_tax(),
        }
    }
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            eval_period_secs: default_eval_period_secs(),
            volume_threshold: default_volume_threshold(),
            time_limit_minutes: default_time_limit_minutes(),
            drop_percent_threshold: default_drop_percent(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TradingSection {
    pub fn profile(&self) -> TradingProfile {
        TradingProfile {
            buy_weight: self.buy_weight,
            buy_min: self.buy_min,
            buy_max: self.buy_max,
            sell_fraction_min: self.sell_fraction_min,
            sell_fraction_max: self.sell_fraction_max,
            initial_delay_ms: (
                self.initial_delay_min_secs * 1_000,
                self.initial_delay_max_secs * 1_000,
            ),
            tick_delay_ms: (self.tick_min_secs * 1_000, self.tick_max_secs * 1_000),
        }
    }
}

impl ChartSection {
    /// Chart loops tick immediately, so no initial delay
    pub fn profile(&self) -> TradingProfile {
        TradingProfile {
            buy_weight: self.buy_weight,
            buy_min: self.buy_min,
            buy_max: self.buy_max,
            sell_fraction_min: self.sell_fraction_min,
            sell_fraction_max: self.sell_fraction_max,
            initial_delay_ms: (0, 0),
            tick_delay_ms: (self.tick_secs * 1_000, self.tick_secs * 1_000),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.count < 2 {
            return Err(ConfigError::ValidationError(format!(
                "accounts.count must be at least 2, got {}",
                self.accounts.count
            )));
        }

        if self.trading.token.is_empty() {
            return Err(ConfigError::ValidationError(
                "trading.token cannot be empty".to_string(),
            ));
        }

        for (name, weight) in [
            ("trading.buy_weight", self.trading.buy_weight),
            ("chart.buy_weight", self.chart.buy_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be 0-1, got {weight}"
                )));
            }
        }

        for (name, min, max) in [
            ("trading buy range", self.trading.buy_min, self.trading.buy_max),
            ("chart buy range", self.chart.buy_min, self.chart.buy_max),
        ] {
            if min <= 0.0 || min > max {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must satisfy 0 < min <= max, got {min}..{max}"
                )));
            }
        }

        for (name, min, max) in [
            (
                "trading sell fraction",
                self.trading.sell_fraction_min,
                self.trading.sell_fraction_max,
            ),
            (
                "chart sell fraction",
                self.chart.sell_fraction_min,
                self.chart.sell_fraction_max,
            ),
        ] {
            if min <= 0.0 || min > max || max > 1.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must satisfy 0 < min <= max <= 1, got {min}..{max}"
                )));
            }
        }

        if self.trading.initial_delay_min_secs > self.trading.initial_delay_max_secs
            || self.trading.tick_min_secs > self.trading.tick_max_secs
        {
            return Err(ConfigError::ValidationError(
                "trading delay ranges must satisfy min <= max".to_string(),
            ));
        }

        if self.chart.tick_secs == 0 {
            return Err(ConfigError::ValidationError(
                "chart.tick_secs must be > 0".to_string(),
            ));
        }

        if self.equalizer.reserve < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "equalizer.reserve must be >= 0, got {}",
                self.equalizer.reserve
            )));
        }

        for (name, pct) in [
            ("tax.buy_percent", self.tax.buy_percent),
            ("tax.sell_percent", self.tax.sell_percent),
        ] {
            if pct.is_nan() || pct < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be >= 0, got {pct}"
                )));
            }
        }

        if self.monitor.eval_period_secs == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.eval_period_secs must be > 0".to_string(),
            ));
        }

        if self.monitor.time_limit_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.time_limit_minutes must be > 0".to_string(),
            ));
        }

        if !(self.monitor.drop_percent_threshold > 0.0
            && self.monitor.drop_percent_threshold <= 100.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "monitor.drop_percent_threshold must be 0-100, got {}",
                self.monitor.drop_percent_threshold
            )));
        }

        Ok(())
    }
}
