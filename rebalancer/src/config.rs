//! TOML configuration loading and validation.

use std::fmt;
use std::path::{Path, PathBuf};

use lotplan::{Environment, PlanConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub account: AccountConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    #[serde(default)]
    pub env: Environment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Paper account snapshot (JSON).
    #[serde(default = "default_snapshot")]
    pub snapshot: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot(),
        }
    }
}

fn default_snapshot() -> String {
    "paper.json".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanningConfig {
    #[serde(default = "default_band")]
    pub band_pct: f64,
    /// Per instrument. 0 = unlimited.
    #[serde(default)]
    pub max_order_value: f64,
    #[serde(default = "default_safety_margin")]
    pub safety_margin_pct: f64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            band_pct: default_band(),
            max_order_value: 0.0,
            safety_margin_pct: default_safety_margin(),
        }
    }
}

fn default_band() -> f64 {
    1.0
}
fn default_safety_margin() -> f64 {
    1.0
}

/// Market orders, or limit orders offset from the last price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStyle {
    #[default]
    Market,
    Limit,
}

impl fmt::Display for OrderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStyle::Market => f.pad("market"),
            OrderStyle::Limit => f.pad("limit"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_interval")]
    pub order_interval_ms: u64,
    #[serde(default)]
    pub order_style: OrderStyle,
    #[serde(default = "default_offset")]
    pub limit_offset_bps: u32,
    #[serde(default = "default_max_orders")]
    pub max_orders_per_run: usize,
    #[serde(default = "default_true")]
    pub cancel_pending: bool,
    /// Extra attempts after a transient broker error. 0 = no retry.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// First retry delay; doubles on each further attempt.
    #[serde(default = "default_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_interval_ms: default_interval(),
            order_style: OrderStyle::Market,
            limit_offset_bps: default_offset(),
            max_orders_per_run: default_max_orders(),
            cancel_pending: true,
            max_retries: default_retries(),
            retry_backoff_ms: default_backoff(),
        }
    }
}

fn default_interval() -> u64 {
    1_000
}
fn default_offset() -> u32 {
    5
}
fn default_max_orders() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_retries() -> u32 {
    2
}
fn default_backoff() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostConfig {
    #[serde(default = "default_commission")]
    pub commission_rate: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            commission_rate: default_commission(),
        }
    }
}

fn default_commission() -> f64 {
    lotplan::DEFAULT_COMMISSION_RATE
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        if self.account.id.is_empty() {
            return Err(Error::Config("account id must not be empty".into()));
        }
        if self.planning.band_pct < 0.0 {
            return Err(Error::Config("band_pct must be >= 0".into()));
        }
        if self.planning.max_order_value < 0.0 {
            return Err(Error::Config("max_order_value must be >= 0".into()));
        }
        if !(0.0..100.0).contains(&self.planning.safety_margin_pct) {
            return Err(Error::Config(
                "safety_margin_pct must be in [0, 100)".into(),
            ));
        }
        if self.execution.max_orders_per_run == 0 {
            return Err(Error::Config("max_orders_per_run must be > 0".into()));
        }
        if self.execution.max_retries > 10 {
            return Err(Error::Config("max_retries must be <= 10".into()));
        }
        if self.cost.commission_rate < 0.0 {
            return Err(Error::Config("commission_rate must be >= 0".into()));
        }
        Ok(())
    }

    /// Planner knobs, with an optional band override from the target file.
    pub fn plan_config(&self, band_override: Option<f64>) -> PlanConfig {
        PlanConfig::default()
            .with_band_pct(band_override.unwrap_or(self.planning.band_pct))
            .with_max_order_value(self.planning.max_order_value)
            .with_safety_margin_pct(self.planning.safety_margin_pct)
            .with_environment(self.account.env)
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[account]
id = "50012345-01"
env = "live"

[broker]
snapshot = "accounts/paper.json"

[planning]
band_pct = 1.5
max_order_value = 10000000
safety_margin_pct = 1.0

[execution]
order_interval_ms = 500
order_style = "limit"
limit_offset_bps = 10
max_orders_per_run = 30
cancel_pending = false
max_retries = 3
retry_backoff_ms = 250

[cost]
commission_rate = 0.00015

[logging]
dir = "./logs"
audit_file = "audit.jsonl"
"#
    }

    #[test]
    fn parse_example_config() {
        let config: Config = toml::from_str(example_toml()).unwrap();
        assert_eq!(config.account.env, Environment::Live);
        assert_eq!(config.broker.snapshot, "accounts/paper.json");
        assert_eq!(config.planning.band_pct, 1.5);
        assert_eq!(config.planning.max_order_value, 10_000_000.0);
        assert_eq!(config.execution.order_style, OrderStyle::Limit);
        assert_eq!(config.execution.limit_offset_bps, 10);
        assert!(!config.execution.cancel_pending);
        assert_eq!(config.execution.max_retries, 3);
        assert_eq!(config.execution.retry_backoff_ms, 250);
        assert_eq!(config.cost.commission_rate, 0.00015);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str("[account]\nid = \"A1\"\n").unwrap();
        assert_eq!(config.account.env, Environment::Simulated);
        assert_eq!(config.planning.band_pct, 1.0);
        assert_eq!(config.planning.safety_margin_pct, 1.0);
        assert_eq!(config.execution.order_style, OrderStyle::Market);
        assert_eq!(config.execution.max_orders_per_run, 50);
        assert!(config.execution.cancel_pending);
        assert_eq!(config.execution.max_retries, 2);
        assert_eq!(config.execution.retry_backoff_ms, 500);
        assert_eq!(config.cost.commission_rate, 0.0015);
        assert_eq!(config.broker.snapshot, "paper.json");
    }

    #[test]
    fn missing_account_is_parse_error() {
        assert!(toml::from_str::<Config>("[planning]\nband_pct = 1.0\n").is_err());
    }

    #[test]
    fn validate_catches_empty_account() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.account.id.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_safety_margin() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.planning.safety_margin_pct = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_zero_max_orders() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.execution.max_orders_per_run = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_caps_retries() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.execution.max_retries = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_negative_commission() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.cost.commission_rate = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn plan_config_applies_override() {
        let config: Config = toml::from_str(example_toml()).unwrap();
        let plan = config.plan_config(None);
        assert_eq!(plan.band_pct, 1.5);
        assert_eq!(plan.environment, Environment::Live);
        assert_eq!(config.plan_config(Some(3.0)).band_pct, 3.0);
    }

    #[test]
    fn audit_path() {
        let config: Config = toml::from_str(example_toml()).unwrap();
        assert_eq!(config.audit_path(), PathBuf::from("./logs/audit.jsonl"));
    }
}
