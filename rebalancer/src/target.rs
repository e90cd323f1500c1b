//! Target portfolio specification (target.json) loading and validation.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use lotplan::{Code, TargetWeights};
use serde::Deserialize;

use crate::config::OrderStyle;
use crate::error::{Error, Result};

/// Slack allowed on the weight sum for decimal rounding in hand-written files.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// A target portfolio: instrument code to weight, plus per-run overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSpec {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Overrides `planning.band_pct` for this run.
    #[serde(default)]
    pub band_pct: Option<f64>,
    /// Overrides `execution.order_style` for this run.
    #[serde(default)]
    pub order_style: Option<OrderStyle>,
    pub tickers: BTreeMap<String, f64>,
}

impl TargetSpec {
    /// Load and validate a target.json file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::TargetRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: TargetSpec = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        if self.tickers.is_empty() {
            return Err(Error::Target("tickers map is empty".into()));
        }

        for (code, &weight) in &self.tickers {
            Code::try_new(code).map_err(|e| Error::Target(e.to_string()))?;
            if !(0.0..=1.0).contains(&weight) {
                return Err(Error::Target(format!(
                    "weight for {code} ({weight}) is outside [0, 1]"
                )));
            }
        }

        let sum = self.weight_sum();
        if sum > 1.0 + WEIGHT_SUM_TOLERANCE {
            return Err(Error::Target(format!("weights sum to {sum:.4} (> 1.0)")));
        }

        if let Some(band) = self.band_pct {
            if band.is_nan() || band < 0.0 {
                return Err(Error::Target(format!("band_pct must be >= 0, got {band}")));
            }
        }

        Ok(())
    }

    pub fn weight_sum(&self) -> f64 {
        self.tickers.values().sum()
    }

    /// Weight left as cash.
    pub fn cash_weight(&self) -> f64 {
        (1.0 - self.weight_sum()).max(0.0)
    }

    /// Target codes in ascending order.
    pub fn codes(&self) -> Vec<Code> {
        self.tickers
            .keys()
            .filter_map(|c| Code::try_new(c).ok())
            .collect()
    }

    /// Weights keyed by code, for the planner.
    pub fn weights(&self) -> TargetWeights {
        self.tickers
            .iter()
            .filter_map(|(c, &w)| Code::try_new(c).ok().map(|code| (code, w)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> &'static str {
        r#"{
            "timestamp": "2026-10-19T06:00:00Z",
            "band_pct": 1.0,
            "order_style": "market",
            "tickers": {
                "379810": 0.6,
                "458730": 0.25,
                "133690": 0.15
            }
        }"#
    }

    #[test]
    fn parse_valid_target() {
        let spec = TargetSpec::from_json(valid_json()).unwrap();
        assert_eq!(spec.tickers.len(), 3);
        assert_eq!(spec.tickers["379810"], 0.6);
        assert_eq!(spec.band_pct, Some(1.0));
        assert_eq!(spec.order_style, Some(OrderStyle::Market));
        assert!(spec.timestamp.is_some());
    }

    #[test]
    fn overrides_are_optional() {
        let spec = TargetSpec::from_json(r#"{"tickers": {"A": 0.5}}"#).unwrap();
        assert_eq!(spec.band_pct, None);
        assert_eq!(spec.order_style, None);
        assert!((spec.cash_weight() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn codes_are_sorted() {
        let spec = TargetSpec::from_json(valid_json()).unwrap();
        let codes: Vec<String> = spec.codes().iter().map(|c| c.to_string()).collect();
        assert_eq!(codes, vec!["133690", "379810", "458730"]);
    }

    #[test]
    fn weights_for_planner() {
        let spec = TargetSpec::from_json(valid_json()).unwrap();
        let weights = spec.weights();
        assert_eq!(weights.len(), 3);
        assert_eq!(weights[&Code::new("458730")], 0.25);
    }

    #[test]
    fn zero_weight_is_allowed() {
        // An explicit zero means "sell out of this one"
        assert!(TargetSpec::from_json(r#"{"tickers": {"A": 0.0, "B": 1.0}}"#).is_ok());
    }

    #[test]
    fn reject_empty_tickers() {
        assert!(TargetSpec::from_json(r#"{"tickers": {}}"#).is_err());
    }

    #[test]
    fn reject_long_code() {
        let json = r#"{"tickers": {"THIS-CODE-IS-TOO-LONG": 0.5}}"#;
        assert!(matches!(TargetSpec::from_json(json), Err(Error::Target(_))));
    }

    #[test]
    fn reject_negative_weight() {
        assert!(TargetSpec::from_json(r#"{"tickers": {"A": -0.2}}"#).is_err());
    }

    #[test]
    fn reject_weight_over_one() {
        assert!(TargetSpec::from_json(r#"{"tickers": {"A": 1.5}}"#).is_err());
    }

    #[test]
    fn reject_sum_over_one() {
        let json = r#"{"tickers": {"A": 0.6, "B": 0.5}}"#;
        assert!(TargetSpec::from_json(json).is_err());
    }

    #[test]
    fn sum_tolerates_decimal_rounding() {
        let json = r#"{"tickers": {"A": 0.1, "B": 0.2, "C": 0.7}}"#;
        assert!(TargetSpec::from_json(json).is_ok());
    }

    #[test]
    fn reject_negative_band() {
        let json = r#"{"band_pct": -1.0, "tickers": {"A": 0.5}}"#;
        assert!(TargetSpec::from_json(json).is_err());
    }

    #[test]
    fn reject_malformed_json() {
        assert!(matches!(
            TargetSpec::from_json("{ tickers: }"),
            Err(Error::TargetParse(_))
        ));
    }
}
