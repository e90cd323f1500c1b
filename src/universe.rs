//! The tradable universe: instruments with a positive price.
//!
//! Built once per planning call. Every later stage indexes prices through it,
//! so no stage divides by a missing or zero price.

use rustc_hash::FxHashMap;

use crate::types::{Code, Positions, PriceMap, TargetWeights};

/// Instruments referenced by positions or targets that have a usable price.
#[derive(Clone, Debug, Default)]
pub struct Universe {
    /// Sorted by code, so iteration order is stable across runs.
    codes: Vec<Code>,
    prices: FxHashMap<Code, f64>,
}

impl Universe {
    /// Collect every code in `positions` or `targets` whose price is `> 0`.
    pub fn new(positions: &Positions, targets: &TargetWeights, prices: &PriceMap) -> Self {
        let mut codes: Vec<Code> = positions
            .keys()
            .chain(targets.keys())
            .copied()
            .filter(|code| prices.get(code).is_some_and(|&p| p > 0.0))
            .collect();
        codes.sort();
        codes.dedup();

        let prices = codes.iter().map(|code| (*code, prices[code])).collect();
        Self { codes, prices }
    }

    /// Tradable codes in ascending code order.
    #[inline]
    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    /// Price of a tradable instrument, `None` if it is not in the universe.
    #[inline]
    pub fn price(&self, code: &Code) -> Option<f64> {
        self.prices.get(code).copied()
    }

    #[inline]
    pub fn contains(&self, code: &Code) -> bool {
        self.prices.contains_key(code)
    }

    /// `(code, price)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (Code, f64)> + '_ {
        self.codes.iter().map(|code| (*code, self.prices[code]))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Market value of `positions` restricted to tradable instruments.
    pub fn holdings_value(&self, positions: &Positions) -> f64 {
        self.iter()
            .map(|(code, price)| positions.get(&code).copied().unwrap_or(0) as f64 * price)
            .sum()
    }
}
