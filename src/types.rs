//! Core types: Code, and the map aliases the planner works over.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;

use crate::error::PlanError;

/// Maximum length of an instrument code in bytes.
///
/// Twelve bytes covers exchange tickers, six-digit KRX codes and ISINs.
pub const MAX_CODE_LEN: usize = 12;

/// Instrument code (ticker, KRX short code, ISIN, ...).
///
/// Stored inline so it is `Copy` and cheap to hash; only ASCII is accepted.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code {
    len: u8,
    bytes: [u8; MAX_CODE_LEN],
}

impl Code {
    /// Create a code, returning an error if it is empty, too long, or not ASCII.
    pub fn try_new(s: &str) -> Result<Self, PlanError> {
        if s.is_empty() || s.len() > MAX_CODE_LEN || !s.is_ascii() {
            return Err(PlanError::InvalidCode(s.to_string()));
        }
        let mut bytes = [0u8; MAX_CODE_LEN];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self {
            len: s.len() as u8,
            bytes,
        })
    }

    /// Create a code from a literal.
    ///
    /// # Panics
    ///
    /// Panics if `s` is not a valid code. Use [`Code::try_new`] for untrusted input.
    #[track_caller]
    pub fn new(s: &str) -> Self {
        match Self::try_new(s) {
            Ok(code) => code,
            Err(e) => panic!("{e}"),
        }
    }

    /// The code as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        // Only ASCII is ever stored.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }
}

impl Ord for Code {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for Code {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({:?})", self.as_str())
    }
}

impl FromStr for Code {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Code {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Code {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Code::try_new(&s).map_err(serde::de::Error::custom)
    }
}

/// Held quantity per instrument. Read-only input to the planner.
pub type Positions = FxHashMap<Code, i64>;

/// Current price per instrument. Missing or non-positive means untradeable.
pub type PriceMap = FxHashMap<Code, f64>;

/// Target portfolio weight per instrument, as a fraction in `[0, 1]`.
///
/// Weights need not sum to one; the remainder is held as cash.
pub type TargetWeights = FxHashMap<Code, f64>;

/// Integer target holding per instrument, as produced by the allocator.
pub type TargetQuantities = FxHashMap<Code, i64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_str() {
        let code = Code::new("379810");
        assert_eq!(code.as_str(), "379810");
        assert_eq!(format!("{code}"), "379810");
    }

    #[test]
    fn accepts_isin_length() {
        assert!(Code::try_new("KR7005930003").is_ok());
    }

    #[test]
    fn rejects_bad_codes() {
        assert!(Code::try_new("").is_err());
        assert!(Code::try_new("KR70059300031").is_err());
        assert!(Code::try_new("삼성전자").is_err());
    }

    #[test]
    #[should_panic(expected = "invalid instrument code")]
    fn new_panics_on_overflow() {
        let _ = Code::new("THIS-IS-TOO-LONG");
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Code::new("AA") < Code::new("B"));
        assert!(Code::new("069500") < Code::new("379810"));
        let mut codes = vec![Code::new("MSFT"), Code::new("AAPL"), Code::new("A")];
        codes.sort();
        assert_eq!(codes, vec![Code::new("A"), Code::new("AAPL"), Code::new("MSFT")]);
    }

    #[test]
    fn parse_from_str() {
        let code: Code = "SPY".parse().unwrap();
        assert_eq!(code, Code::new("SPY"));
        assert!("".parse::<Code>().is_err());
    }

    #[test]
    fn display_respects_width() {
        assert_eq!(format!("{:8}|", Code::new("SPY")), "SPY     |");
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", Code::new("SPY")), "Code(\"SPY\")");
    }
}
