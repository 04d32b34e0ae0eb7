//! Core data types used across the trading engine

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for bar data
#[derive(Debug, Error)]
pub enum BarValidationError {
    #[error("high ({high}) must be >= max(open, close) ({body_high})")]
    HighBelowBody { high: f64, body_high: f64 },

    #[error("low ({low}) must be <= min(open, close) ({body_low})")]
    LowAboveBody { low: f64, body_low: f64 },

    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// Ordering errors when assembling a price series
#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("duplicate bar timestamp {0}")]
    DuplicateTimestamp(DateTime<Utc>),

    #[error("bar timestamp {found} is not after previous bar {previous}")]
    NonChronological {
        previous: DateTime<Utc>,
        found: DateTime<Utc>,
    },

    #[error(transparent)]
    InvalidBar(#[from] BarValidationError),
}

/// A single OHLC price bar at a fixed resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// Create a new bar with validation
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Result<Self, BarValidationError> {
        let bar = Self {
            timestamp,
            open,
            high,
            low,
            close,
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Validate the bar data
    pub fn validate(&self) -> Result<(), BarValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(BarValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        let body_high = self.open.max(self.close);
        if self.high < body_high {
            return Err(BarValidationError::HighBelowBody {
                high: self.high,
                body_high,
            });
        }

        let body_low = self.open.min(self.close);
        if self.low > body_low {
            return Err(BarValidationError::LowAboveBody {
                low: self.low,
                body_low,
            });
        }

        Ok(())
    }
}

/// Currency pair identifier using Arc<str> for cheap cloning
///
/// Pairs are cloned into every signal, order, and report produced per cycle.
/// Arc<str> keeps those clones at O(1) instead of re-allocating the epic string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pair(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Pair {
    pub fn new(s: impl AsRef<str>) -> Self {
        Pair(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Account the engine trades against; selects the IG endpoint host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountMode {
    Demo,
    Live,
}

impl std::fmt::Display for AccountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountMode::Demo => write!(f, "DEMO"),
            AccountMode::Live => write!(f, "LIVE"),
        }
    }
}

/// Bar resolution for historical price requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1m")]
    Minute,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "1w")]
    Week,
}

impl Resolution {
    /// Resolution string expected by the IG prices endpoint
    pub fn as_ig(&self) -> &'static str {
        match self {
            Resolution::Minute => "MINUTE",
            Resolution::Minute5 => "MINUTE_5",
            Resolution::Minute15 => "MINUTE_15",
            Resolution::Minute30 => "MINUTE_30",
            Resolution::Hour => "HOUR",
            Resolution::Hour4 => "HOUR_4",
            Resolution::Day => "DAY",
            Resolution::Week => "WEEK",
        }
    }
}

/// Chronological OHLC bar sequence for one (pair, resolution)
#[derive(Debug, Clone)]
pub struct PriceSeries {
    pair: Pair,
    resolution: Resolution,
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(pair: Pair, resolution: Resolution) -> Self {
        Self {
            pair,
            resolution,
            bars: Vec::new(),
        }
    }

    /// Build a series from already-ordered bars, rejecting duplicates and
    /// out-of-order timestamps
    pub fn from_bars(
        pair: Pair,
        resolution: Resolution,
        bars: Vec<Bar>,
    ) -> Result<Self, SeriesError> {
        for bar in &bars {
            bar.validate()?;
        }
        for (prev, next) in bars.iter().tuple_windows() {
            if next.timestamp == prev.timestamp {
                return Err(SeriesError::DuplicateTimestamp(next.timestamp));
            }
            if next.timestamp < prev.timestamp {
                return Err(SeriesError::NonChronological {
                    previous: prev.timestamp,
                    found: next.timestamp,
                });
            }
        }
        Ok(Self {
            pair,
            resolution,
            bars,
        })
    }

    /// Append a bar, enforcing strictly increasing timestamps
    pub fn push(&mut self, bar: Bar) -> Result<(), SeriesError> {
        bar.validate()?;
        if let Some(last) = self.bars.last() {
            if bar.timestamp == last.timestamp {
                return Err(SeriesError::DuplicateTimestamp(bar.timestamp));
            }
            if bar.timestamp < last.timestamp {
                return Err(SeriesError::NonChronological {
                    previous: last.timestamp,
                    found: bar.timestamp,
                });
            }
        }
        self.bars.push(bar);
        Ok(())
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Trailing window of `n` bars, if that many exist
    pub fn tail(&self, n: usize) -> Option<&[Bar]> {
        if self.bars.len() < n {
            return None;
        }
        Some(&self.bars[self.bars.len() - n..])
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Closes of the trailing `n` bars, most recent last
    pub fn trailing_closes(&self, n: usize) -> Option<Vec<f64>> {
        self.tail(n)
            .map(|bars| bars.iter().map(|b| b.close).collect())
    }
}

/// Support/resistance snapshot derived from the trailing window of a series
///
/// Superseded each cycle, never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSet {
    pub support: f64,
    pub resistance: f64,
    pub window: usize,
    pub as_of: DateTime<Utc>,
}

/// Directional trade proposal prior to risk parameterization
///
/// `direction: None` is a deliberate stay-flat decision, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub pair: Pair,
    pub direction: Option<Direction>,
    pub reference_price: f64,
    /// Stage that armed the producing strategy
    pub stage: Stage,
}

/// Fully parameterized, submission-ready trade instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub pair: Pair,
    pub direction: Direction,
    pub size: f64,
    pub entry_reference: f64,
    pub stop_distance: f64,
    pub limit_distance: f64,
    pub account_mode: AccountMode,
}

/// Market stage for a pair at one evaluation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    TrendingUp,
    TrendingDown,
    Ranging,
    BreakoutUp,
    BreakoutDown,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::TrendingUp => write!(f, "TRENDING_UP"),
            Stage::TrendingDown => write!(f, "TRENDING_DOWN"),
            Stage::Ranging => write!(f, "RANGING"),
            Stage::BreakoutUp => write!(f, "BREAKOUT_UP"),
            Stage::BreakoutDown => write!(f, "BREAKOUT_DOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn bar(hour: u32, close: f64) -> Bar {
        Bar {
            timestamp: ts(hour),
            open: close,
            high: close + 0.001,
            low: close - 0.001,
            close,
        }
    }

    #[test]
    fn test_bar_validation_accepts_well_formed() {
        assert!(Bar::new(ts(0), 1.10, 1.12, 1.09, 1.11).is_ok());
    }

    #[test]
    fn test_bar_validation_rejects_high_below_body() {
        let err = Bar::new(ts(0), 1.10, 1.105, 1.09, 1.11).unwrap_err();
        assert!(matches!(err, BarValidationError::HighBelowBody { .. }));
    }

    #[test]
    fn test_bar_validation_rejects_low_above_body() {
        let err = Bar::new(ts(0), 1.10, 1.12, 1.105, 1.11).unwrap_err();
        assert!(matches!(err, BarValidationError::LowAboveBody { .. }));
    }

    #[test]
    fn test_bar_validation_rejects_non_positive() {
        let err = Bar::new(ts(0), -1.0, 1.12, 1.09, 1.11).unwrap_err();
        assert!(matches!(err, BarValidationError::NonPositivePrice { .. }));
    }

    #[test]
    fn test_series_rejects_duplicate_timestamp() {
        let mut series = PriceSeries::new(Pair::new("EURUSD"), Resolution::Hour);
        series.push(bar(1, 1.10)).unwrap();
        let err = series.push(bar(1, 1.11)).unwrap_err();
        assert!(matches!(err, SeriesError::DuplicateTimestamp(_)));
    }

    #[test]
    fn test_series_rejects_regressing_timestamp() {
        let mut series = PriceSeries::new(Pair::new("EURUSD"), Resolution::Hour);
        series.push(bar(2, 1.10)).unwrap();
        let err = series.push(bar(1, 1.11)).unwrap_err();
        assert!(matches!(err, SeriesError::NonChronological { .. }));
    }

    #[test]
    fn test_from_bars_checks_ordering() {
        let pair = Pair::new("EURUSD");
        let ok = PriceSeries::from_bars(
            pair.clone(),
            Resolution::Hour,
            vec![bar(1, 1.1), bar(2, 1.2)],
        );
        assert!(ok.is_ok());

        let bad = PriceSeries::from_bars(pair, Resolution::Hour, vec![bar(2, 1.1), bar(2, 1.2)]);
        assert!(matches!(bad, Err(SeriesError::DuplicateTimestamp(_))));
    }

    #[test]
    fn test_tail_and_last_close() {
        let series = PriceSeries::from_bars(
            Pair::new("EURUSD"),
            Resolution::Hour,
            vec![bar(1, 1.10), bar(2, 1.11), bar(3, 1.12)],
        )
        .unwrap();

        assert_eq!(series.last_close(), Some(1.12));
        assert_eq!(series.tail(2).unwrap().len(), 2);
        assert_eq!(series.tail(2).unwrap()[0].close, 1.11);
        assert!(series.tail(4).is_none());
    }

    #[test]
    fn test_pair_display_and_clone() {
        let pair = Pair::new("CS.D.EURUSD.MINI.IP");
        let cloned = pair.clone();
        assert_eq!(pair, cloned);
        assert_eq!(format!("{pair}"), "CS.D.EURUSD.MINI.IP");
    }

    #[test]
    fn test_direction_serde_uppercase() {
        assert_eq!(serde_json::to_string(&Direction::Buy).unwrap(), "\"BUY\"");
        let parsed: Direction = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(parsed, Direction::Sell);
    }
}
