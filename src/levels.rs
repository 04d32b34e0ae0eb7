//! Support/resistance extraction from the trailing window of a price series

use thiserror::Error;

use crate::types::{LevelSet, PriceSeries};

/// Errors from level extraction
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("insufficient history: have {have} bars, need {need}")]
    InsufficientHistory { have: usize, need: usize },
}

/// Compute support and resistance over the trailing `window` bars.
///
/// Support is the minimum low, resistance the maximum high. When several bars
/// share an extreme the most recent occurrence wins, and `as_of` records the
/// later of the two winning timestamps (diagnostics only, the numeric levels
/// are unaffected).
///
/// Levels are recomputed from scratch each cycle; no state is carried, so bar
/// revisions upstream are picked up automatically.
pub fn extract_levels(series: &PriceSeries, window: usize) -> Result<LevelSet, LevelError> {
    let bars = series.tail(window).ok_or(LevelError::InsufficientHistory {
        have: series.len(),
        need: window,
    })?;

    // tail(window) only returns Some for window >= 1; the config layer
    // enforces window >= 2
    let first = &bars[0];
    let mut support = first.low;
    let mut support_at = first.timestamp;
    let mut resistance = first.high;
    let mut resistance_at = first.timestamp;

    for bar in &bars[1..] {
        if bar.low <= support {
            support = bar.low;
            support_at = bar.timestamp;
        }
        if bar.high >= resistance {
            resistance = bar.high;
            resistance_at = bar.timestamp;
        }
    }

    Ok(LevelSet {
        support,
        resistance,
        window,
        as_of: support_at.max(resistance_at),
    })
}
