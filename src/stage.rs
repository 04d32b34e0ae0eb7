//! Market stage classification
//!
//! Labels each pair with exactly one stage per cycle so that exactly one
//! strategy is armed. Breakouts are judged against the *previous* cycle's
//! levels: a close beyond the prior ceiling/floor is what makes a breakout,
//! since the current window already contains the breakout bar.

use crate::indicators::close_slope;
use crate::types::{LevelSet, PriceSeries, Stage};

/// Momentum reading for the classifier: least-squares slope of the trailing
/// `lookback` closes. `None` when the series is too short for the lookback.
pub fn momentum(series: &PriceSeries, lookback: usize) -> Option<f64> {
    let closes = series.trailing_closes(lookback)?;
    close_slope(&closes, lookback)
}

/// Classify the market stage from the latest close, the current and previous
/// level sets, and a momentum reading.
///
/// Total and deterministic. Priority order:
/// 1. close above the previous resistance -> BreakoutUp
/// 2. close below the previous support -> BreakoutDown
/// 3. positive momentum, close in the upper third of the range -> TrendingUp
/// 4. negative momentum, close in the lower third -> TrendingDown
/// 5. everything else -> Ranging
///
/// A missing previous level set (first cycle for the pair) skips the breakout
/// rules; a missing momentum reading falls through to Ranging rather than
/// failing the cycle.
pub fn classify(
    close: f64,
    current: &LevelSet,
    previous: Option<&LevelSet>,
    momentum: Option<f64>,
) -> Stage {
    if let Some(prev) = previous {
        if close > prev.resistance {
            return Stage::BreakoutUp;
        }
        if close < prev.support {
            return Stage::BreakoutDown;
        }
    }

    let range = current.resistance - current.support;
    if range <= 0.0 {
        return Stage::Ranging;
    }

    let slope = match momentum {
        Some(m) => m,
        None => return Stage::Ranging,
    };

    let upper_third = current.support + 2.0 * range / 3.0;
    let lower_third = current.support + range / 3.0;

    if slope > 0.0 && close >= upper_third {
        Stage::TrendingUp
    } else if slope < 0.0 && close <= lower_third {
        Stage::TrendingDown
    } else {
        Stage::Ranging
    }
}
