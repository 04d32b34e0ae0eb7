//! Strategy selection
//!
//! Maps each market stage to exactly one of three strategy variants. Every
//! variant is a pure function of its inputs, so identical (stage, levels,
//! close, config) always produce the identical signal.

use crate::config::RiskConfig;
use crate::types::{Direction, LevelSet, Pair, Signal, Stage};

/// Produce the signal for this cycle's stage.
///
/// `previous` carries the prior cycle's levels; breakout entries anchor their
/// reference to the broken level from that set rather than the current close,
/// so risk is sized off the structural level, not an extended breakout bar.
pub fn select(
    pair: &Pair,
    stage: Stage,
    levels: &LevelSet,
    previous: Option<&LevelSet>,
    close: f64,
    risk: &RiskConfig,
) -> Signal {
    match stage {
        Stage::Ranging => mean_reversion(pair, levels, close, risk.entry_tolerance),
        Stage::TrendingUp => trend_following(pair, Direction::Buy, close),
        Stage::TrendingDown => trend_following(pair, Direction::Sell, close),
        Stage::BreakoutUp => breakout(
            pair,
            Direction::Buy,
            previous.map_or(levels.resistance, |p| p.resistance),
        ),
        Stage::BreakoutDown => breakout(
            pair,
            Direction::Sell,
            previous.map_or(levels.support, |p| p.support),
        ),
    }
}

/// Ranging markets: trade the range edges, never the middle.
///
/// Support is checked before resistance, which decides the (degenerate) case
/// of a range narrower than twice the tolerance.
fn mean_reversion(pair: &Pair, levels: &LevelSet, close: f64, tolerance: f64) -> Signal {
    let (direction, reference) = if (close - levels.support).abs() <= tolerance {
        (Some(Direction::Buy), levels.support)
    } else if (close - levels.resistance).abs() <= tolerance {
        (Some(Direction::Sell), levels.resistance)
    } else {
        (None, close)
    };

    Signal {
        pair: pair.clone(),
        direction,
        reference_price: reference,
        stage: Stage::Ranging,
    }
}

/// Trending markets: follow the direction at the latest close. Whether an
/// open position already covers the direction is the broker's concern; the
/// engine does not track positions.
fn trend_following(pair: &Pair, direction: Direction, close: f64) -> Signal {
    let stage = match direction {
        Direction::Buy => Stage::TrendingUp,
        Direction::Sell => Stage::TrendingDown,
    };
    Signal {
        pair: pair.clone(),
        direction: Some(direction),
        reference_price: close,
        stage,
    }
}

/// Breakouts: enter in the breakout direction, referenced to the broken level.
fn breakout(pair: &Pair, direction: Direction, broken_level: f64) -> Signal {
    let stage = match direction {
        Direction::Buy => Stage::BreakoutUp,
        Direction::Sell => Stage::BreakoutDown,
    };
    Signal {
        pair: pair.clone(),
        direction: Some(direction),
        reference_price: broken_level,
        stage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn levels(support: f64, resistance: f64) -> LevelSet {
        LevelSet {
            support,
            resistance,
            window: 5,
            as_of: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    fn pair() -> Pair {
        Pair::new("CS.D.EURUSD.MINI.IP")
    }

    fn risk() -> RiskConfig {
        RiskConfig {
            entry_tolerance: 0.002,
            ..RiskConfig::default()
        }
    }

    #[test]
    fn test_ranging_buys_near_support() {
        let signal = select(
            &pair(),
            Stage::Ranging,
            &levels(1.09, 1.122),
            None,
            1.091,
            &risk(),
        );

        assert_eq!(signal.direction, Some(Direction::Buy));
        assert_relative_eq!(signal.reference_price, 1.09);
        assert_eq!(signal.stage, Stage::Ranging);
    }

    #[test]
    fn test_ranging_sells_near_resistance() {
        let signal = select(
            &pair(),
            Stage::Ranging,
            &levels(1.09, 1.122),
            None,
            1.121,
            &risk(),
        );

        assert_eq!(signal.direction, Some(Direction::Sell));
        assert_relative_eq!(signal.reference_price, 1.122);
    }

    #[test]
    fn test_ranging_middle_stays_flat() {
        let signal = select(
            &pair(),
            Stage::Ranging,
            &levels(1.09, 1.122),
            None,
            1.105,
            &risk(),
        );

        assert_eq!(signal.direction, None);
    }

    #[test]
    fn test_trending_up_buys_at_close() {
        let signal = select(
            &pair(),
            Stage::TrendingUp,
            &levels(1.09, 1.122),
            None,
            1.118,
            &risk(),
        );

        assert_eq!(signal.direction, Some(Direction::Buy));
        assert_relative_eq!(signal.reference_price, 1.118);
    }

    #[test]
    fn test_trending_down_sells_at_close() {
        let signal = select(
            &pair(),
            Stage::TrendingDown,
            &levels(1.09, 1.122),
            None,
            1.092,
            &risk(),
        );

        assert_eq!(signal.direction, Some(Direction::Sell));
        assert_relative_eq!(signal.reference_price, 1.092);
    }

    #[test]
    fn test_breakout_up_references_broken_resistance() {
        let prev = levels(1.09, 1.122);
        // Current window already contains the breakout bar
        let current = levels(1.09, 1.126);

        let signal = select(
            &pair(),
            Stage::BreakoutUp,
            &current,
            Some(&prev),
            1.125,
            &risk(),
        );

        assert_eq!(signal.direction, Some(Direction::Buy));
        assert_relative_eq!(signal.reference_price, 1.122);
    }

    #[test]
    fn test_breakout_down_references_broken_support() {
        let prev = levels(1.09, 1.122);
        let current = levels(1.085, 1.122);

        let signal = select(
            &pair(),
            Stage::BreakoutDown,
            &current,
            Some(&prev),
            1.087,
            &risk(),
        );

        assert_eq!(signal.direction, Some(Direction::Sell));
        assert_relative_eq!(signal.reference_price, 1.09);
    }

    #[test]
    fn test_selection_is_pure() {
        let current = levels(1.09, 1.122);
        let first = select(&pair(), Stage::Ranging, &current, None, 1.091, &risk());
        for _ in 0..10 {
            let again = select(&pair(), Stage::Ranging, &current, None, 1.091, &risk());
            assert_eq!(again, first);
        }
    }
}
