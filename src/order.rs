//! Order construction
//!
//! Turns a directional signal into a submission-ready order. Size and the
//! stop/limit distances are copied verbatim from the risk configuration; the
//! broker applies them direction-relative (stop below entry and limit above
//! for a buy, mirrored for a sell). No volatility scaling is performed.

use crate::config::RiskConfig;
use crate::types::{AccountMode, Direction, Order, Signal};

/// Build the order for a signal that decided to trade.
///
/// Taking `Direction` as its own argument makes a NONE signal unrepresentable
/// here; the orchestrator simply never calls this when the signal stayed flat.
pub fn build_order(
    signal: &Signal,
    direction: Direction,
    risk: &RiskConfig,
    account_mode: AccountMode,
) -> Order {
    Order {
        pair: signal.pair.clone(),
        direction,
        size: risk.size,
        entry_reference: signal.reference_price,
        stop_distance: risk.stop_distance,
        limit_distance: risk.limit_distance,
        account_mode,
    }
}
