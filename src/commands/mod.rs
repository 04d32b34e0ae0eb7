//! CLI command implementations

pub mod once;
pub mod run;

use tracing::info;

use fx_stages::engine::{CycleOutcome, PairReport};

/// One-line summary per pair after a cycle completes
pub(crate) fn log_reports(reports: &[PairReport]) {
    let mut acted = 0usize;
    let mut skipped = 0usize;

    for report in reports {
        match &report.outcome {
            CycleOutcome::Submitted { order, deal_ref } => {
                acted += 1;
                info!(
                    pair = %report.pair,
                    "cycle result: {} {} @ {} submitted (deal {deal_ref})",
                    order.direction, order.size, order.entry_reference
                );
            }
            CycleOutcome::Logged(order) => {
                acted += 1;
                info!(
                    pair = %report.pair,
                    "cycle result: {} {} @ {} logged (test mode)",
                    order.direction, order.size, order.entry_reference
                );
            }
            CycleOutcome::Rejected { order, reason } => {
                info!(
                    pair = %report.pair,
                    "cycle result: {} order rejected: {reason}",
                    order.direction
                );
            }
            CycleOutcome::Idle(stage) => {
                info!(pair = %report.pair, "cycle result: flat ({stage})");
            }
            CycleOutcome::Skipped(reason) => {
                skipped += 1;
                info!(pair = %report.pair, "cycle result: skipped ({reason})");
            }
        }
    }

    info!(
        pairs = reports.len(),
        acted, skipped, "evaluation cycle complete"
    );
}
