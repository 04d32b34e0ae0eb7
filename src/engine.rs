//! Evaluation-cycle orchestration
//!
//! Drives the per-pair pipeline: fetch -> levels -> stage -> signal -> order.
//! Pairs are independent, so one cycle evaluates them in parallel; the only
//! state carried between cycles is the per-pair map of the previous cycle's
//! levels, which breakout detection needs. The map is read during the
//! parallel phase and updated sequentially afterwards, so cycle N+1 always
//! observes cycle N's write for the same pair.

use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::broker::{Broker, DealRef};
use crate::config::Config;
use crate::levels::{extract_levels, LevelError};
use crate::order::build_order;
use crate::types::{AccountMode, LevelSet, Order, Pair, Resolution, Stage};
use crate::{stage, strategy};

/// Why a pair's evaluation stopped before producing a decision
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Fewer bars than the level window requires; retried next cycle
    InsufficientHistory { have: usize, need: usize },
    /// Broker unreachable or request rejected; retried next cycle, never
    /// within the cycle
    Fetch(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InsufficientHistory { have, need } => {
                write!(f, "insufficient history ({have} bars, need {need})")
            }
            SkipReason::Fetch(reason) => write!(f, "fetch failed: {reason}"),
        }
    }
}

/// Terminal state of one pair in one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Order accepted by the broker
    Submitted { order: Order, deal_ref: DealRef },
    /// Order rejected by the broker; logged, never resubmitted this cycle
    Rejected { order: Order, reason: String },
    /// Test mode: order routed to the log sink instead of the broker
    Logged(Order),
    /// Strategy decided to stay flat; a normal non-error outcome
    Idle(Stage),
    /// Evaluation stopped in fetching or leveling
    Skipped(SkipReason),
}

/// One pair's result for the cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PairReport {
    pub pair: Pair,
    pub outcome: CycleOutcome,
}

/// The stage/strategy orchestrator for a set of pairs
pub struct Engine<B: Broker> {
    broker: B,
    pairs: Vec<Pair>,
    resolution: Resolution,
    test: bool,
    account_mode: AccountMode,
    risk: crate::config::RiskConfig,
    previous_levels: HashMap<Pair, LevelSet>,
}

impl<B: Broker> Engine<B> {
    pub fn new(broker: B, config: &Config) -> Self {
        Engine {
            broker,
            pairs: config.trading.pairs(),
            resolution: config.trading.resolution,
            test: config.trading.test,
            account_mode: config.broker.account_mode,
            risk: config.risk.clone(),
            previous_levels: HashMap::new(),
        }
    }

    /// Previous-cycle levels for a pair, if that pair has completed leveling
    pub fn previous_levels(&self, pair: &Pair) -> Option<&LevelSet> {
        self.previous_levels.get(pair)
    }

    /// The injected broker, mainly for test inspection
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Run one full evaluation cycle across all configured pairs.
    ///
    /// Failures are isolated: a pair that cannot be fetched or leveled is
    /// reported as skipped and the remaining pairs are unaffected.
    pub fn run_cycle(&mut self) -> Vec<PairReport> {
        let previous = &self.previous_levels;
        let results: Vec<(PairReport, Option<LevelSet>)> = self
            .pairs
            .par_iter()
            .map(|pair| {
                let (outcome, levels) = self.evaluate_pair(pair, previous.get(pair));
                (
                    PairReport {
                        pair: pair.clone(),
                        outcome,
                    },
                    levels,
                )
            })
            .collect();

        let mut reports = Vec::with_capacity(results.len());
        for (report, levels) in results {
            if let Some(levels) = levels {
                self.previous_levels.insert(report.pair.clone(), levels);
            }
            reports.push(report);
        }
        reports
    }

    /// FETCHING -> LEVELING -> CLASSIFYING -> SELECTING -> (ORDERING | IDLE)
    ///
    /// Returns the outcome plus the freshly extracted levels; the caller
    /// commits the levels into the per-pair map after the parallel phase.
    fn evaluate_pair(
        &self,
        pair: &Pair,
        previous: Option<&LevelSet>,
    ) -> (CycleOutcome, Option<LevelSet>) {
        let series = match self
            .broker
            .fetch_series(pair, self.resolution, self.risk.min_bars())
        {
            Ok(series) => series,
            Err(e) => {
                warn!(%pair, "skipping pair: {e}");
                return (CycleOutcome::Skipped(SkipReason::Fetch(e.to_string())), None);
            }
        };

        let levels = match extract_levels(&series, self.risk.window) {
            Ok(levels) => levels,
            Err(LevelError::InsufficientHistory { have, need }) => {
                warn!(%pair, have, need, "skipping pair: insufficient history");
                return (
                    CycleOutcome::Skipped(SkipReason::InsufficientHistory { have, need }),
                    None,
                );
            }
        };

        // A successful leveling guarantees at least `window >= 2` bars
        let close = match series.last_close() {
            Some(close) => close,
            None => {
                return (
                    CycleOutcome::Skipped(SkipReason::InsufficientHistory {
                        have: 0,
                        need: self.risk.window,
                    }),
                    None,
                )
            }
        };

        let momentum = stage::momentum(&series, self.risk.momentum_lookback);
        let market_stage = stage::classify(close, &levels, previous, momentum);
        info!(
            %pair,
            stage = %market_stage,
            close,
            support = levels.support,
            resistance = levels.resistance,
            "pair classified"
        );

        let signal = strategy::select(pair, market_stage, &levels, previous, close, &self.risk);

        let outcome = match signal.direction {
            None => {
                info!(%pair, stage = %market_stage, "no trade this cycle");
                CycleOutcome::Idle(market_stage)
            }
            Some(direction) => {
                let order = build_order(&signal, direction, &self.risk, self.account_mode);
                self.dispatch(order)
            }
        };

        (outcome, Some(levels))
    }

    /// ORDERING: route to the log sink in test mode, the broker otherwise
    fn dispatch(&self, order: Order) -> CycleOutcome {
        if self.test {
            info!(
                pair = %order.pair,
                direction = %order.direction,
                size = order.size,
                entry_reference = order.entry_reference,
                stop_distance = order.stop_distance,
                limit_distance = order.limit_distance,
                "[TEST] order logged, not submitted"
            );
            return CycleOutcome::Logged(order);
        }

        match self.broker.submit_order(&order) {
            Ok(deal_ref) => {
                info!(pair = %order.pair, %deal_ref, direction = %order.direction, "order submitted");
                CycleOutcome::Submitted { order, deal_ref }
            }
            Err(e) => {
                error!(pair = %order.pair, "order rejected: {e}");
                CycleOutcome::Rejected {
                    order,
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerError;
    use crate::config::{BrokerConfig, RiskConfig, TradingConfig};
    use crate::types::{Bar, Direction, PriceSeries};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    // Wide enough that the flat close sits outside the mean-reversion
    // tolerance of either edge
    fn flat_bars(count: usize, price: f64) -> Vec<Bar> {
        (0..count)
            .map(|i| Bar {
                timestamp: ts(i as u32),
                open: price,
                high: price + 0.005,
                low: price - 0.005,
                close: price,
            })
            .collect()
    }

    /// Deterministic broker: canned series per pair, recorded submissions
    struct FakeBroker {
        series: HashMap<Pair, Vec<Bar>>,
        submitted: Mutex<Vec<Order>>,
        reject_submits: bool,
    }

    impl FakeBroker {
        fn new(series: HashMap<Pair, Vec<Bar>>) -> Self {
            FakeBroker {
                series,
                submitted: Mutex::new(Vec::new()),
                reject_submits: false,
            }
        }
    }

    impl Broker for FakeBroker {
        fn fetch_series(
            &self,
            pair: &Pair,
            resolution: Resolution,
            _min_bars: usize,
        ) -> Result<PriceSeries, BrokerError> {
            let bars = self
                .series
                .get(pair)
                .cloned()
                .ok_or_else(|| BrokerError::Fetch(format!("no data for {pair}")))?;
            PriceSeries::from_bars(pair.clone(), resolution, bars)
                .map_err(|e| BrokerError::Fetch(e.to_string()))
        }

        fn submit_order(&self, order: &Order) -> Result<DealRef, BrokerError> {
            if self.reject_submits {
                return Err(BrokerError::Submit("rejected by fake".into()));
            }
            self.submitted.lock().unwrap().push(order.clone());
            Ok(DealRef(format!("DEAL-{}", order.pair)))
        }
    }

    fn config(pairs: &[&str], test: bool) -> Config {
        Config {
            broker: BrokerConfig::default(),
            trading: TradingConfig {
                pairs: pairs.iter().map(|s| s.to_string()).collect(),
                resolution: Resolution::Hour,
                test,
                currency_code: "USD".to_string(),
            },
            risk: RiskConfig {
                window: 5,
                momentum_lookback: 3,
                ..RiskConfig::default()
            },
        }
    }

    #[test]
    fn test_short_history_skips_pair_without_failing_cycle() {
        let pair_short = Pair::new("SHORT");
        let pair_ok = Pair::new("OK");
        let mut series = HashMap::new();
        series.insert(pair_short.clone(), flat_bars(3, 1.10));
        series.insert(pair_ok.clone(), flat_bars(10, 1.10));

        let mut engine = Engine::new(FakeBroker::new(series), &config(&["SHORT", "OK"], true));
        let reports = engine.run_cycle();

        assert_eq!(reports.len(), 2);
        let short = reports.iter().find(|r| r.pair == pair_short).unwrap();
        assert!(matches!(
            short.outcome,
            CycleOutcome::Skipped(SkipReason::InsufficientHistory { have: 3, need: 5 })
        ));

        // The healthy pair still completed its pipeline
        let ok = reports.iter().find(|r| r.pair == pair_ok).unwrap();
        assert!(matches!(ok.outcome, CycleOutcome::Idle(_)));
        assert!(engine.previous_levels(&pair_ok).is_some());
        assert!(engine.previous_levels(&pair_short).is_none());
    }

    #[test]
    fn test_fetch_failure_is_isolated() {
        let pair_ok = Pair::new("OK");
        let mut series = HashMap::new();
        series.insert(pair_ok.clone(), flat_bars(10, 1.10));

        let mut engine = Engine::new(FakeBroker::new(series), &config(&["MISSING", "OK"], true));
        let reports = engine.run_cycle();

        let missing = reports.iter().find(|r| r.pair == Pair::new("MISSING")).unwrap();
        assert!(matches!(
            missing.outcome,
            CycleOutcome::Skipped(SkipReason::Fetch(_))
        ));
        let ok = reports.iter().find(|r| r.pair == pair_ok).unwrap();
        assert!(!matches!(ok.outcome, CycleOutcome::Skipped(_)));
    }

    #[test]
    fn test_breakout_order_logged_in_test_mode() {
        let pair = Pair::new("EURUSD");
        // Cycle 1 establishes levels around 1.10; cycle 2 closes above them
        let mut bars = flat_bars(10, 1.10);
        let mut series = HashMap::new();
        series.insert(pair.clone(), bars.clone());

        let cfg = config(&["EURUSD"], true);
        let broker = FakeBroker::new(series);
        let mut engine = Engine::new(broker, &cfg);
        engine.run_cycle();
        let prior_resistance = engine.previous_levels(&pair).unwrap().resistance;

        bars.push(Bar {
            timestamp: ts(10),
            open: 1.101,
            high: 1.14,
            low: 1.10,
            close: 1.13,
        });
        engine.broker.series.insert(pair.clone(), bars);

        let reports = engine.run_cycle();
        match &reports[0].outcome {
            CycleOutcome::Logged(order) => {
                assert_eq!(order.direction, Direction::Buy);
                assert!((order.entry_reference - prior_resistance).abs() < 1e-9);
                assert!((order.size - cfg.risk.size).abs() < 1e-9);
            }
            other => panic!("expected logged breakout order, got {other:?}"),
        }
        // Test mode must never reach the broker
        assert!(engine.broker.submitted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_live_mode_submits_and_rejection_is_terminal() {
        let pair = Pair::new("EURUSD");
        let mut bars = flat_bars(10, 1.10);
        bars.push(Bar {
            timestamp: ts(10),
            open: 1.101,
            high: 1.14,
            low: 1.10,
            close: 1.13,
        });

        let mut series = HashMap::new();
        series.insert(pair.clone(), flat_bars(10, 1.10));
        let mut engine = Engine::new(FakeBroker::new(series), &config(&["EURUSD"], false));
        engine.run_cycle();

        engine.broker.series.insert(pair.clone(), bars.clone());
        let reports = engine.run_cycle();
        assert!(matches!(
            reports[0].outcome,
            CycleOutcome::Submitted { .. }
        ));
        assert_eq!(engine.broker.submitted.lock().unwrap().len(), 1);

        // Same setup but the broker rejects: logged as rejected, no retry
        let mut series = HashMap::new();
        series.insert(pair.clone(), flat_bars(10, 1.10));
        let mut broker = FakeBroker::new(series);
        broker.reject_submits = true;
        let mut engine = Engine::new(broker, &config(&["EURUSD"], false));
        engine.run_cycle();
        engine.broker.series.insert(pair.clone(), bars);
        let reports = engine.run_cycle();
        assert!(matches!(reports[0].outcome, CycleOutcome::Rejected { .. }));
        assert!(engine.broker.submitted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_previous_levels_updated_each_cycle() {
        let pair = Pair::new("EURUSD");
        let mut series = HashMap::new();
        series.insert(pair.clone(), flat_bars(10, 1.10));

        let mut engine = Engine::new(FakeBroker::new(series), &config(&["EURUSD"], true));
        engine.run_cycle();
        let first = *engine.previous_levels(&pair).unwrap();

        // Shift the whole series; the stored levels must follow
        let shifted = flat_bars(10, 1.20);
        engine.broker.series.insert(pair.clone(), shifted);
        engine.run_cycle();
        let second = *engine.previous_levels(&pair).unwrap();

        assert!(second.support > first.support);
        assert!(second.resistance > first.resistance);
    }
}
