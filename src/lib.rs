//! fx-stages
//!
//! Market-stage classification and strategy selection for forex pairs.
//! Each cycle the engine derives support/resistance levels per pair, labels
//! the market stage, arms exactly one of three mechanical strategies, and
//! either submits the resulting order through the IG REST API or logs it.

pub mod broker;
pub mod config;
pub mod engine;
pub mod indicators;
pub mod levels;
pub mod order;
pub mod stage;
pub mod strategy;
pub mod types;

pub use config::Config;
pub use types::*;
