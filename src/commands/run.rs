//! Periodic evaluation loop
//!
//! Ticks on a fixed interval and runs one evaluation cycle per tick. Broker
//! I/O is blocking, so each cycle is moved onto the blocking thread pool;
//! ctrl-c stops the loop between cycles (a running cycle is never cancelled
//! mid-flight).

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal;
use tokio::time::interval;
use tracing::{info, warn};

use fx_stages::broker::IgClient;
use fx_stages::engine::Engine;
use fx_stages::{AccountMode, Config};

pub fn run(config_path: String, interval_secs: u64) -> Result<()> {
    let config = Config::from_file(&config_path).context("Failed to load configuration")?;

    if !config.trading.test && config.broker.account_mode == AccountMode::Live {
        warn!("LIVE TRADING MODE - REAL MONEY AT RISK!");
        warn!("Press Ctrl+C within 5 seconds to abort...");
        std::thread::sleep(Duration::from_secs(5));
    }

    // Session setup is blocking; do it before entering the runtime
    let client = IgClient::connect(&config.broker, &config.trading.currency_code)
        .context("Failed to establish IG session")?;
    info!(mode = %config.broker.account_mode, "IG session ready");

    let engine = Engine::new(client, &config);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_loop(engine, &config, interval_secs))
}

async fn run_loop(
    mut engine: Engine<IgClient>,
    config: &Config,
    interval_secs: u64,
) -> Result<()> {
    info!(
        test = config.trading.test,
        pairs = config.trading.pairs.len(),
        interval_secs,
        "entering evaluation loop"
    );

    let mut tick = interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                engine = run_cycle_blocking(engine).await?;
            }
            _ = signal::ctrl_c() => {
                info!("ctrl-c received - shutting down between cycles");
                break;
            }
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Run one cycle on the blocking pool, handing the engine back afterwards
async fn run_cycle_blocking(mut engine: Engine<IgClient>) -> Result<Engine<IgClient>> {
    let (engine, reports) = tokio::task::spawn_blocking(move || {
        let reports = engine.run_cycle();
        (engine, reports)
    })
    .await
    .context("evaluation cycle panicked")?;

    super::log_reports(&reports);
    Ok(engine)
}
