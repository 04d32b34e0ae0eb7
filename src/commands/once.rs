//! Single-cycle command

use anyhow::{Context, Result};
use tracing::info;

use fx_stages::broker::IgClient;
use fx_stages::engine::Engine;
use fx_stages::Config;

pub fn run(config_path: String) -> Result<()> {
    let config = Config::from_file(&config_path).context("Failed to load configuration")?;

    info!(
        mode = %config.broker.account_mode,
        test = config.trading.test,
        pairs = config.trading.pairs.len(),
        "running a single evaluation cycle"
    );

    let client = IgClient::connect(&config.broker, &config.trading.currency_code)
        .context("Failed to establish IG session")?;

    let mut engine = Engine::new(client, &config);
    let reports = engine.run_cycle();
    super::log_reports(&reports);

    Ok(())
}
