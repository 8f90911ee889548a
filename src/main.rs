//! Chain Price Sampler
//!
//! Samples pool prices at canonical UTC instants and keeps the series on disk.
//!
//! # Usage
//!
//! ```bash
//! SAMPLER_RPC_URL=https://mainnet.base.org cargo run
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use chain_price_sampler::{JsonFileStore, RpcChainReader, PoolPriceOracle, Sampler, SamplerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    info!("Starting Chain Price Sampler");

    let config = SamplerConfig::from_env()?;
    info!("RPC endpoint: {}", config.rpc_url);
    info!("Series file: {}", config.series_file.display());
    info!(
        "Pool manager {} (base slot {}, quote slot {})",
        config.pair.contract, config.pair.base_slot, config.pair.quote_slot
    );

    let chain = Arc::new(
        RpcChainReader::connect(&config.rpc_url, config.retry).context("invalid SAMPLER_RPC_URL")?,
    );
    let oracle = PoolPriceOracle::new(chain.clone(), config.pair.clone());
    let store = JsonFileStore::new(&config.series_file);

    let mut sampler = Sampler::new(config.settings.clone(), chain, oracle, store);
    sampler
        .start()
        .await
        .context("failed to read the current block")?;

    info!("Entering monitoring mode");
    tokio::select! {
        _ = sampler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
