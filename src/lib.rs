//! Chain Price Sampler
//!
//! Keeps a rolling price series for a token pair by sampling pool state on
//! chain at fixed UTC instants.
//!
//! # Features
//!
//! - **Timestamp to block resolution** with a measured, per-call block rate
//! - **Canonical samples** (00:00/06:00/12:00/18:00 UTC by default) with
//!   backfill of anything missed
//! - **Live preview samples** between canonical ticks
//! - **Atomic JSON persistence** of the whole series on every change
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chain_price_sampler::{
//!     JsonFileStore, RpcChainReader, PoolPriceOracle, Sampler, SamplerConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SamplerConfig::from_env()?;
//!     let chain = Arc::new(RpcChainReader::connect(&config.rpc_url, config.retry)?);
//!     let oracle = PoolPriceOracle::new(chain.clone(), config.pair.clone());
//!     let store = JsonFileStore::new(&config.series_file);
//!
//!     let mut sampler = Sampler::new(config.settings.clone(), chain, oracle, store);
//!     sampler.start().await?;
//!     sampler.run().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod persistence;
pub mod sampler;

pub use config::SamplerConfig;
pub use persistence::{JsonFileStore, PersistenceError, SeriesPersistence};
pub use sampler::{SampleError, Sampler, SamplerSettings, TickReport};

pub use chain_price_sampler_core::{
    BlockLocator, ChainError, ChainReader, RpcChainReader, LocatorConfig, OracleError,
    PoolPair, PoolPriceOracle, PriceOracle, RetryPolicy, SeriesConfig, SeriesStore,
    TargetSchedule,
};
pub use chain_price_sampler_types::{ChainTip, Observation, Resolution, SeriesDocument};
