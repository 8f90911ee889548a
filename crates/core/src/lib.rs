//! Core domain logic for the chain price sampler.
//!
//! - [`locator`]: resolves a UTC timestamp to the block closest to it
//! - [`series`]: the ordered, bounded, deduplicated observation series
//! - [`schedule`]: canonical sample instants per UTC day
//! - [`chain`] / [`rpc`]: chain access behind the [`ChainReader`] trait
//! - [`oracle`]: pool price at a block behind the [`PriceOracle`] trait

pub mod chain;
pub mod locator;
pub mod oracle;
pub mod rpc;
pub mod schedule;
pub mod series;

#[cfg(test)]
mod testing;

pub use chain::{ChainError, ChainReader, RetryPolicy};
pub use locator::{BlockLocator, LocatorConfig, DEFAULT_SECONDS_PER_BLOCK};
pub use oracle::{OracleError, PoolPair, PoolPriceOracle, PriceOracle, Slot0};
pub use rpc::{RpcChainReader, DEFAULT_RPC_URL};
pub use schedule::{ScheduleError, TargetSchedule, SECONDS_PER_DAY};
pub use series::{SeriesConfig, SeriesStore};
