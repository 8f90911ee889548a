//! Timestamp to block resolution.
//!
//! Block time is not constant, so the locator first measures the recent
//! seconds-per-block rate over the last ~24h, jumps to the block that rate
//! predicts, then walks toward the target with secant steps until the block's
//! timestamp is within tolerance or the iteration budget is spent.

use tracing::{debug, warn};

use chain_price_sampler_types::{ChainTip, Resolution};

use crate::chain::{ChainError, ChainReader};
use crate::schedule::SECONDS_PER_DAY;

/// Rate assumed when the chain cannot be sampled.
pub const DEFAULT_SECONDS_PER_BLOCK: f64 = 2.0;

/// Default acceptable distance between a block's timestamp and the target.
pub const DEFAULT_TOLERANCE_SECS: i64 = 5 * 60;

/// Default refinement budget.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatorConfig {
    /// Acceptable residual in seconds
    pub tolerance_secs: i64,

    /// Maximum refinement steps after the initial estimate
    pub max_iterations: u32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Resolves wall-clock timestamps to block numbers.
pub struct BlockLocator<C> {
    chain: C,
    config: LocatorConfig,
}

impl<C: ChainReader> BlockLocator<C> {
    pub fn new(chain: C, config: LocatorConfig) -> Self {
        Self { chain, config }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Resolve `target` against a freshly read chain head.
    pub async fn locate(&self, target: i64) -> Result<Resolution, ChainError> {
        let tip = self.chain.current_block_and_timestamp().await?;
        self.locate_from(target, tip).await
    }

    /// Resolve `target` using `tip` as the reference point.
    ///
    /// Running out of iterations is not an error: the closest block seen is
    /// returned with `converged == false`.
    pub async fn locate_from(&self, target: i64, tip: ChainTip) -> Result<Resolution, ChainError> {
        let seconds_per_block = self.seconds_per_block(tip).await;
        let tolerance = self.config.tolerance_secs;

        let mut block = initial_estimate(target, tip, seconds_per_block);
        let mut timestamp = self.chain.block_timestamp(block).await?;
        let mut best = (block, timestamp);
        let mut iterations = 0;

        debug!(
            "Locating {}: initial estimate block {} @ {} ({:.3}s/block)",
            target, block, timestamp, seconds_per_block
        );

        while (timestamp - target).abs() > tolerance && iterations < self.config.max_iterations {
            let next = refine_step(block, timestamp, target, seconds_per_block, tip.block);
            if next == block {
                debug!("Locating {}: pinned at block {}", target, block);
                break;
            }

            block = next;
            timestamp = self.chain.block_timestamp(block).await?;
            iterations += 1;

            debug!(
                "Locating {}: step {} -> block {} @ {} (off by {}s)",
                target,
                iterations,
                block,
                timestamp,
                timestamp - target
            );

            if (timestamp - target).abs() < (best.1 - target).abs() {
                best = (block, timestamp);
            }
        }

        let residual = (best.1 - target).abs();
        Ok(Resolution {
            target,
            block: best.0,
            timestamp: best.1,
            residual,
            iterations,
            converged: residual <= tolerance,
            seconds_per_block,
        })
    }

    /// Average seconds per block over the ~24h before `tip`.
    ///
    /// Falls back to [`DEFAULT_SECONDS_PER_BLOCK`] when the reference block
    /// cannot be read or the measurement is degenerate.
    pub async fn seconds_per_block(&self, tip: ChainTip) -> f64 {
        let window_blocks = (SECONDS_PER_DAY as f64 / DEFAULT_SECONDS_PER_BLOCK).round() as u64;
        let reference = tip.block.saturating_sub(window_blocks).max(1);
        let elapsed_blocks = tip.block as i64 - reference as i64;
        if elapsed_blocks <= 0 {
            return DEFAULT_SECONDS_PER_BLOCK;
        }

        match self.chain.block_timestamp(reference).await {
            Ok(reference_ts) => {
                let rate = (tip.timestamp - reference_ts) as f64 / elapsed_blocks as f64;
                if rate.is_finite() && rate > 0.0 {
                    rate
                } else {
                    warn!(
                        "Degenerate block rate {} between blocks {} and {}, assuming {}s/block",
                        rate, reference, tip.block, DEFAULT_SECONDS_PER_BLOCK
                    );
                    DEFAULT_SECONDS_PER_BLOCK
                }
            }
            Err(e) => {
                warn!(
                    "Failed to read reference block {}: {}, assuming {}s/block",
                    reference, e, DEFAULT_SECONDS_PER_BLOCK
                );
                DEFAULT_SECONDS_PER_BLOCK
            }
        }
    }
}

/// Block the rate model predicts for `target`, clamped to `[1, tip.block]`.
fn initial_estimate(target: i64, tip: ChainTip, seconds_per_block: f64) -> u64 {
    let blocks_back = ((tip.timestamp - target) as f64 / seconds_per_block).round() as i64;
    clamp_block(tip.block as i64 - blocks_back, tip.block)
}

/// One secant step from `block` toward `target`; always moves at least one
/// block unless pinned at a bound.
fn refine_step(block: u64, timestamp: i64, target: i64, seconds_per_block: f64, head: u64) -> u64 {
    let gap = target - timestamp;
    let step = ((gap.abs() as f64 / seconds_per_block).round() as i64).max(1);
    clamp_block(block as i64 + gap.signum() * step, head)
}

fn clamp_block(block: i64, head: u64) -> u64 {
    block.clamp(1, (head as i64).max(1)) as u64
}
