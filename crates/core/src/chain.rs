//! Chain access.
//!
//! Everything the sampler needs from the chain goes through [`ChainReader`]:
//! the current head, a block's timestamp, and a raw storage word at a block.
//! Transient faults are retried by the reader according to its
//! [`RetryPolicy`] before they surface as [`ChainError::Unavailable`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use tracing::warn;

use chain_price_sampler_types::ChainTip;

/// Default number of attempts per chain call.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Errors surfaced by a [`ChainReader`].
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Node unreachable or erroring; the retry budget is spent.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("malformed node response: {0}")]
    Malformed(String),
}

impl ChainError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Unavailable(_))
    }
}

/// Read access to an append-only block chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Latest block number and its timestamp.
    async fn current_block_and_timestamp(&self) -> Result<ChainTip, ChainError>;

    /// Timestamp (Unix seconds) of `block`.
    async fn block_timestamp(&self, block: u64) -> Result<i64, ChainError>;

    /// Raw 32-byte storage word of `contract` at `slot`, as of `block`.
    async fn read_storage_slot(
        &self,
        contract: Address,
        slot: B256,
        block: u64,
    ) -> Result<U256, ChainError>;
}

#[async_trait]
impl<T: ChainReader + ?Sized> ChainReader for Arc<T> {
    async fn current_block_and_timestamp(&self) -> Result<ChainTip, ChainError> {
        (**self).current_block_and_timestamp().await
    }

    async fn block_timestamp(&self, block: u64) -> Result<i64, ChainError> {
        (**self).block_timestamp(block).await
    }

    async fn read_storage_slot(
        &self,
        contract: Address,
        slot: B256,
        block: u64,
    ) -> Result<U256, ChainError> {
        (**self).read_storage_slot(contract, slot, block).await
    }
}

#[async_trait]
impl<T: ChainReader + ?Sized> ChainReader for &T {
    async fn current_block_and_timestamp(&self) -> Result<ChainTip, ChainError> {
        (**self).current_block_and_timestamp().await
    }

    async fn block_timestamp(&self, block: u64) -> Result<i64, ChainError> {
        (**self).block_timestamp(block).await
    }

    async fn read_storage_slot(
        &self,
        contract: Address,
        slot: B256,
        block: u64,
    ) -> Result<U256, ChainError> {
        (**self).read_storage_slot(contract, slot, block).await
    }
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (at least 1 is always made)
    pub attempts: u32,

    /// Pause between failed attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Retry without sleeping between attempts.
    pub const fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the attempts run out.
    ///
    /// Only transient errors are retried. Exhaustion is reported as
    /// [`ChainError::Unavailable`] carrying the last failure.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let attempts = self.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    warn!("{} attempt {}/{} failed: {}", what, attempt, attempts, e);
                    last_error = e.to_string();
                    if attempt < attempts && !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        Err(ChainError::Unavailable(format!(
            "{} failed after {} attempts: {}",
            what, attempts, last_error
        )))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}
