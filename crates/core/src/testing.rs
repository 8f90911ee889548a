//! Synthetic chains for unit tests.

use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use chain_price_sampler_types::ChainTip;

use crate::chain::{ChainError, ChainReader};

/// Chain with a constant block time.
pub struct LinearChain {
    head: u64,
    head_timestamp: i64,
    seconds_per_block: f64,
    storage: HashMap<B256, U256>,
}

impl LinearChain {
    pub fn new(head: u64, head_timestamp: i64, seconds_per_block: f64) -> Self {
        Self {
            head,
            head_timestamp,
            seconds_per_block,
            storage: HashMap::new(),
        }
    }

    /// Store `word` under `slot` for every block and contract.
    pub fn with_slot(mut self, slot: B256, word: U256) -> Self {
        self.storage.insert(slot, word);
        self
    }

    pub fn timestamp_at(&self, block: u64) -> i64 {
        self.head_timestamp - ((self.head - block) as f64 * self.seconds_per_block).round() as i64
    }
}

#[async_trait]
impl ChainReader for LinearChain {
    async fn current_block_and_timestamp(&self) -> Result<ChainTip, ChainError> {
        Ok(ChainTip {
            block: self.head,
            timestamp: self.head_timestamp,
        })
    }

    async fn block_timestamp(&self, block: u64) -> Result<i64, ChainError> {
        if block == 0 || block > self.head {
            return Err(ChainError::BlockNotFound(block));
        }
        Ok(self.timestamp_at(block))
    }

    async fn read_storage_slot(
        &self,
        _contract: Address,
        slot: B256,
        block: u64,
    ) -> Result<U256, ChainError> {
        if block == 0 || block > self.head {
            return Err(ChainError::BlockNotFound(block));
        }
        Ok(self.storage.get(&slot).copied().unwrap_or(U256::ZERO))
    }
}

/// Chain whose last `recent_blocks` blocks run at one whole-second rate and
/// everything older at another.
pub struct SegmentedChain {
    head: u64,
    head_timestamp: i64,
    recent_blocks: u64,
    recent_spb: i64,
    older_spb: i64,
}

impl SegmentedChain {
    pub fn new(head: u64, head_timestamp: i64, recent_blocks: u64, recent_spb: i64, older_spb: i64) -> Self {
        Self {
            head,
            head_timestamp,
            recent_blocks,
            recent_spb,
            older_spb,
        }
    }

    pub fn timestamp_at(&self, block: u64) -> i64 {
        let boundary = self.head - self.recent_blocks;
        if block >= boundary {
            self.head_timestamp - (self.head - block) as i64 * self.recent_spb
        } else {
            self.head_timestamp
                - self.recent_blocks as i64 * self.recent_spb
                - (boundary - block) as i64 * self.older_spb
        }
    }
}

#[async_trait]
impl ChainReader for SegmentedChain {
    async fn current_block_and_timestamp(&self) -> Result<ChainTip, ChainError> {
        Ok(ChainTip {
            block: self.head,
            timestamp: self.head_timestamp,
        })
    }

    async fn block_timestamp(&self, block: u64) -> Result<i64, ChainError> {
        if block == 0 || block > self.head {
            return Err(ChainError::BlockNotFound(block));
        }
        Ok(self.timestamp_at(block))
    }

    async fn read_storage_slot(
        &self,
        _contract: Address,
        _slot: B256,
        _block: u64,
    ) -> Result<U256, ChainError> {
        Ok(U256::ZERO)
    }
}

/// Wraps a chain and reports `Unavailable` for a fixed set of blocks.
pub struct FlakyChain<C> {
    inner: C,
    failing: HashSet<u64>,
}

impl<C> FlakyChain<C> {
    pub fn new(inner: C, failing: Vec<u64>) -> Self {
        Self {
            inner,
            failing: failing.into_iter().collect(),
        }
    }

    fn check(&self, block: u64) -> Result<(), ChainError> {
        if self.failing.contains(&block) {
            Err(ChainError::Unavailable(format!("block {} unreachable", block)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<C: ChainReader> ChainReader for FlakyChain<C> {
    async fn current_block_and_timestamp(&self) -> Result<ChainTip, ChainError> {
        self.inner.current_block_and_timestamp().await
    }

    async fn block_timestamp(&self, block: u64) -> Result<i64, ChainError> {
        self.check(block)?;
        self.inner.block_timestamp(block).await
    }

    async fn read_storage_slot(
        &self,
        contract: Address,
        slot: B256,
        block: u64,
    ) -> Result<U256, ChainError> {
        self.check(block)?;
        self.inner.read_storage_slot(contract, slot, block).await
    }
}
