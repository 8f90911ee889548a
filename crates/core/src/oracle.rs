//! Pool price oracle.
//!
//! Prices come from two concentrated-liquidity pools held by a single pool
//! manager contract: token/WETH (the base pool) and WETH/USD (the quote
//! pool). Each pool's `slot0` word is read straight from storage and decoded;
//! the token's USD price is the quote price divided by the base price.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use tracing::debug;

use crate::chain::{ChainError, ChainReader};

/// 2^96, the fixed-point scale of `sqrtPriceX96`.
pub const Q96: f64 = 79_228_162_514_264_337_593_543_950_336.0;

/// Default pool manager contract.
pub const DEFAULT_POOL_MANAGER: &str = "0x498581fF718922c3f8e6A244956aF099B2652b2b";

/// Default storage key of the token/WETH pool state.
pub const DEFAULT_BASE_POOL_SLOT: &str =
    "0xd66bf39be2869094cf8d2d31edffab51dc8326eadf3c7611d397d156993996da";

/// Default storage key of the WETH/USD pool state.
pub const DEFAULT_QUOTE_POOL_SLOT: &str =
    "0xe570f6e770bf85faa3d1dbee2fa168b56036a048a7939edbcd02d7ebddf3f948";

/// Default decimal scale applied to the quote pool price (18 - 6 decimals).
pub const DEFAULT_QUOTE_SCALE_DECIMALS: i32 = 12;

const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("no usable price at block {block}: {reason}")]
    DataUnavailable { block: u64, reason: String },
}

/// Source of a price at a given block.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price_at_block(&self, block: u64) -> Result<f64, OracleError>;
}

/// Decoded pool `slot0` word.
///
/// Layout (low to high bits): 160-bit `sqrtPriceX96`, 24-bit signed tick,
/// 24-bit protocol fee, 24-bit LP fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot0 {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub protocol_fee: u32,
    pub lp_fee: u32,
}

impl Slot0 {
    pub fn decode(packed: U256) -> Self {
        let sqrt_price_x96 = packed & (U256::MAX >> 96);
        let raw_tick = field24(packed, 160);
        let tick = if raw_tick & (1 << 23) != 0 {
            raw_tick as i32 - (1 << 24)
        } else {
            raw_tick as i32
        };

        Self {
            sqrt_price_x96,
            tick,
            protocol_fee: field24(packed, 184),
            lp_fee: field24(packed, 208),
        }
    }

    /// Pool price (token1 per token0, raw units): `sqrtPriceX96^2 / 2^192`.
    pub fn price(&self) -> f64 {
        let sqrt_price = u256_to_f64(self.sqrt_price_x96) / Q96;
        sqrt_price * sqrt_price
    }
}

fn field24(packed: U256, shift: usize) -> u32 {
    let field = (packed >> shift) & U256::from(0xFF_FFFFu64);
    field.as_limbs()[0] as u32
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * TWO_POW_64 + limb as f64)
}

/// Where the two pools live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPair {
    /// Contract holding both pools' state
    pub contract: Address,

    /// Storage key of the token/WETH pool
    pub base_slot: B256,

    /// Storage key of the WETH/USD pool
    pub quote_slot: B256,

    /// Decimal exponent applied to the quote pool price
    pub quote_scale_decimals: i32,
}

/// [`PriceOracle`] reading pool state through a [`ChainReader`].
pub struct PoolPriceOracle<C> {
    chain: C,
    pair: PoolPair,
}

impl<C: ChainReader> PoolPriceOracle<C> {
    pub fn new(chain: C, pair: PoolPair) -> Self {
        Self { chain, pair }
    }

    pub fn pair(&self) -> &PoolPair {
        &self.pair
    }

    async fn slot0(&self, slot: B256, block: u64) -> Result<Slot0, ChainError> {
        let packed = self
            .chain
            .read_storage_slot(self.pair.contract, slot, block)
            .await?;
        Ok(Slot0::decode(packed))
    }
}

#[async_trait]
impl<C: ChainReader> PriceOracle for PoolPriceOracle<C> {
    async fn price_at_block(&self, block: u64) -> Result<f64, OracleError> {
        let base = self.slot0(self.pair.base_slot, block).await?;
        let quote = self.slot0(self.pair.quote_slot, block).await?;

        let base_price = base.price();
        let quote_price = quote.price() * 10f64.powi(self.pair.quote_scale_decimals);
        debug!(
            "Block {}: base sqrtPriceX96 {} (tick {}), quote price {:.6}",
            block, base.sqrt_price_x96, base.tick, quote_price
        );

        if base_price == 0.0 {
            return Err(OracleError::DataUnavailable {
                block,
                reason: "base pool price is zero".into(),
            });
        }

        let price = quote_price / base_price;
        if !price.is_finite() || price < 0.0 {
            return Err(OracleError::DataUnavailable {
                block,
                reason: format!("price out of range: {}", price),
            });
        }

        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LinearChain;

    fn q96() -> U256 {
        U256::from(1u64) << 96
    }

    fn pack(sqrt_price_x96: U256, tick: i32, protocol_fee: u32, lp_fee: u32) -> U256 {
        let tick_bits = U256::from((tick as u32) & 0xFF_FFFF);
        sqrt_price_x96
            | (tick_bits << 160)
            | (U256::from(protocol_fee) << 184)
            | (U256::from(lp_fee) << 208)
    }

    fn pair() -> PoolPair {
        PoolPair {
            contract: DEFAULT_POOL_MANAGER.parse().unwrap(),
            base_slot: DEFAULT_BASE_POOL_SLOT.parse().unwrap(),
            quote_slot: DEFAULT_QUOTE_POOL_SLOT.parse().unwrap(),
            quote_scale_decimals: DEFAULT_QUOTE_SCALE_DECIMALS,
        }
    }

    #[test]
    fn test_decode_fields() {
        let slot0 = Slot0::decode(pack(q96(), -1, 0, 3000));
        assert_eq!(slot0.sqrt_price_x96, q96());
        assert_eq!(slot0.tick, -1);
        assert_eq!(slot0.protocol_fee, 0);
        assert_eq!(slot0.lp_fee, 3000);
        assert_eq!(slot0.price(), 1.0);

        let slot0 = Slot0::decode(pack(q96() * U256::from(2u64), 13_863, 5, 500));
        assert_eq!(slot0.tick, 13_863);
        assert_eq!(slot0.protocol_fee, 5);
        assert_eq!(slot0.lp_fee, 500);
        assert_eq!(slot0.price(), 4.0);
    }

    #[test]
    fn test_decode_extreme_tick() {
        assert_eq!(Slot0::decode(pack(U256::ZERO, -887_272, 0, 0)).tick, -887_272);
        assert_eq!(Slot0::decode(pack(U256::ZERO, 887_272, 0, 0)).tick, 887_272);
    }

    #[tokio::test]
    async fn test_price_is_quote_over_base() {
        let pair = pair();
        // base price 4.0, quote price 1.0 before scaling
        let chain = LinearChain::new(1000, 2000, 2.0)
            .with_slot(pair.base_slot, pack(q96() * U256::from(2u64), 0, 0, 3000))
            .with_slot(pair.quote_slot, pack(q96(), 0, 0, 500));
        let oracle = PoolPriceOracle::new(&chain, pair);

        let price = oracle.price_at_block(900).await.unwrap();
        assert!((price - 0.25e12).abs() / 0.25e12 < 1e-12);
    }

    #[tokio::test]
    async fn test_zero_base_price_is_unavailable() {
        let pair = pair();
        let chain = LinearChain::new(1000, 2000, 2.0).with_slot(pair.quote_slot, pack(q96(), 0, 0, 500));
        let oracle = PoolPriceOracle::new(&chain, pair);

        let result = oracle.price_at_block(900).await;
        assert!(matches!(result, Err(OracleError::DataUnavailable { block: 900, .. })));
    }

    #[tokio::test]
    async fn test_chain_errors_pass_through() {
        let chain = LinearChain::new(1000, 2000, 2.0);
        let oracle = PoolPriceOracle::new(&chain, pair());

        let result = oracle.price_at_block(5000).await;
        assert!(matches!(result, Err(OracleError::Chain(ChainError::BlockNotFound(5000)))));
    }
}
