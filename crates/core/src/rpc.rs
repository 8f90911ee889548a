//! RPC chain reader.
//!
//! Wraps an alloy [`Provider`] for the three reads the sampler needs (head
//! block number, block header timestamp, storage word at a block). Every call
//! goes through the reader's [`RetryPolicy`].

use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use tracing::debug;

use chain_price_sampler_types::ChainTip;

use crate::chain::{ChainError, ChainReader, RetryPolicy};

/// Default public RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://mainnet.base.org";

/// [`ChainReader`] backed by an alloy provider.
#[derive(Clone)]
pub struct RpcChainReader<P = DynProvider> {
    provider: P,
    retry: RetryPolicy,
}

impl RpcChainReader {
    /// Connect to an HTTP endpoint. No request is made until the first read.
    pub fn connect(url: &str, retry: RetryPolicy) -> Result<Self, ChainError> {
        let url: Url = url
            .parse()
            .map_err(|e| ChainError::Malformed(format!("bad RPC url {:?}: {}", url, e)))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self::with_provider(provider, retry))
    }
}

impl<P> RpcChainReader<P> {
    pub fn with_provider(provider: P, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

/// Undecodable responses are permanent; everything else (transport failures,
/// node error objects, null results) is worth another attempt.
fn classify(method: &str, err: TransportError) -> ChainError {
    match err {
        RpcError::SerError { .. } | RpcError::DeserError { .. } => {
            ChainError::Malformed(format!("{}: {}", method, err))
        }
        _ => ChainError::Unavailable(format!("{}: {}", method, err)),
    }
}

#[async_trait]
impl<P: Provider> ChainReader for RpcChainReader<P> {
    async fn current_block_and_timestamp(&self) -> Result<ChainTip, ChainError> {
        let block = self
            .retry
            .run("eth_blockNumber", || async move {
                self.provider
                    .get_block_number()
                    .await
                    .map_err(|e| classify("eth_blockNumber", e))
            })
            .await?;
        let timestamp = self.block_timestamp(block).await?;
        Ok(ChainTip { block, timestamp })
    }

    async fn block_timestamp(&self, block: u64) -> Result<i64, ChainError> {
        debug!("eth_getBlockByNumber {}", block);
        let header = self
            .retry
            .run("eth_getBlockByNumber", || async move {
                self.provider
                    .get_block_by_number(block.into())
                    .await
                    .map_err(|e| classify("eth_getBlockByNumber", e))
            })
            .await?
            .ok_or(ChainError::BlockNotFound(block))?;
        let timestamp = header.header.timestamp;
        i64::try_from(timestamp)
            .map_err(|_| ChainError::Malformed(format!("timestamp out of range: {}", timestamp)))
    }

    async fn read_storage_slot(
        &self,
        contract: Address,
        slot: B256,
        block: u64,
    ) -> Result<U256, ChainError> {
        debug!("eth_getStorageAt {} {} @ {}", contract, slot, block);
        let key = U256::from_be_bytes(slot.0);
        self.retry
            .run("eth_getStorageAt", || async move {
                self.provider
                    .get_storage_at(contract, key)
                    .block_id(block.into())
                    .await
                    .map_err(|e| classify("eth_getStorageAt", e))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::transports::TransportErrorKind;

    #[test]
    fn test_transport_failures_are_transient() {
        let err = classify("eth_blockNumber", TransportErrorKind::custom_str("connection reset"));
        assert!(err.is_transient());
        assert!(err.to_string().contains("eth_blockNumber"));

        let err = classify("eth_getStorageAt", RpcError::NullResp);
        assert!(err.is_transient());
    }

    #[test]
    fn test_undecodable_response_is_permanent() {
        let source = serde_json::from_str::<u64>("\"0xzz\"").unwrap_err();
        let err = classify(
            "eth_getBlockByNumber",
            RpcError::DeserError {
                err: source,
                text: "\"0xzz\"".to_string(),
            },
        );
        assert!(matches!(err, ChainError::Malformed(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_connect_keeps_retry_policy() {
        let reader = RpcChainReader::connect("http://localhost:8545", RetryPolicy::immediate(2)).unwrap();
        assert_eq!(reader.retry_policy(), RetryPolicy::immediate(2));
    }

    #[test]
    fn test_connect_rejects_bad_url() {
        let result = RpcChainReader::connect("not a url", RetryPolicy::default());
        assert!(matches!(result, Err(ChainError::Malformed(_))));
    }
}
