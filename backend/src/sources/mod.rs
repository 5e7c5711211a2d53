// Chain balance sources
pub mod provider_pool;
pub mod rpc_source;

pub use provider_pool::ProviderPool;
pub use rpc_source::RpcBalanceSource;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::TokenRepresentation;

#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("Network request failed: {0}")]
    Network(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Request to {network} timed out after {after:?}")]
    Timeout { network: String, after: Duration },
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
    #[error("Chain id mismatch on {network}: expected {expected}, got {actual}")]
    ChainIdMismatch { network: String, expected: u64, actual: u64 },
}

/// Reads token amounts for a representation on its network.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn read_balance(&self, account: &Address, representation: &TokenRepresentation) -> Result<U256, SourceError>;
    async fn read_total_supply(&self, representation: &TokenRepresentation) -> Result<U256, SourceError>;
    async fn read_decimals(&self, representation: &TokenRepresentation) -> Result<u8, SourceError>;
    fn source_name(&self) -> &str;
}
