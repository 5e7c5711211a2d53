use alloy::{
    primitives::{Address, U256},
    sol,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{BalanceSource, ProviderPool, SourceError};
use crate::types::TokenRepresentation;

// ERC-20 read surface
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256 balance);
        function totalSupply() external view returns (uint256 supply);
        function decimals() external view returns (uint8 precision);
    }
}

/// Balance source backed by ERC-20 `eth_call`s over JSON-RPC
#[derive(Clone)]
pub struct RpcBalanceSource {
    pool: ProviderPool,
    read_timeout: Duration,
}

impl RpcBalanceSource {
    pub fn new(pool: ProviderPool, read_timeout: Duration) -> Self {
        Self { pool, read_timeout }
    }
}

fn classify(error: alloy::contract::Error) -> SourceError {
    match error {
        alloy::contract::Error::TransportError(e) => SourceError::Network(e.to_string()),
        other => SourceError::MalformedResponse(other.to_string()),
    }
}

#[async_trait]
impl BalanceSource for RpcBalanceSource {
    async fn read_balance(&self, account: &Address, representation: &TokenRepresentation) -> Result<U256, SourceError> {
        let contract = representation.contract;
        let owner = *account;

        let balance = self
            .pool
            .call(&representation.network, self.read_timeout, move |provider| async move {
                let token = IERC20::new(contract, provider);
                token.balanceOf(owner).call().await.map(|r| r.balance).map_err(classify)
            })
            .await?;

        debug!("{} balance of {} on {}: {}", representation.id, owner, representation.network, balance);
        Ok(balance)
    }

    async fn read_total_supply(&self, representation: &TokenRepresentation) -> Result<U256, SourceError> {
        let contract = representation.contract;

        self.pool
            .call(&representation.network, self.read_timeout, move |provider| async move {
                let token = IERC20::new(contract, provider);
                token.totalSupply().call().await.map(|r| r.supply).map_err(classify)
            })
            .await
    }

    async fn read_decimals(&self, representation: &TokenRepresentation) -> Result<u8, SourceError> {
        let contract = representation.contract;

        self.pool
            .call(&representation.network, self.read_timeout, move |provider| async move {
                let token = IERC20::new(contract, provider);
                token.decimals().call().await.map(|r| r.precision).map_err(classify)
            })
            .await
    }

    fn source_name(&self) -> &str {
        "json-rpc"
    }
}
