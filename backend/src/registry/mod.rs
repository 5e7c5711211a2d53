pub mod document;

pub use document::DocumentRegistry;

use alloy::primitives::Address;
use async_trait::async_trait;
use std::str::FromStr;
use thiserror::Error;

use crate::types::NonCirculatingAccount;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry fetch failed: {0}")]
    Fetch(String),
    #[error("Registry parse failed: {0}")]
    Parse(String),
    #[error("Registry returned no accounts")]
    Empty,
}

/// Pull-based provider of the non-circulating account list.
#[async_trait]
pub trait RegistryProvider: Send + Sync {
    async fn fetch(&self) -> Result<Vec<NonCirculatingAccount>, RegistryError>;
    fn provider_name(&self) -> &str;
}

/// Fixed account list from configuration
#[derive(Debug, Clone)]
pub struct StaticRegistry {
    accounts: Vec<NonCirculatingAccount>,
}

impl StaticRegistry {
    pub fn new(accounts: Vec<NonCirculatingAccount>) -> Self {
        Self { accounts }
    }

    /// SEND treasury multisigs
    pub fn send_multisigs() -> Self {
        Self::new(default_accounts())
    }
}

#[async_trait]
impl RegistryProvider for StaticRegistry {
    async fn fetch(&self) -> Result<Vec<NonCirculatingAccount>, RegistryError> {
        if self.accounts.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(self.accounts.clone())
    }

    fn provider_name(&self) -> &str {
        "static"
    }
}

pub fn default_accounts() -> Vec<NonCirculatingAccount> {
    [
        ("Multisig Signer Payouts", "0x4bB2f4c771ccB60723a78a974a2537AD339071c7"),
        ("Core Team", "0xE52D0967A2eE242098d11c209f53C8158E329eCC"),
        ("Holder Distributions", "0x6204Bc0662ccd8a9A762d59fe7906733f251E3b7"),
        ("Dex n Cex Listings", "0xF530e6E60e7a65Ea717f843a8b2e6fcdC727aC9E"),
        ("Treasury", "0x5355c409fa3D0901292231Ddb953C949C2211D96"),
        ("Community Contributor Incentives", "0x4F30818f5c1a20803AB2075B813DBDE810e51b98"),
    ]
    .into_iter()
    .filter_map(|(label, address)| {
        Address::from_str(address)
            .ok()
            .map(|address| NonCirculatingAccount::new(label, address))
    })
    .collect()
}

/// Parse an account address, enforcing the EIP-55 checksum when the input is mixed case.
pub fn parse_address(raw: &str) -> Result<Address, RegistryError> {
    let hex = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    let mixed_case = hex.chars().any(|c| c.is_ascii_lowercase()) && hex.chars().any(|c| c.is_ascii_uppercase());

    let with_prefix = format!("0x{}", hex);
    let parsed = if mixed_case {
        Address::parse_checksummed(&with_prefix, None).map_err(|e| RegistryError::Parse(format!("{}: {}", raw, e)))
    } else {
        Address::from_str(&with_prefix).map_err(|e| RegistryError::Parse(format!("{}: {}", raw, e)))
    }?;

    if parsed.is_zero() {
        return Err(RegistryError::Parse(format!("{}: zero address", raw)));
    }
    Ok(parsed)
}
