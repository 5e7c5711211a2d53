use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// An EVM network the token is deployed on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
    /// RPC endpoints, tried in health order with fallback
    pub rpc_urls: Vec<String>,
}

impl Network {
    pub fn new(name: &str, chain_id: u64, rpc_urls: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            chain_id,
            rpc_urls,
        }
    }

    pub fn ethereum() -> Self {
        Self::new("ethereum", 1, vec![
            "https://eth.drpc.org".to_string(),
            "https://ethereum.publicnode.com".to_string(),
            "https://eth.llamarpc.com".to_string(),
        ])
    }

    pub fn base() -> Self {
        Self::new("base", 8453, vec![
            "https://base.drpc.org".to_string(),
            "https://base.publicnode.com".to_string(),
            "https://mainnet.base.org".to_string(),
        ])
    }
}

/// One issuance of the tracked token on one network.
///
/// `conversion_factor` converts a raw amount of this issuance into raw
/// canonical units. The canonical issuance has a factor of 1; superseded
/// issuances carry the fixed multiplier of the migration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRepresentation {
    pub id: String,
    pub network: String,
    pub contract: Address,
    pub decimals: u8,
    #[serde(with = "decimal_u256")]
    pub conversion_factor: U256,
    /// Authoritative source of total supply. Exactly one per configuration.
    #[serde(default)]
    pub canonical: bool,
    #[serde(default = "default_contributes")]
    pub contributes_to_locked: bool,
}

fn default_contributes() -> bool {
    true
}

impl TokenRepresentation {
    pub fn canonical(id: &str, network: &str, contract: Address, decimals: u8) -> Self {
        Self {
            id: id.to_string(),
            network: network.to_string(),
            contract,
            decimals,
            conversion_factor: U256::from(1),
            canonical: true,
            contributes_to_locked: true,
        }
    }

    pub fn superseded(id: &str, network: &str, contract: Address, decimals: u8, conversion_factor: U256) -> Self {
        Self {
            id: id.to_string(),
            network: network.to_string(),
            contract,
            decimals,
            conversion_factor,
            canonical: false,
            contributes_to_locked: true,
        }
    }
}

/// An account whose holdings are excluded from circulating supply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NonCirculatingAccount {
    pub label: String,
    /// Heading the account is listed under in the treasury document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub address: Address,
}

impl NonCirculatingAccount {
    pub fn new(label: &str, address: Address) -> Self {
        Self {
            label: label.to_string(),
            group: None,
            address,
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    /// EIP-55 checksummed address
    pub fn checksummed(&self) -> String {
        self.address.to_checksum(None)
    }
}

/// A single balance read, normalized to canonical units. Lives for one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReading {
    pub account: NonCirculatingAccount,
    pub representation: String,
    pub network: String,
    pub raw_amount: U256,
    pub normalized: U256,
}

/// Serde helpers rendering `U256` as a base-10 string.
pub mod decimal_u256 {
    use alloy::primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(D::Error::custom)
    }

    /// Parse a base-10 integer, ignoring `_` digit separators.
    pub fn parse(raw: &str) -> Result<U256, String> {
        let digits: String = raw.trim().chars().filter(|c| *c != '_').collect();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("not a decimal integer: {:?}", raw));
        }
        U256::from_str_radix(&digits, 10).map_err(|e| format!("invalid integer {:?}: {}", raw, e))
    }

    pub mod option {
        use alloy::primitives::U256;
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&v.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|r| super::parse(&r).map_err(D::Error::custom)).transpose()
        }
    }
}
