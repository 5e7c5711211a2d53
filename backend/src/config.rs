use alloy::primitives::{address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::registry::{default_accounts, document::DEFAULT_MULTISIGS_URL};
use crate::types::{decimal_u256, Network, NonCirculatingAccount, TokenRepresentation};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("Failed to parse config {path}: {source}")]
    Parse { path: String, source: serde_json::Error },
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyConfig {
    pub networks: Vec<Network>,
    pub representations: Vec<TokenRepresentation>,
    pub registry: RegistryConfig,
    pub refresh_interval_secs: u64,
    pub refresh_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Refuse to publish when the canonical total supply differs from this
    #[serde(default, with = "decimal_u256::option")]
    pub expected_total_supply: Option<U256>,
    #[serde(default = "default_verify_decimals")]
    pub verify_decimals: bool,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RegistryConfig {
    Static { accounts: Vec<NonCirculatingAccount> },
    Document { url: String, timeout_secs: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Target of the `/` redirect
    pub homepage: String,
}

fn default_verify_decimals() -> bool {
    true
}

const PRODUCTION_INTERVAL_SECS: u64 = 5 * 60;
const DEVELOPMENT_INTERVAL_SECS: u64 = 10;

impl Default for SupplyConfig {
    fn default() -> Self {
        // SEND v0 (0 decimals, 100B supply) was redenominated into SEND v1
        // (18 decimals, 1B supply): 1 raw v0 unit = 10^16 raw v1 units.
        let send_v0 = address!("3f14920c99BEB920Afa163031c4e47a3e03B3e4A");
        let send_v1 = address!("Eab49138BA2Ea6dd776220fE26b7b8E446638956");
        let v0_factor = U256::from(10_000_000_000_000_000u64);

        Self {
            networks: vec![Network::ethereum(), Network::base()],
            representations: vec![
                TokenRepresentation::canonical("send-v1-base", "base", send_v1, 18),
                TokenRepresentation::superseded("send-v0-ethereum", "ethereum", send_v0, 0, v0_factor),
                TokenRepresentation::superseded("send-v0-base", "base", send_v0, 0, v0_factor),
            ],
            registry: RegistryConfig::Static {
                accounts: default_accounts(),
            },
            refresh_interval_secs: DEVELOPMENT_INTERVAL_SECS,
            refresh_timeout_secs: 60,
            read_timeout_secs: 10,
            expected_total_supply: None,
            verify_decimals: true,
            http: HttpConfig {
                host: "::".to_string(),
                port: 8080,
                homepage: "https://www.send.it/".to_string(),
            },
        }
    }
}

impl SupplyConfig {
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        info!("Loading supply configuration from: {}", path);

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config: SupplyConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;

        info!("Supply configuration loaded successfully");
        Ok(config)
    }

    /// Defaults, or `SUPPLY_CONFIG` when set, with environment overrides applied.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var("SUPPLY_CONFIG") {
            Ok(path) => Self::load_from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(node_env) = env::var("NODE_ENV") {
            self.refresh_interval_secs = if node_env == "production" {
                PRODUCTION_INTERVAL_SECS
            } else {
                DEVELOPMENT_INTERVAL_SECS
            };
        }

        if let Ok(interval) = env::var("REFRESH_INTERVAL_SECS") {
            match interval.parse::<u64>() {
                Ok(secs) => self.refresh_interval_secs = secs,
                Err(_) => warn!("Ignoring invalid REFRESH_INTERVAL_SECS: {}", interval),
            }
        }

        if let Ok(port) = env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.http.port = port,
                Err(_) => warn!("Ignoring invalid PORT: {}", port),
            }
        }

        for (var, network) in [("MAINNET_RPC_URL", "ethereum"), ("BASE_RPC_URL", "base")] {
            if let Ok(rpc_url) = env::var(var) {
                self.set_primary_rpc(network, rpc_url);
            }
        }

        if let Ok(url) = env::var("REGISTRY_URL") {
            info!("Using treasury document registry at {}", url);
            self.registry = RegistryConfig::Document { url, timeout_secs: 30 };
        }
    }

    /// Put `rpc_url` first in the endpoint list of `network`.
    pub fn set_primary_rpc(&mut self, network: &str, rpc_url: String) {
        if let Some(entry) = self.networks.iter_mut().find(|n| n.name == network) {
            entry.rpc_urls.retain(|url| url != &rpc_url);
            entry.rpc_urls.insert(0, rpc_url);
            info!("Loaded custom RPC URL for {}", network);
        }
    }

    pub fn document_registry() -> RegistryConfig {
        RegistryConfig::Document {
            url: DEFAULT_MULTISIGS_URL.to_string(),
            timeout_secs: 30,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.networks.is_empty() {
            errors.push("at least one network is required".to_string());
        }
        let mut network_names = HashSet::new();
        for network in &self.networks {
            if !network_names.insert(network.name.as_str()) {
                errors.push(format!("network {} is configured twice", network.name));
            }
            if network.rpc_urls.is_empty() {
                errors.push(format!("network {} has no RPC URLs", network.name));
            }
        }

        let canonical: Vec<&TokenRepresentation> = self.representations.iter().filter(|r| r.canonical).collect();
        match canonical.as_slice() {
            [only] if only.conversion_factor != U256::from(1u64) => {
                errors.push(format!("canonical representation {} must have conversion factor 1", only.id));
            }
            [_] => {}
            [] => errors.push("no canonical representation configured".to_string()),
            many => errors.push(format!("{} canonical representations configured, expected one", many.len())),
        }

        let mut representation_ids = HashSet::new();
        for representation in &self.representations {
            if !representation_ids.insert(representation.id.as_str()) {
                errors.push(format!("representation {} is configured twice", representation.id));
            }
            if representation.conversion_factor.is_zero() {
                errors.push(format!("representation {} has a zero conversion factor", representation.id));
            }
            if !network_names.contains(representation.network.as_str()) {
                errors.push(format!(
                    "representation {} references unknown network {}",
                    representation.id, representation.network
                ));
            }
            if representation.contract.is_zero() {
                errors.push(format!("representation {} has a zero contract address", representation.id));
            }
        }

        match &self.registry {
            RegistryConfig::Static { accounts } if accounts.is_empty() => {
                errors.push("static registry has no accounts".to_string());
            }
            RegistryConfig::Document { url, .. } if !url.starts_with("http") => {
                errors.push(format!("registry URL {} is not http(s)", url));
            }
            _ => {}
        }

        if self.refresh_interval_secs == 0 {
            errors.push("refresh interval must be positive".to_string());
        }
        if self.read_timeout_secs == 0 || self.read_timeout_secs >= self.refresh_timeout_secs {
            errors.push("read timeout must be positive and shorter than the refresh timeout".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
