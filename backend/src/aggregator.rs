use alloy::primitives::U256;
use chrono::Utc;
use futures::future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::normalizer::{normalize, NormalizeError};
use crate::registry::{RegistryError, RegistryProvider};
use crate::snapshot::{SanityViolation, Snapshot};
use crate::sources::{BalanceSource, SourceError};
use crate::types::{BalanceReading, NonCirculatingAccount, TokenRepresentation};

#[derive(Error, Debug, Clone)]
pub enum RefreshError {
    #[error("Balance read failed for {account} ({address}) on {representation}/{network}: {source}")]
    SourceRead {
        account: String,
        address: String,
        representation: String,
        network: String,
        source: SourceError,
    },
    #[error("Total supply read failed on {representation}/{network}: {source}")]
    TotalSupplyRead {
        representation: String,
        network: String,
        source: SourceError,
    },
    #[error("Decimals read failed on {representation}/{network}: {source}")]
    DecimalsRead {
        representation: String,
        network: String,
        source: SourceError,
    },
    #[error("{representation} reports {actual} decimals, configured {configured}")]
    DecimalsMismatch {
        representation: String,
        configured: u8,
        actual: u8,
    },
    #[error("Normalization failed: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("Locked supply overflowed 256 bits")]
    Overflow,
    #[error("Sanity check failed: {0}")]
    SanityCheck(#[from] SanityViolation),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Invalid representation set: {0}")]
    Configuration(String),
}

/// Reads every non-circulating balance and builds the next snapshot.
pub struct SnapshotAggregator {
    source: Arc<dyn BalanceSource>,
    registry: Arc<dyn RegistryProvider>,
    representations: Vec<TokenRepresentation>,
    canonical_index: usize,
    expected_total_supply: Option<U256>,
}

impl SnapshotAggregator {
    pub fn new(
        source: Arc<dyn BalanceSource>,
        registry: Arc<dyn RegistryProvider>,
        representations: Vec<TokenRepresentation>,
    ) -> Result<Self, RefreshError> {
        let canonical: Vec<usize> = representations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.canonical)
            .map(|(i, _)| i)
            .collect();

        let canonical_index = match canonical.as_slice() {
            [index] => *index,
            [] => return Err(RefreshError::Configuration("no canonical representation".to_string())),
            _ => {
                return Err(RefreshError::Configuration(format!(
                    "{} canonical representations, expected exactly one",
                    canonical.len()
                )))
            }
        };

        if representations[canonical_index].conversion_factor != U256::from(1u64) {
            return Err(RefreshError::Configuration(format!(
                "canonical representation {} must have a conversion factor of 1",
                representations[canonical_index].id
            )));
        }

        Ok(Self {
            source,
            registry,
            representations,
            canonical_index,
            expected_total_supply: None,
        })
    }

    /// Reject any refresh whose total supply differs from `expected`.
    pub fn with_expected_total_supply(mut self, expected: Option<U256>) -> Self {
        self.expected_total_supply = expected;
        self
    }

    pub fn canonical(&self) -> &TokenRepresentation {
        &self.representations[self.canonical_index]
    }

    /// Compute a fresh snapshot. Any failed read, overflow or sanity
    /// violation fails the whole refresh; nothing partial is returned.
    #[instrument(skip(self), fields(registry = self.registry.provider_name(), source = self.source.source_name()))]
    pub async fn refresh(&self) -> Result<Snapshot, RefreshError> {
        let accounts = self.registry.fetch().await.map_err(|e| {
            error!("Registry fetch failed: {}", e);
            e
        })?;
        if accounts.is_empty() {
            error!("Registry {} returned no accounts", self.registry.provider_name());
            return Err(RegistryError::Empty.into());
        }

        let canonical = self.canonical();
        let contributing: Vec<&TokenRepresentation> = self
            .representations
            .iter()
            .filter(|r| r.contributes_to_locked)
            .collect();

        debug!(
            "Reading {} balances ({} accounts x {} representations)",
            accounts.len() * contributing.len(),
            accounts.len(),
            contributing.len()
        );

        // Every read is independent; issue them all and wait for all outcomes
        let total_read = self.source.read_total_supply(canonical);
        let balance_reads = future::join_all(accounts.iter().flat_map(|account| {
            contributing
                .iter()
                .map(move |representation| self.read_one(account, representation))
        }));
        let (total_result, balance_results) = futures::join!(total_read, balance_reads);

        let mut readings = Vec::with_capacity(balance_results.len());
        let mut first_failure = None;
        for result in balance_results {
            match result {
                Ok(reading) => readings.push(reading),
                Err(err) => {
                    error!("{}", err);
                    first_failure.get_or_insert(err);
                }
            }
        }

        let total_supply = total_result.map_err(|source| {
            let err = RefreshError::TotalSupplyRead {
                representation: canonical.id.clone(),
                network: canonical.network.clone(),
                source,
            };
            error!("{}", err);
            err
        })?;
        if let Some(err) = first_failure {
            return Err(err);
        }

        let mut locked_supply = U256::ZERO;
        for reading in &readings {
            locked_supply = locked_supply.checked_add(reading.normalized).ok_or(RefreshError::Overflow)?;
        }

        if let Some(expected) = self.expected_total_supply {
            if total_supply != expected {
                let violation = SanityViolation::UnexpectedTotalSupply {
                    expected,
                    actual: total_supply,
                };
                error!("Discarding refresh: {}", violation);
                return Err(violation.into());
            }
        }

        let snapshot = Snapshot::from_totals(total_supply, locked_supply, accounts, Utc::now()).map_err(|violation| {
            error!("Discarding refresh: {}", violation);
            RefreshError::from(violation)
        })?;

        info!(
            "Total supply: {} | Locked: {} | Circulating: {} ({}.{:02}% of supply)",
            snapshot.total_supply(),
            snapshot.locked_supply(),
            snapshot.circulating_supply(),
            snapshot.circulating_basis_points() / 100,
            snapshot.circulating_basis_points() % 100
        );

        Ok(snapshot)
    }

    async fn read_one(
        &self,
        account: &NonCirculatingAccount,
        representation: &TokenRepresentation,
    ) -> Result<BalanceReading, RefreshError> {
        let raw_amount = self
            .source
            .read_balance(&account.address, representation)
            .await
            .map_err(|source| RefreshError::SourceRead {
                account: account.label.clone(),
                address: account.checksummed(),
                representation: representation.id.clone(),
                network: representation.network.clone(),
                source,
            })?;

        let normalized = normalize(raw_amount, representation)?;
        debug!(
            "{} on {}/{}: raw {} -> {}",
            account.label, representation.id, representation.network, raw_amount, normalized
        );

        Ok(BalanceReading {
            account: account.clone(),
            representation: representation.id.clone(),
            network: representation.network.clone(),
            raw_amount,
            normalized,
        })
    }

    /// Compare each representation's on-chain decimals with its configuration.
    pub async fn verify_representations(&self) -> Result<(), RefreshError> {
        for representation in &self.representations {
            let actual = self
                .source
                .read_decimals(representation)
                .await
                .map_err(|source| RefreshError::DecimalsRead {
                    representation: representation.id.clone(),
                    network: representation.network.clone(),
                    source,
                })?;

            if actual != representation.decimals {
                return Err(RefreshError::DecimalsMismatch {
                    representation: representation.id.clone(),
                    configured: representation.decimals,
                    actual,
                });
            }
            info!(
                "{} on {}: {} decimals, factor {}",
                representation.id, representation.network, actual, representation.conversion_factor
            );
        }
        Ok(())
    }
}
