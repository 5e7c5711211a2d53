use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::NonCirculatingAccount;

/// Supply invariants a snapshot must satisfy before it may be published.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanityViolation {
    #[error("total supply is zero")]
    ZeroTotalSupply,
    #[error("locked supply {locked} exceeds total supply {total}")]
    LockedExceedsTotal { total: U256, locked: U256 },
    #[error("total supply {actual} differs from expected {expected}")]
    UnexpectedTotalSupply { expected: U256, actual: U256 },
}

/// Immutable point-in-time supply figures, in canonical raw units.
///
/// Always satisfies `circulating + locked == total` and
/// `0 <= circulating <= total`; the only way to build one is
/// [`Snapshot::from_totals`], which enforces both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    total_supply: U256,
    locked_supply: U256,
    circulating_supply: U256,
    computed_at: DateTime<Utc>,
    accounts: Vec<NonCirculatingAccount>,
}

impl Snapshot {
    pub fn from_totals(
        total_supply: U256,
        locked_supply: U256,
        accounts: Vec<NonCirculatingAccount>,
        computed_at: DateTime<Utc>,
    ) -> Result<Self, SanityViolation> {
        if total_supply.is_zero() {
            return Err(SanityViolation::ZeroTotalSupply);
        }
        let circulating_supply = total_supply
            .checked_sub(locked_supply)
            .ok_or(SanityViolation::LockedExceedsTotal {
                total: total_supply,
                locked: locked_supply,
            })?;

        Ok(Self {
            total_supply,
            locked_supply,
            circulating_supply,
            computed_at,
            accounts,
        })
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn locked_supply(&self) -> U256 {
        self.locked_supply
    }

    pub fn circulating_supply(&self) -> U256 {
        self.circulating_supply
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    /// Registry entries this snapshot was computed from
    pub fn accounts(&self) -> &[NonCirculatingAccount] {
        &self.accounts
    }

    /// Share of total supply in circulation, in basis points (10000 = 100%).
    pub fn circulating_basis_points(&self) -> u64 {
        let scale = U256::from(10_000u64);
        match self.circulating_supply.checked_mul(scale) {
            Some(scaled) => (scaled / self.total_supply).to::<u64>(),
            None => (self.circulating_supply / (self.total_supply / scale)).to::<u64>(),
        }
    }

    /// True if both snapshots report the same figures, ignoring `computed_at`.
    pub fn same_figures(&self, other: &Snapshot) -> bool {
        self.total_supply == other.total_supply
            && self.locked_supply == other.locked_supply
            && self.circulating_supply == other.circulating_supply
            && self.accounts == other.accounts
    }

    /// Lossy float figures for display endpoints only.
    pub fn amounts_f64(&self) -> (f64, f64) {
        (u256_to_f64(self.total_supply), u256_to_f64(self.circulating_supply))
    }
}

fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(f64::MAX)
}
