use alloy::primitives::U256;
use thiserror::Error;

use crate::types::TokenRepresentation;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("conversion factor of {0} is zero")]
    ZeroFactor(String),
    #[error("{raw} units of {representation} overflow 256 bits when normalized")]
    Overflow { representation: String, raw: U256 },
}

/// Convert a raw amount of `representation` into raw canonical units.
///
/// Exact integer multiplication by the representation's conversion factor;
/// fails instead of wrapping.
pub fn normalize(raw_amount: U256, representation: &TokenRepresentation) -> Result<U256, NormalizeError> {
    if representation.conversion_factor.is_zero() {
        return Err(NormalizeError::ZeroFactor(representation.id.clone()));
    }
    raw_amount
        .checked_mul(representation.conversion_factor)
        .ok_or_else(|| NormalizeError::Overflow {
            representation: representation.id.clone(),
            raw: raw_amount,
        })
}
