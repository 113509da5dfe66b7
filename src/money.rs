use std::num::NonZeroU64;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ParseBigDecimalError, RoundingMode};

/// Scale used for wallet balances and transfer amounts (cents).
pub const SCALE_CENTS: i64 = 2;
/// Scale used for interest-bearing account balances and interest amounts.
pub const SCALE_MICRO: i64 = 8;
/// Scale used for persisted annual rates.
pub const RATE_SCALE: i64 = 6;
/// Significant digits carried by [`div`].
pub const DIV_PRECISION: u64 = 20;

const DIV_PRECISION_NONZERO: NonZeroU64 = match NonZeroU64::new(DIV_PRECISION) {
	Some(p) => p,
	None => panic!("division precision must be non-zero"),
};

/// Round to a fixed scale, half-up.
///
/// All persisted monetary values pass through this before they are written,
/// so every committed amount carries its canonical scale.
pub fn round(value: &BigDecimal, scale: i64) -> BigDecimal {
	value.with_scale_round(scale, RoundingMode::HalfUp)
}

/// Divide at [`DIV_PRECISION`] significant digits, half-up.
pub fn div(numerator: &BigDecimal, denominator: &BigDecimal) -> BigDecimal {
	(numerator / denominator).with_precision_round(DIV_PRECISION_NONZERO, RoundingMode::HalfUp)
}

/// Canonical `d.ddd...` text form with exactly `scale` fractional digits.
pub fn to_fixed(value: &BigDecimal, scale: i64) -> String {
	round(value, scale).to_string()
}

pub fn parse(raw: &str) -> Result<BigDecimal, ParseBigDecimalError> {
	BigDecimal::from_str(raw)
}
