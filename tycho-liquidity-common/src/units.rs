//! Conversion between human readable decimal amounts and a token's smallest unit.

use thiserror::Error;

use crate::U256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitsError {
    #[error("Invalid decimal amount: {0:?}")]
    InvalidAmount(String),
    #[error("Amount {amount} has more than {decimals} decimals")]
    TooManyDecimals { amount: String, decimals: u8 },
    #[error("Amount {0} does not fit into 256 bits")]
    Overflow(String),
}

fn ten_pow(exp: u8) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(exp))
}

/// Parses a decimal string such as `"0.5"` into the token's smallest unit, given its decimals.
///
/// ```
/// use tycho_liquidity_common::{units::parse_units, U256};
///
/// assert_eq!(parse_units("1000.0", 6).unwrap(), U256::from(1_000_000_000u64));
/// ```
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, UnitsError> {
    let trimmed = amount.trim();
    let (integer, fraction) = match trimmed.split_once('.') {
        Some((integer, fraction)) => (integer, fraction),
        None => (trimmed, ""),
    };

    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if integer.is_empty() || !is_digits(integer) || !is_digits(fraction) {
        return Err(UnitsError::InvalidAmount(amount.to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(UnitsError::TooManyDecimals { amount: amount.to_string(), decimals });
    }

    let overflow = || UnitsError::Overflow(amount.to_string());
    let parse = |digits: &str| -> Result<U256, UnitsError> {
        if digits.is_empty() {
            return Ok(U256::ZERO);
        }
        U256::from_str_radix(digits, 10).map_err(|_| overflow())
    };

    let scale = ten_pow(decimals).ok_or_else(overflow)?;
    // fraction.len() <= decimals, so the cast and the subtraction are in range
    let fraction_scale = ten_pow(decimals - fraction.len() as u8).ok_or_else(overflow)?;

    parse(integer)?
        .checked_mul(scale)
        .and_then(|whole| {
            parse(fraction)
                .ok()?
                .checked_mul(fraction_scale)
                .and_then(|part| whole.checked_add(part))
        })
        .ok_or_else(overflow)
}

/// Formats an amount in the smallest unit as a decimal string, e.g. `"0.5"` or `"1000.0"`.
pub fn format_units(amount: U256, decimals: u8) -> String {
    let Some(scale) = ten_pow(decimals) else {
        return amount.to_string();
    };
    let integer = amount / scale;
    let fraction = amount % scale;

    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{integer}.0")
    } else {
        format!("{integer}.{fraction}")
    }
}
