//! Integer currency amounts.
//!
//! Every amount in the faucet is a count of minimal units (1 coin =
//! [`COIN`] units). Textual coin amounts, whether typed by a requester or
//! returned by the wallet as a JSON number, are parsed digit by digit so no
//! value ever passes through floating point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{COIN, COIN_DECIMALS};
use crate::error::AmountError;

/// A non-negative number of minimal currency units.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    pub const fn units(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Parse a decimal coin amount such as `"2"`, `"0.5"` or `"1.2e-05"`.
    ///
    /// Signs, more than [`COIN_DECIMALS`] fractional digits and values that
    /// do not fit in a `u64` are rejected.
    pub fn parse_coins(input: &str) -> Result<Self, AmountError> {
        parse_units(input).map(Self)
    }
}

impl fmt::Display for Amount {
    /// Formats as a coin amount with trailing zeros trimmed (`"1.5"`, `"0"`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / COIN;
        let frac = self.0 % COIN;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0width$}", width = COIN_DECIMALS);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_coins(s)
    }
}

fn parse_units(input: &str) -> Result<u64, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    if s.starts_with('-') {
        return Err(AmountError::Negative);
    }

    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(pos) => (&s[..pos], parse_exponent(&s[pos + 1..])?),
        None => (s, 0),
    };

    let (whole, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::Malformed);
    }
    if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(AmountError::Malformed);
    }

    // `digits` scaled down by 10^scale is the coin value.
    let mut digits: String = whole.chars().chain(frac.chars()).collect();
    let mut scale = frac.len() as i64 - exponent;
    while scale > 0 && digits.ends_with('0') {
        digits.pop();
        scale -= 1;
    }

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }

    let shift = COIN_DECIMALS as i64 - scale;
    if shift < 0 {
        return Err(AmountError::TooPrecise);
    }
    if digits.len() as i64 + shift > 20 {
        return Err(AmountError::Overflow);
    }

    let value: u128 = digits.parse().map_err(|_| AmountError::Overflow)?;
    let units = value
        .checked_mul(10u128.pow(shift as u32))
        .ok_or(AmountError::Overflow)?;
    u64::try_from(units).map_err(|_| AmountError::Overflow)
}

fn parse_exponent(s: &str) -> Result<i64, AmountError> {
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::Malformed);
    }
    let value: i64 = digits.parse().map_err(|_| AmountError::Malformed)?;
    Ok(if negative { -value } else { value })
}
