use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// The number of micro-USDT in one USDT. This constant defines the unit; it is not configurable.
const SCALE: i64 = 1_000_000;
/// One suffix step is one thousandth of a USDT, i.e. the third decimal place.
const SUFFIX_STEP: i64 = 1_000;

//--------------------------------------     MicroUsdt       ---------------------------------------------------------
/// An exact, integer amount of USDT, expressed in millionths (10^-6) of the unit.
///
/// All monetary storage, comparison and arithmetic in the gateway uses this type. Decimal strings exist only at the
/// edges: parsing watcher notifications and rendering amounts for display. Both conversions are exact; any input
/// that cannot be represented as a whole number of micro-USDT is rejected rather than rounded.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MicroUsdt(i64);

op!(binary MicroUsdt, Add, add);
op!(binary MicroUsdt, Sub, sub);
op!(inplace MicroUsdt, SubAssign, sub_assign);
op!(unary MicroUsdt, Neg, neg);

impl Mul<i64> for MicroUsdt {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for MicroUsdt {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in microUSDT: {0}")]
pub struct MicroUsdtConversionError(pub String);

impl From<i64> for MicroUsdt {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MicroUsdt {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MicroUsdt {}

impl TryFrom<u64> for MicroUsdt {
    type Error = MicroUsdtConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MicroUsdtConversionError(format!("Value {} is too large to convert to MicroUsdt", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for MicroUsdt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let whole = magnitude / SCALE as u64;
        let micros = magnitude % SCALE as u64;
        if micros % SUFFIX_STEP as u64 == 0 {
            write!(f, "{sign}{whole}.{:03}", micros / SUFFIX_STEP as u64)
        } else {
            write!(f, "{sign}{whole}.{micros:06}")
        }
    }
}

impl MicroUsdt {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_whole(usdt: i64) -> Self {
        Self(usdt * SCALE)
    }

    /// Parses a decimal USDT amount exactly.
    ///
    /// At most six fractional digits are accepted. Anything else (empty input, signs, exponents, a seventh decimal,
    /// non-digit characters, overflow) is an error. There is no rounding.
    pub fn from_decimal_str(s: &str) -> Result<Self, MicroUsdtConversionError> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(MicroUsdtConversionError(format!("'{s}' is not a decimal amount")));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MicroUsdtConversionError(format!("'{s}' contains non-digit characters")));
        }
        if frac.len() > 6 {
            return Err(MicroUsdtConversionError(format!(
                "'{s}' has more than 6 decimal places and cannot be represented exactly"
            )));
        }
        let whole_part = if whole.is_empty() {
            0i64
        } else {
            whole.parse::<i64>().map_err(|e| MicroUsdtConversionError(format!("'{s}' is out of range. {e}")))?
        };
        let mut micros = 0i64;
        if !frac.is_empty() {
            // Right-pad to six digits, e.g. "45" represents 450,000 microUSDT.
            micros = frac.parse::<i64>().map_err(|e| MicroUsdtConversionError(format!("'{s}' is out of range. {e}")))?;
            micros *= 10i64.pow(6 - frac.len() as u32);
        }
        whole_part
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(micros))
            .map(Self)
            .ok_or_else(|| MicroUsdtConversionError(format!("'{s}' is too large to represent in microUSDT")))
    }

    /// Combines a base price with a leased three-digit suffix into the total charge for an order.
    ///
    /// The suffix occupies the range 0.001–0.999 USDT, so `total = base + suffix × 1000 microUSDT`. Given the total
    /// and the suffix, [`MicroUsdt::decompose`] recovers the base amount with zero error.
    pub fn compose(base: MicroUsdt, suffix: u16) -> Result<MicroUsdt, MicroUsdtConversionError> {
        if !(1..=999).contains(&suffix) {
            return Err(MicroUsdtConversionError(format!("Suffix {suffix} is outside the range 1..=999")));
        }
        base.0
            .checked_add(i64::from(suffix) * SUFFIX_STEP)
            .map(Self)
            .ok_or_else(|| MicroUsdtConversionError(format!("{base} + suffix {suffix} overflows microUSDT")))
    }

    /// Recovers the base amount from a composed total. Exact for every suffix in 1..=999.
    pub fn decompose(total: MicroUsdt, suffix: u16) -> MicroUsdt {
        Self(total.0 - i64::from(suffix) * SUFFIX_STEP)
    }

    /// The full six-decimal rendering, used in canonical signature messages and logs.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        format!("{sign}{}.{:06}", magnitude / SCALE as u64, magnitude % SCALE as u64)
    }
}
