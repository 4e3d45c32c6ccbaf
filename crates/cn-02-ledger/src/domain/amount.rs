//! # Exact Amounts
//!
//! Parsing and arithmetic for monetary amounts. [`Decimal`] keeps at most 28
//! fractional digits in a 96-bit mantissa and silently rounds whatever does
//! not fit; everything here refuses instead. Input the type cannot hold digit
//! for digit is rejected, and a sum that would have to be rounded is an error.
//!
//! Use as a serde field attribute:
//!
//! ```ignore
//! #[serde(deserialize_with = "cn_02_ledger::amount::deserialize")]
//! amount: Decimal,
//! ```

use rust_decimal::Decimal;
use serde::de::{self, Deserializer, Visitor};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest magnitude an `f64` holds with integer precision (2^53).
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("invalid amount {0:?}")]
    Invalid(String),

    /// Well formed, but more significant digits than the decimal type keeps.
    #[error("amount {0} exceeds the supported precision")]
    Inexact(String),
}

/// Why an arithmetic result could not be produced exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("decimal overflow")]
    Overflow,

    #[error("result exceeds the supported precision")]
    Inexact,
}

/// `a + b`, refusing a result that overflows or had to be rounded.
pub fn exact_add(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    if a.is_zero() {
        return Ok(b);
    }
    if b.is_zero() {
        return Ok(a);
    }
    let sum = a.checked_add(b).ok_or(ArithmeticError::Overflow)?;
    // Addition works at the larger scale; a smaller one means the sum was
    // rescaled to fit and may have lost digits.
    if !sum.is_zero() && sum.scale() < a.scale().max(b.scale()) {
        return Err(ArithmeticError::Inexact);
    }
    Ok(sum)
}

/// `a - b` under the same rules as [`exact_add`].
pub fn exact_sub(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    exact_add(a, -b)
}

/// Parse a decimal string without rounding.
pub fn parse_exact(input: &str) -> Result<Decimal, AmountError> {
    let trimmed = input.trim();
    match Decimal::from_str_exact(trimmed) {
        Ok(amount) => Ok(amount),
        // The lenient parser accepting it means only rounding stood in the way.
        Err(_) if Decimal::from_str(trimmed).is_ok() => {
            Err(AmountError::Inexact(trimmed.to_string()))
        }
        Err(_) => Err(AmountError::Invalid(trimmed.to_string())),
    }
}

/// Deserialize a [`Decimal`] from a string or an integral JSON number.
///
/// Fractional JSON numbers are refused: by the time they reach here they have
/// already been through binary floating point.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(ExactVisitor)
}

struct ExactVisitor;

impl<'de> Visitor<'de> for ExactVisitor {
    type Value = Decimal;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string or an integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Decimal, E> {
        parse_exact(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Decimal, E> {
        Ok(Decimal::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Decimal, E> {
        Ok(Decimal::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Decimal, E> {
        if v.fract() != 0.0 || v.abs() > MAX_EXACT_FLOAT {
            return Err(E::custom(format!("amount {v} must be sent as a string")));
        }
        // Integral and within 2^53, so the conversion is exact.
        Ok(Decimal::from(v as i64))
    }
}
