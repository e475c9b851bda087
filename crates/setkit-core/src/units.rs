//! Fixed-point quantity helpers
//!
//! On-chain amounts are integers scaled by 10^decimals. Everything here is
//! exact integer arithmetic; division truncates toward zero.

use crate::errors::ValidationError;
use crate::types::{Quantity, U256};

/// Decimals of ether and of every Set token
pub const ETHER_DECIMALS: u32 = 18;

/// `n * 10^18`
pub fn ether(n: u64) -> Quantity {
    U256::from(n) * U256::exp10(ETHER_DECIMALS as usize)
}

/// `10^decimals`
pub fn scale(decimals: u32) -> Quantity {
    U256::exp10(decimals as usize)
}

/// Parse a decimal string ("1.5") into a quantity scaled by `10^decimals`.
pub fn parse_units(text: &str, decimals: u32) -> Result<Quantity, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidUnits {
        value: text.to_string(),
        reason: reason.to_string(),
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(invalid("empty amount"));
    }
    if text.starts_with('-') {
        return Err(invalid("negative amounts are not allowed"));
    }

    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid("non-digit characters"));
    }
    if fraction.len() > decimals as usize {
        return Err(invalid("too many fractional digits"));
    }

    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(if whole.is_empty() { "0" } else { whole });
    digits.push_str(fraction);
    for _ in fraction.len()..decimals as usize {
        digits.push('0');
    }

    U256::from_dec_str(&digits).map_err(|_| invalid("value does not fit in 256 bits"))
}

/// Render a scaled quantity as a decimal string, trimming trailing zeros.
pub fn format_units(quantity: Quantity, decimals: u32) -> String {
    let raw = quantity.to_string();
    if decimals == 0 {
        return raw;
    }

    let decimals = decimals as usize;
    let padded = if raw.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - raw.len()), raw)
    } else {
        raw
    };

    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// `a * b / c`, truncated
pub fn mul_div_floor(
    a: Quantity,
    b: Quantity,
    c: Quantity,
    operation: &'static str,
) -> Result<Quantity, ValidationError> {
    if c.is_zero() {
        return Err(ValidationError::DivisionByZero { operation });
    }
    let product = a
        .checked_mul(b)
        .ok_or(ValidationError::Overflow { operation })?;
    Ok(product / c)
}

/// `a * b`, failing on overflow
pub fn checked_mul(
    a: Quantity,
    b: Quantity,
    operation: &'static str,
) -> Result<Quantity, ValidationError> {
    a.checked_mul(b)
        .ok_or(ValidationError::Overflow { operation })
}

/// `a / b`, failing on a zero divisor
pub fn checked_div(
    a: Quantity,
    b: Quantity,
    operation: &'static str,
) -> Result<Quantity, ValidationError> {
    if b.is_zero() {
        return Err(ValidationError::DivisionByZero { operation });
    }
    Ok(a / b)
}

/// True when `quantity` is an exact multiple of `unit` (value equality on the remainder)
pub fn is_multiple_of(quantity: Quantity, unit: Quantity) -> bool {
    !unit.is_zero() && (quantity % unit).is_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ether() {
        assert_eq!(ether(2), U256::from(2_000_000_000_000_000_000u128));
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1.5", 18).unwrap(), ether(3) / 2);
        assert_eq!(parse_units("42", 0).unwrap(), U256::from(42u64));
        assert_eq!(parse_units(".25", 2).unwrap(), U256::from(25u64));
        assert_eq!(parse_units("0.000001", 6).unwrap(), U256::one());
    }

    #[test]
    fn test_parse_units_rejects_bad_input() {
        assert!(parse_units("", 18).is_err());
        assert!(parse_units("-1", 18).is_err());
        assert!(parse_units("1.2.3", 18).is_err());
        assert!(parse_units("1e18", 18).is_err());
        assert!(parse_units("0.0000001", 6).is_err());
        assert!(parse_units(".", 6).is_err());
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(ether(3) / 2, 18), "1.5");
        assert_eq!(format_units(U256::one(), 6), "0.000001");
        assert_eq!(format_units(ether(7), 18), "7");
        assert_eq!(format_units(U256::from(1234u64), 0), "1234");
        assert_eq!(format_units(U256::zero(), 18), "0");
    }

    #[test]
    fn test_mul_div_floor_truncates() {
        let r = mul_div_floor(U256::from(10u64), U256::from(10u64), U256::from(3u64), "t").unwrap();
        assert_eq!(r, U256::from(33u64));
    }

    #[test]
    fn test_mul_div_floor_errors() {
        assert!(matches!(
            mul_div_floor(U256::one(), U256::one(), U256::zero(), "t"),
            Err(ValidationError::DivisionByZero { .. })
        ));
        assert!(matches!(
            mul_div_floor(U256::MAX, U256::from(2u64), U256::one(), "t"),
            Err(ValidationError::Overflow { .. })
        ));
    }

    #[test]
    fn test_is_multiple_of_uses_value_equality() {
        let unit = ether(2);
        assert!(is_multiple_of(ether(4), unit));
        assert!(is_multiple_of(U256::zero(), unit));
        assert!(!is_multiple_of(ether(3), unit));
        assert!(!is_multiple_of(unit + 1, unit));
        assert!(!is_multiple_of(ether(4), U256::zero()));
    }
}
