//! Synchronous input validation

use setkit_core::{parse_address, Address, ProtocolError, Quantity, Result, ValidationError};
use setkit_core::units::is_multiple_of as divides;

/// Parse and validate a hex address supplied by the caller
pub fn is_valid_address(name: &str, value: &str) -> Result<Address> {
    Ok(parse_address(name, value)?)
}

/// Fail unless `quantity` is strictly positive
pub fn is_positive_quantity(name: &str, quantity: Quantity) -> Result<()> {
    if quantity.is_zero() {
        return Err(ValidationError::InvalidQuantity {
            name: name.to_string(),
            reason: "must be greater than zero".to_string(),
        }
        .into());
    }
    Ok(())
}

pub fn is_not_empty_array<T>(name: &str, items: &[T]) -> Result<()> {
    if items.is_empty() {
        return Err(ValidationError::EmptyArray {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Fail unless two parallel arrays have the same length
pub fn same_length<A, B>(left_name: &str, left: &[A], right_name: &str, right: &[B]) -> Result<()> {
    if left.len() != right.len() {
        return Err(ValidationError::LengthMismatch {
            left: left_name.to_string(),
            left_len: left.len(),
            right: right_name.to_string(),
            right_len: right.len(),
        }
        .into());
    }
    Ok(())
}

/// Fail unless `quantity` is an exact multiple of `unit`
pub fn is_multiple_of(quantity: Quantity, unit: Quantity, unit_name: &'static str) -> Result<()> {
    if !divides(quantity, unit) {
        return Err(ProtocolError::NonMultipleQuantity {
            quantity,
            unit,
            unit_name,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use setkit_core::Error;

    #[test]
    fn test_is_valid_address() {
        let addr = is_valid_address("core", "0x1111111111111111111111111111111111111111").unwrap();
        assert_eq!(addr, Address::repeat_byte(0x11));

        let err = is_valid_address("core", "0x1234").unwrap_err();
        assert_eq!(err.error_code(), "invalid_address");
        assert!(err.to_string().contains("core"));
    }

    #[test]
    fn test_positive_quantity() {
        assert!(is_positive_quantity("quantity", Quantity::one()).is_ok());
        assert!(matches!(
            is_positive_quantity("quantity", Quantity::zero()),
            Err(Error::Validation(ValidationError::InvalidQuantity { .. }))
        ));
    }

    #[test]
    fn test_array_checks() {
        assert!(is_not_empty_array::<u8>("tokens", &[]).is_err());
        assert!(is_not_empty_array("tokens", &[1u8]).is_ok());

        let err = same_length("tokens", &[1u8, 2], "amounts", &[1u8]).unwrap_err();
        match err {
            Error::Validation(ValidationError::LengthMismatch {
                left_len, right_len, ..
            }) => {
                assert_eq!(left_len, 2);
                assert_eq!(right_len, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_multiple_check_rejects_off_by_one() {
        let unit = Quantity::from(2_000u64);
        assert!(is_multiple_of(Quantity::from(4_000u64), unit, "natural unit").is_ok());
        assert!(is_multiple_of(Quantity::zero(), unit, "natural unit").is_ok());

        let err = is_multiple_of(unit + 1, unit, "natural unit").unwrap_err();
        assert_eq!(err.error_code(), "non_multiple_quantity");
    }
}
