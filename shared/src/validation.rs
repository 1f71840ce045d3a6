//! Field validators used by the request inputs

use rust_decimal::Decimal;
use validator::ValidationError;

/// Highest unit price accepted, 9,999,999.99
pub const MAX_PRICE: Decimal = Decimal::from_parts(999_999_999, 0, 0, false, 2);

/// Prices carry at most cents
pub const MAX_PRICE_SCALE: u32 = 2;

/// Most units a single stock-in or edit may set
pub const MAX_STOCK: i64 = 1_000_000_000;

/// Most units a single purchase may take. With `MAX_PRICE` this keeps every
/// sale total well inside the stored precision.
pub const MAX_QUANTITY: i64 = 1_000_000;

/// Reject strings made only of whitespace
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("Value must not be blank".into());
        return Err(error);
    }
    Ok(())
}

/// Prices are non-negative, at most `MAX_PRICE` and have at most two
/// decimal places
pub fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    let (code, message) = if price.is_sign_negative() && !price.is_zero() {
        ("negative_price", "Price cannot be negative")
    } else if *price > MAX_PRICE {
        ("price_too_large", "Price cannot exceed 9999999.99")
    } else if price.normalize().scale() > MAX_PRICE_SCALE {
        ("price_scale", "Price cannot have more than two decimal places")
    } else {
        return Ok(());
    };

    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_blank_rejected() {
        assert!(validate_not_blank("").is_err());
        assert!(validate_not_blank(" \t").is_err());
        assert!(validate_not_blank("Widget").is_ok());
    }

    #[test]
    fn test_negative_zero_price_accepted() {
        let negative_zero = Decimal::new(-0, 2);
        assert!(validate_price(&negative_zero).is_ok());
    }

    #[test]
    fn test_price_bounds() {
        assert!(validate_price(&MAX_PRICE).is_ok());
        assert!(validate_price(&(MAX_PRICE + Decimal::new(1, 2))).is_err());
        assert!(validate_price(&Decimal::MAX).is_err());
    }

    #[test]
    fn test_price_scale() {
        assert!(validate_price(&Decimal::new(999, 2)).is_ok());
        assert!(validate_price(&Decimal::new(9990, 3)).is_ok());
        let err = validate_price(&Decimal::new(9999, 3)).unwrap_err();
        assert_eq!(err.code, "price_scale");
    }

    proptest! {
        #[test]
        fn prop_price_sign(cents in -1_000_000i64..1_000_000) {
            let price = Decimal::new(cents, 2);
            prop_assert_eq!(validate_price(&price).is_ok(), cents >= 0);
        }
    }
}
