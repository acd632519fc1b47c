use rust_decimal::Decimal;

use crate::error::{BotError, Result};
use crate::models::LotConstraint;

/// Round a quantity down to a whole multiple of the exchange step size.
///
/// For power-of-ten steps this is the same as truncating to
/// `round(-log10(step_size))` decimals; other steps (e.g. 0.0025) are floored
/// to the nearest multiple instead of to a digit count.
pub fn normalize_quantity(quantity: Decimal, step_size: Decimal) -> Result<Decimal> {
    if step_size <= Decimal::ZERO {
        return Err(BotError::InvalidStepSize(step_size));
    }
    if quantity <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }

    let steps = quantity
        .checked_div(step_size)
        .ok_or(BotError::InvalidStepSize(step_size))?
        .floor();

    let normalized = steps
        .checked_mul(step_size)
        .ok_or(BotError::InvalidStepSize(step_size))?;

    Ok(normalized.normalize())
}

/// Number of decimal digits implied by a step size (0.001 -> 3, 1 -> 0)
pub fn step_precision(step_size: Decimal) -> u32 {
    step_size.normalize().scale()
}

/// Normalize against the full LOT_SIZE filter, rejecting dust below `min_qty`
pub fn normalize_for_lot(quantity: Decimal, lot: &LotConstraint) -> Result<Decimal> {
    let normalized = normalize_quantity(quantity, lot.step_size)?;

    if normalized <= Decimal::ZERO || normalized < lot.min_qty {
        return Err(BotError::QuantityTooSmall {
            quantity: normalized,
            min_qty: lot.min_qty,
        });
    }

    tracing::debug!(
        raw = %quantity,
        normalized = %normalized,
        step_size = %lot.step_size,
        precision = step_precision(lot.step_size),
        "Normalized order quantity"
    );

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_truncates_to_step_precision() {
        assert_eq!(normalize_quantity(dec!(0.123456), dec!(0.001)).unwrap(), dec!(0.123));
        assert_eq!(normalize_quantity(dec!(1.0), dec!(1.0)).unwrap(), dec!(1));
        assert_eq!(normalize_quantity(dec!(0.0099), dec!(0.01)).unwrap(), dec!(0));
    }

    #[test]
    fn test_rounds_down_not_nearest() {
        // Rounding to nearest would overshoot the free balance on a full sell
        assert_eq!(normalize_quantity(dec!(0.1239), dec!(0.001)).unwrap(), dec!(0.123));
        assert_eq!(normalize_quantity(dec!(7.99), dec!(1)).unwrap(), dec!(7));
    }

    #[test]
    fn test_non_power_of_ten_step() {
        assert_eq!(normalize_quantity(dec!(0.0126), dec!(0.0025)).unwrap(), dec!(0.0125));
        assert_eq!(normalize_quantity(dec!(12), dec!(5)).unwrap(), dec!(10));
    }

    #[test]
    fn test_binance_padded_step_size() {
        // exchangeInfo reports steps like "0.00100000"
        let step: Decimal = "0.00100000".parse().unwrap();
        assert_eq!(normalize_quantity(dec!(0.153846153), step).unwrap(), dec!(0.153));
        assert_eq!(step_precision(step), 3);
    }

    #[test]
    fn test_idempotent() {
        for (qty, step) in [
            (dec!(0.123456), dec!(0.001)),
            (dec!(3.14159), dec!(0.01)),
            (dec!(0.0126), dec!(0.0025)),
            (dec!(250), dec!(1)),
        ] {
            let once = normalize_quantity(qty, step).unwrap();
            let twice = normalize_quantity(once, step).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_invalid_step_size() {
        assert!(matches!(
            normalize_quantity(dec!(1.5), Decimal::ZERO),
            Err(BotError::InvalidStepSize(_))
        ));
        assert!(matches!(
            normalize_quantity(dec!(1.5), dec!(-0.01)),
            Err(BotError::InvalidStepSize(_))
        ));
    }

    #[test]
    fn test_non_positive_quantity_is_zero() {
        assert_eq!(normalize_quantity(Decimal::ZERO, dec!(0.001)).unwrap(), Decimal::ZERO);
        assert_eq!(normalize_quantity(dec!(-2), dec!(0.001)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_step_precision() {
        assert_eq!(step_precision(dec!(0.001)), 3);
        assert_eq!(step_precision(dec!(1)), 0);
        assert_eq!(step_precision(dec!(1.00000000)), 0);
        assert_eq!(step_precision(dec!(0.00001)), 5);
    }

    #[test]
    fn test_normalize_for_lot() {
        let lot = LotConstraint {
            step_size: dec!(0.0001),
            min_qty: dec!(0.0001),
        };
        assert_eq!(normalize_for_lot(dec!(0.00612345), &lot).unwrap(), dec!(0.0061));

        let result = normalize_for_lot(dec!(0.00005), &lot);
        assert!(matches!(result, Err(BotError::QuantityTooSmall { .. })));
    }

    #[test]
    fn test_normalize_for_lot_respects_min_qty() {
        let lot = LotConstraint {
            step_size: dec!(0.01),
            min_qty: dec!(0.1),
        };
        assert!(matches!(
            normalize_for_lot(dec!(0.09), &lot),
            Err(BotError::QuantityTooSmall { .. })
        ));
        assert_eq!(normalize_for_lot(dec!(0.109), &lot).unwrap(), dec!(0.1));
    }
}
