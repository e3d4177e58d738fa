//! Currency rounding and scale checks.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept by storage for any amount.
pub const AMOUNT_SCALE: u32 = 2;

/// Whether `amount` is representable in storage without rounding.
pub fn fits_amount_scale(amount: Decimal) -> bool {
    amount.normalize().scale() <= AMOUNT_SCALE
}

/// Rounds an amount to whole currency units, half away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_currency(dec!(2.5)), dec!(3));
        assert_eq!(round_currency(dec!(3.5)), dec!(4));
        assert_eq!(round_currency(dec!(-2.5)), dec!(-3));
        assert_eq!(round_currency(dec!(2.49)), dec!(2));
    }

    #[test]
    fn amount_scale_ignores_trailing_zeros() {
        assert!(fits_amount_scale(dec!(110000)));
        assert!(fits_amount_scale(dec!(0.01)));
        assert!(fits_amount_scale(dec!(12.5000)));
        assert!(!fits_amount_scale(dec!(0.004)));
    }

    #[test]
    fn whole_amounts_are_unchanged() {
        assert_eq!(round_currency(dec!(5500000)), dec!(5500000));
    }
}
