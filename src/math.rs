// src/math.rs
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::shared::errors::AmountError;

/// Largest scale a `Decimal` can carry
const MAX_DECIMAL_SCALE: u32 = 28;

/// Parse a user-entered decimal amount. Blank input is treated as an error so
/// callers decide how to present it.
pub fn parse_amount(input: &str) -> Result<Decimal, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::InvalidAmount(input.to_string()));
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| AmountError::InvalidAmount(input.to_string()))
}

fn pow10(exp: u32) -> Result<u128, AmountError> {
    10u128.checked_pow(exp).ok_or(AmountError::Overflow(exp))
}

/// Convert a human-decimal amount into integer base units, truncating any
/// precision beyond `decimals`.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u128, AmountError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::Negative(amount.to_string()));
    }
    let mantissa = amount.mantissa().unsigned_abs();
    let scale = amount.scale();

    if decimals >= scale {
        mantissa
            .checked_mul(pow10(decimals - scale)?)
            .ok_or(AmountError::Overflow(decimals))
    } else {
        Ok(mantissa / pow10(scale - decimals)?)
    }
}

/// Convert integer base units back into a human-decimal amount.
pub fn to_decimal(base: u128, decimals: u32) -> Result<Decimal, AmountError> {
    let mantissa = i128::try_from(base).map_err(|_| AmountError::Overflow(decimals))?;
    if decimals <= MAX_DECIMAL_SCALE {
        return Decimal::try_from_i128_with_scale(mantissa, decimals)
            .map(|d| d.normalize())
            .map_err(|_| AmountError::Overflow(decimals));
    }
    // Beyond 28 decimals, drop the digits Decimal cannot represent.
    let truncated = base / pow10(decimals - MAX_DECIMAL_SCALE)?;
    to_decimal(truncated, MAX_DECIMAL_SCALE)
}

fn slippage_factor(slippage: Decimal) -> Result<Decimal, AmountError> {
    if slippage.is_sign_negative() && !slippage.is_zero() {
        return Err(AmountError::InvalidSlippage(slippage.to_string()));
    }
    Ok(Decimal::ONE + slippage)
}

fn integer_decimal(amount: u128) -> Result<Decimal, AmountError> {
    let mantissa = i128::try_from(amount).map_err(|_| AmountError::Overflow(0))?;
    Decimal::try_from_i128_with_scale(mantissa, 0).map_err(|_| AmountError::Overflow(0))
}

fn floor_to_u128(value: Decimal) -> Result<u128, AmountError> {
    value.floor().to_u128().ok_or(AmountError::Overflow(0))
}

/// Most the payer authorizes: `floor(amount * (1 + slippage))`
pub fn max_in(amount: u128, slippage: Decimal) -> Result<u128, AmountError> {
    let factor = slippage_factor(slippage)?;
    let scaled = integer_decimal(amount)?
        .checked_mul(factor)
        .ok_or(AmountError::Overflow(0))?;
    floor_to_u128(scaled)
}

/// Least the receiver accepts: `floor(amount / (1 + slippage))`
pub fn min_out(amount: u128, slippage: Decimal) -> Result<u128, AmountError> {
    let factor = slippage_factor(slippage)?;
    let scaled = integer_decimal(amount)?
        .checked_div(factor)
        .ok_or(AmountError::Overflow(0))?;
    floor_to_u128(scaled)
}

/// Render an amount with exactly `dp` decimals, rounding toward zero
pub fn format_fixed_down(amount: Decimal, dp: u32) -> String {
    let rounded = amount.round_dp_with_strategy(dp, RoundingStrategy::ToZero);
    format!("{:.*}", dp as usize, rounded)
}

/// Render an amount with exactly `dp` decimals, rounding away from zero
pub fn format_fixed_up(amount: Decimal, dp: u32) -> String {
    let rounded = amount.round_dp_with_strategy(dp, RoundingStrategy::AwayFromZero);
    format!("{:.*}", dp as usize, rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units(dec!(1.5), 18).unwrap(), 1_500_000_000_000_000_000);
        assert_eq!(to_base_units(dec!(100), 6).unwrap(), 100_000_000);
        // extra precision is truncated
        assert_eq!(to_base_units(dec!(1.2345679), 6).unwrap(), 1_234_567);
        assert_eq!(to_base_units(Decimal::ZERO, 18).unwrap(), 0);
        assert!(matches!(to_base_units(dec!(-1), 6), Err(AmountError::Negative(_))));
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(to_decimal(98_000_000_000_000_000_000, 18).unwrap(), dec!(98));
        assert_eq!(to_decimal(1_234_567, 6).unwrap(), dec!(1.234567));
        assert_eq!(to_decimal(5, 0).unwrap(), dec!(5));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 12.5 ").unwrap(), dec!(12.5));
        assert!(parse_amount("").is_err());
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_max_in_min_out() {
        assert_eq!(max_in(1_000, dec!(0.01)).unwrap(), 1_010);
        assert_eq!(min_out(1_010, dec!(0.01)).unwrap(), 1_000);
        assert_eq!(min_out(1_000, dec!(0.01)).unwrap(), 990);
        assert_eq!(max_in(1_000, Decimal::ZERO).unwrap(), 1_000);
        assert!(matches!(
            max_in(1_000, dec!(-0.01)),
            Err(AmountError::InvalidSlippage(_))
        ));
    }

    #[test]
    fn test_bounds_are_conservative() {
        let slippages = [dec!(0), dec!(0.001), dec!(0.005), dec!(0.01), dec!(0.5), dec!(1)];
        let amounts: [u128; 6] = [1, 3, 5, 999, 1_000_000, 123_456_789_000_000_000_000];

        for s in slippages {
            for a in amounts {
                let round_trip_down = min_out(max_in(a, s).unwrap(), s).unwrap();
                assert!(round_trip_down <= a, "minOut(maxIn({a})) > {a} at {s}");

                // floor on both legs can lose at most one unit each
                let round_trip_up = max_in(min_out(a, s).unwrap(), s).unwrap();
                assert!(a - round_trip_up.min(a) <= 2, "maxIn(minOut({a})) too low at {s}");
            }
        }
    }

    #[test]
    fn test_bounds_preserve_order() {
        let s = dec!(0.005);
        assert!(max_in(100, s).unwrap() <= max_in(101, s).unwrap());
        assert!(min_out(100, s).unwrap() <= min_out(101, s).unwrap());
    }

    #[test]
    fn test_fixed_formatting() {
        assert_eq!(format_fixed_down(dec!(98.1234567), 6), "98.123456");
        assert_eq!(format_fixed_up(dec!(98.1234561), 6), "98.123457");
        assert_eq!(format_fixed_down(dec!(98), 6), "98.000000");
    }
}
