//! Utility functions and helpers

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Format a decimal token amount for display in summaries
pub fn format_amount(amount: Decimal) -> String {
    amount
        .round_dp_with_strategy(6, RoundingStrategy::ToZero)
        .normalize()
        .to_string()
}

/// Whole minutes (fractional) elapsed between two instants
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0 / 60.0
}

/// Generate unique ID
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Serialize `u128` values as decimal strings, the way order-book APIs and
/// JSON consumers expect large integers.
pub mod u128_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(1.23456789)), "1.234567");
        assert_eq!(format_amount(dec!(100.000)), "100");
    }

    #[test]
    fn test_minutes_between() {
        let start = Utc::now();
        let end = start + chrono::Duration::minutes(61);
        assert!((minutes_between(start, end) - 61.0).abs() < 1e-9);
    }
}
