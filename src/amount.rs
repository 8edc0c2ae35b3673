//! Decimal-string monetary amounts over the wire, parsed into base units.
//!
//! Every monetary field in the x402 protocol (`amount`, `value`, `cap`,
//! `settledTotal`, `pendingSpent`) crosses JSON as a decimal string of base
//! units. Per spec, unparseable inputs saturate to zero at the verify
//! boundary rather than erroring — the caller's subsequent comparison
//! against the parsed value then fails naturally.

use alloy_primitives::U256;

/// Parses a decimal base-units string into a [`U256`], saturating to zero
/// on any parse failure (malformed string, non-digit characters, overflow).
pub fn parse_amount_saturating(raw: &str) -> U256 {
    U256::from_str_radix(raw.trim(), 10).unwrap_or(U256::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_decimal() {
        assert_eq!(parse_amount_saturating("1000000"), U256::from(1_000_000u64));
    }

    #[test]
    fn saturates_malformed_input_to_zero() {
        assert_eq!(parse_amount_saturating("not-a-number"), U256::ZERO);
        assert_eq!(parse_amount_saturating(""), U256::ZERO);
        assert_eq!(parse_amount_saturating("12.5"), U256::ZERO);
        assert_eq!(parse_amount_saturating("-5"), U256::ZERO);
    }
}
