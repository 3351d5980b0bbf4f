//! # Token units
//!
//! Decimal-string conversion for token amounts. All arithmetic is integer
//! `U256`; amounts travel as strings at the API boundary and as atoms
//! internally.

use alloy_primitives::U256;

use crate::CodecError;

/// Parse a decimal string such as `"1.5"` into atoms at `decimals`.
///
/// Rejects empty strings, more than one point, non-digit characters and
/// fractional parts longer than `decimals`.
pub fn parse_units(amount: &str, decimals: u32) -> Result<U256, CodecError> {
    let invalid = || CodecError::InvalidAmount(amount.to_string());
    let (whole, frac) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if frac.len() as u32 > decimals {
        return Err(invalid());
    }
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !digits(whole) || !digits(frac) {
        return Err(invalid());
    }

    let scale = U256::from(10u8).pow(U256::from(decimals));
    let whole_atoms = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10)
            .map_err(|_| invalid())?
            .checked_mul(scale)
            .ok_or_else(invalid)?
    };
    let frac_atoms = if frac.is_empty() {
        U256::ZERO
    } else {
        let pad = decimals - frac.len() as u32;
        U256::from_str_radix(frac, 10).map_err(|_| invalid())?
            * U256::from(10u8).pow(U256::from(pad))
    };
    whole_atoms.checked_add(frac_atoms).ok_or_else(invalid)
}

/// Format atoms at `decimals` back into a decimal string, trimming
/// trailing zeros from the fractional part.
#[must_use]
pub fn format_units(atoms: U256, decimals: u32) -> String {
    let scale = U256::from(10u8).pow(U256::from(decimals));
    let whole = atoms / scale;
    let frac = atoms % scale;
    if frac.is_zero() {
        return whole.to_string();
    }
    let mut frac = format!("{frac:0>width$}", width = decimals as usize);
    while frac.ends_with('0') {
        frac.pop();
    }
    format!("{whole}.{frac}")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_units("1", 6).expect("parses"), U256::from(1_000_000u64));
        assert_eq!(parse_units("1.5", 6).expect("parses"), U256::from(1_500_000u64));
        assert_eq!(parse_units("0.000001", 6).expect("parses"), U256::from(1u8));
        assert_eq!(parse_units(".5", 6).expect("parses"), U256::from(500_000u64));
        assert_eq!(parse_units("2.", 6).expect("parses"), U256::from(2_000_000u64));
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert!(parse_units("", 6).is_err());
        assert!(parse_units(".", 6).is_err());
        assert!(parse_units("1.2.3", 6).is_err());
        assert!(parse_units("1,5", 6).is_err());
        assert!(parse_units("-1", 6).is_err());
        assert!(parse_units("0.1234567", 6).is_err());
    }

    #[test]
    fn formats_and_trims() {
        assert_eq!(format_units(U256::from(1_000_000u64), 6), "1");
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(1u8), 6), "0.000001");
        assert_eq!(format_units(U256::ZERO, 6), "0");
    }

    #[test]
    fn roundtrips_through_format() {
        for amount in ["1", "0.25", "123.456789", "1000000"] {
            let atoms = parse_units(amount, 6).expect("parses");
            assert_eq!(format_units(atoms, 6), amount);
        }
    }
}
