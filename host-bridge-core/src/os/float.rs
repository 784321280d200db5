//! Floating-point classification

/// True if `value` is any NaN, quiet or signalling
pub fn is_nan(value: f64) -> bool {
    value.is_nan()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_nan_bit_pattern() {
        assert!(is_nan(f64::from_bits(0x7ff8_0000_0000_0000)));
        assert!(is_nan(f64::from_bits(0xfff8_0000_0000_0001)));
        assert!(is_nan(f64::NAN));
    }

    #[test]
    fn test_non_nan_values() {
        for value in [0.0, -0.0, -1.0, f64::INFINITY, f64::NEG_INFINITY, f64::MIN_POSITIVE] {
            assert!(!is_nan(value), "{} reported as NaN", value);
        }
    }
}
