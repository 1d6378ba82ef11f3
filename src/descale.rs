//! Fast descaling of a positive binary64 value into a decimal significand
//! plus exponent, used by integer-based float formatters that want to avoid
//! a `log10`/transcendental call on the hot path.
//!
//! Ported from the `descale`/`exp10` pair in the original C++ prototype
//! (`itoatest.cpp`): estimate the decimal exponent from the binary exponent
//! via `ilogb(value)/3 - 1 - sig`, scale by integer powers of ten, truncate,
//! then correct the (one-sided, always-under) estimate with a short
//! division loop.

/// Returns the binary exponent of `value`, i.e. the integer `e` such that
/// `value == m * 2^e` with `m` in `[1.0, 2.0)`. Equivalent to C's `ilogb`
/// for positive, finite, normal `value`; approximated via `log2` for the
/// subnormal range, where exactness doesn't matter because [`descale`]'s
/// correction loop absorbs the residual error.
fn ilogb(value: f64) -> i32 {
    let bits = value.to_bits();
    let raw_exponent = ((bits >> 52) & 0x7ff) as i32;
    if raw_exponent != 0 {
        raw_exponent - 1023
    } else {
        value.log2().floor() as i32
    }
}

/// Computes `10.0^exponent` using only integer-count multiplication by
/// `10.0`, never a transcendental, matching the original's `exp10` helper.
fn pow10(exponent: u32) -> f64 {
    let mut x = 1.0f64;
    for _ in 0..exponent {
        x *= 10.0;
    }
    x
}

/// Descales `value` into `(ivalue, exponent)` such that
/// `ivalue` has exactly `sig` decimal digits (`10^(sig-1) <= ivalue < 10^sig`)
/// and `value ~= ivalue * 10^exponent` within binary64 precision.
///
/// # Panics
///
/// Panics if `value` is not finite and positive, or if `sig` is not in
/// `1..=17` (binary64 carries at most 17 significant decimal digits).
pub fn descale(value: f64, sig: u32) -> (u64, i32) {
    assert!(value.is_finite() && value > 0.0, "descale requires a positive finite value");
    assert!((1..=17).contains(&sig), "sig must be in 1..=17");

    let mut exponent = ilogb(value) / 3 - 1 - sig as i32;

    // Scale one power of ten at a time rather than forming `10^exponent` as
    // a single f64 and dividing by it once: for extreme magnitudes that
    // intermediate power overflows to infinity long before the final ratio
    // would, even though the ratio itself is perfectly representable.
    let mut descaled_value = value;
    if exponent >= 0 {
        for _ in 0..exponent {
            descaled_value /= 10.0;
        }
    } else {
        for _ in 0..(-exponent) {
            descaled_value *= 10.0;
        }
    }

    let sig_power = pow10(sig) as u64;
    let lower_bound = pow10(sig - 1) as u64;
    let mut ivalue = descaled_value.trunc() as u64;
    while ivalue >= sig_power {
        ivalue /= 10;
        exponent += 1;
    }
    // The binary-to-decimal exponent estimate above is a cheap
    // approximation (ilogb/3 rather than a true log10), so its residual
    // error grows with |exponent|; at extreme magnitudes it can undershoot
    // badly enough that `descaled_value` truncates below the target digit
    // count, including to exactly zero. Re-derive `ivalue` from the
    // now-rescaled float each step rather than multiplying the (possibly
    // zero) truncated integer, so the correction converges regardless.
    while ivalue < lower_bound {
        descaled_value *= 10.0;
        ivalue = descaled_value.trunc() as u64;
        exponent -= 1;
    }

    (ivalue, exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_scenario_small_fraction() {
        assert_eq!(descale(0.0012345678, 6), (123456, -8));
    }

    #[test]
    fn seed_scenario_three_digit_integer() {
        assert_eq!(descale(123.0, 6), (123000, -3));
    }

    #[test]
    fn seed_scenario_one() {
        assert_eq!(descale(1.0, 6), (100000, -5));
    }

    #[test]
    fn invariant_holds_across_magnitudes_and_digit_counts() {
        let values = [
            1e-300, 1e-20, 1e-5, 0.000123, 0.5, 1.0, 2.0, 10.0, 123.456, 9.999_999,
            1_000_000.0, 1e20, 1e300, f64::MIN_POSITIVE, f64::MAX,
        ];
        for &value in &values {
            for sig in 1..=17u32 {
                let (ivalue, _exponent) = descale(value, sig);
                let lower = 10u64.pow(sig - 1);
                let upper = 10u64.pow(sig);
                assert!(
                    ivalue >= lower && ivalue < upper,
                    "descale({value}, {sig}) = {ivalue}, expected [{lower}, {upper})"
                );
            }
        }
    }

    #[test]
    fn reconstructs_original_magnitude() {
        let value = 314159.265;
        let (ivalue, exponent) = descale(value, 9);
        let reconstructed = (ivalue as f64) * pow10(0) * 10f64.powi(exponent);
        assert!((reconstructed - value).abs() / value < 1e-8);
    }

    #[test]
    #[should_panic]
    fn rejects_zero_significant_digits() {
        descale(1.0, 0);
    }

    #[test]
    #[should_panic]
    fn rejects_too_many_significant_digits() {
        descale(1.0, 18);
    }

    #[test]
    #[should_panic]
    fn rejects_non_positive_value() {
        descale(-1.0, 6);
    }
}
