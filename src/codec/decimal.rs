// Exact base-10 numbers for dBASE numeric columns
//
// Numeric columns hold fixed-place decimal text, so values are carried as a
// coefficient plus a scale instead of an f64. Rounding is always
// round-half-away-from-zero.

use std::fmt;
use std::str::FromStr;

use crate::internal::error::{Error, Result};

// Exponents beyond this are rejected rather than expanded into digits
const MAX_EXPONENT: i64 = 1024;

/// A decimal number `(-1)^negative * coefficient * 10^-scale`.
///
/// Trailing zeros are significant for rendering (`"1.50"` keeps two places)
/// but not for equality.
#[derive(Debug, Clone)]
pub struct Decimal {
    negative: bool,
    digits: Vec<u8>, // coefficient, most significant first, no leading zeros
    scale: u32,
}

impl Decimal {
    fn from_parts(negative: bool, mut digits: Vec<u8>, scale: u32) -> Self {
        let leading = digits.iter().take_while(|d| **d == 0).count();
        digits.drain(..leading);
        Decimal {
            negative: negative && !digits.is_empty(),
            digits,
            scale,
        }
    }

    /// Builds a decimal from an integer.
    pub fn from_i64(value: i64) -> Self {
        let digits = value
            .unsigned_abs()
            .to_string()
            .bytes()
            .map(|b| b - b'0')
            .collect();
        Decimal::from_parts(value < 0, digits, 0)
    }

    /// Builds a decimal from the shortest text that round-trips `value`.
    /// Returns `None` for NaN and infinities.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        // f64's Display never uses exponent notation
        format!("{}", value).parse().ok()
    }

    /// Number of digits after the radix point.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Number of digits in the coefficient (at least 1).
    pub fn precision(&self) -> usize {
        self.digits.len().max(1)
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn is_one(&self) -> bool {
        let (negative, digits, scale) = self.normalized();
        !negative && scale == 0 && digits == [1]
    }

    /// True when every fractional digit is zero.
    pub fn is_integral(&self) -> bool {
        let (_, _, scale) = self.normalized();
        scale == 0
    }

    /// Rounds (or pads) to exactly `places` fractional digits, half away from zero.
    pub fn round_dp(&self, places: u32) -> Decimal {
        if places >= self.scale {
            let mut digits = self.digits.clone();
            if !digits.is_empty() {
                digits.extend(std::iter::repeat(0).take((places - self.scale) as usize));
            }
            return Decimal::from_parts(self.negative, digits, places);
        }

        let dropped = (self.scale - places) as usize;
        let len = self.digits.len();
        let (mut kept, first_dropped) = if dropped > len {
            (Vec::new(), 0)
        } else {
            (self.digits[..len - dropped].to_vec(), self.digits[len - dropped])
        };
        if first_dropped >= 5 {
            increment(&mut kept);
        }
        Decimal::from_parts(self.negative, kept, places)
    }

    /// Rounds to `places` fractional digits under a significant-figure
    /// `precision`. Returns `None` when the result needs more than
    /// `precision` digits.
    pub fn quantize(&self, places: u32, precision: u32) -> Option<Decimal> {
        let rounded = self.round_dp(places);
        if rounded.digits.len() > precision as usize {
            return None;
        }
        Some(rounded)
    }

    /// Renders with exactly `places` fractional digits.
    pub fn to_fixed(&self, places: u32) -> String {
        self.round_dp(places).to_string()
    }

    /// Closest f64 to this value.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// The value as an integer, if it is integral and fits.
    pub fn to_i64(&self) -> Option<i64> {
        if !self.is_integral() {
            return None;
        }
        self.to_fixed(0).parse().ok()
    }

    fn normalized(&self) -> (bool, Vec<u8>, u32) {
        if self.digits.is_empty() {
            return (false, Vec::new(), 0);
        }
        let mut digits = self.digits.clone();
        let mut scale = self.scale;
        while scale > 0 && digits.last() == Some(&0) {
            digits.pop();
            scale -= 1;
        }
        (self.negative, digits, scale)
    }
}

fn increment(digits: &mut Vec<u8>) {
    let mut i = digits.len();
    loop {
        if i == 0 {
            digits.insert(0, 1);
            return;
        }
        i -= 1;
        if digits[i] == 9 {
            digits[i] = 0;
        } else {
            digits[i] += 1;
            return;
        }
    }
}

fn invalid(text: &str) -> Error {
    Error::CodecError(format!("Invalid decimal literal: {:?}", text))
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let (mantissa, exponent) = match body.find(|c: char| c == 'e' || c == 'E') {
            Some(idx) => {
                let exponent = body[idx + 1..].parse::<i64>().map_err(|_| invalid(text))?;
                (&body[..idx], exponent)
            }
            None => (body, 0),
        };
        if exponent.abs() > MAX_EXPONENT {
            return Err(invalid(text));
        }

        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid(text));
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid(text));
        }

        let mut digits: Vec<u8> = int_part
            .bytes()
            .chain(frac_part.bytes())
            .map(|b| b - b'0')
            .collect();
        let mut scale = frac_part.len() as i64 - exponent;
        if scale < 0 {
            digits.extend(std::iter::repeat(0).take((-scale) as usize));
            scale = 0;
        }
        Ok(Decimal::from_parts(negative, digits, scale as u32))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coefficient: String = self.digits.iter().map(|d| (b'0' + d) as char).collect();
        let scale = self.scale as usize;
        let sign = if self.negative { "-" } else { "" };

        if scale == 0 {
            if coefficient.is_empty() {
                write!(f, "0")
            } else {
                write!(f, "{}{}", sign, coefficient)
            }
        } else if coefficient.len() > scale {
            let (int_part, frac_part) = coefficient.split_at(coefficient.len() - scale);
            write!(f, "{}{}.{}", sign, int_part, frac_part)
        } else {
            write!(f, "{}0.{}{}", sign, "0".repeat(scale - coefficient.len()), coefficient)
        }
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Decimal {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(d("3.14159").to_string(), "3.14159");
        assert_eq!(d("1.50").to_string(), "1.50");
        assert_eq!(d("-0.0012").to_string(), "-0.0012");
        assert_eq!(d(".5").to_string(), "0.5");
        assert_eq!(d("7.").to_string(), "7");
        assert_eq!(d(" 42 ").to_string(), "42");
        assert_eq!(d("1.5e2").to_string(), "150");
        assert_eq!(d("15e-3").to_string(), "0.015");
        assert_eq!(d("-0").to_string(), "0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["", ".", "-", "abc", "1.2.3", "nan", "inf", "1e", "1e99999", "1,5"] {
            assert!(text.parse::<Decimal>().is_err(), "{:?} should not parse", text);
        }
    }

    #[test]
    fn test_scale_tracks_fractional_digits() {
        assert_eq!(d("1.50").scale(), 2);
        assert_eq!(d("12").scale(), 0);
        assert_eq!(Decimal::from_f64(0.1).unwrap().scale(), 1);
        assert_eq!(Decimal::from_f64(2.25).unwrap().to_string(), "2.25");
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(d("2.5").to_fixed(0), "3");
        assert_eq!(d("-2.5").to_fixed(0), "-3");
        assert_eq!(d("0.125").to_fixed(2), "0.13");
        assert_eq!(d("0.124").to_fixed(2), "0.12");
        assert_eq!(d("9.995").to_fixed(2), "10.00");
        assert_eq!(d("0.0004").to_fixed(3), "0.000");
        assert_eq!(d("0.0005").to_fixed(3), "0.001");
        assert_eq!(d("-0.0001").to_fixed(2), "0.00");
        assert_eq!(d("1.5").to_fixed(4), "1.5000");
    }

    #[test]
    fn test_quantize_respects_precision() {
        assert_eq!(d("12345678.123456").quantize(4, 12).unwrap().to_string(), "12345678.1235");
        assert!(d("123456789.1").quantize(4, 12).is_none());
        assert_eq!(d("0").quantize(4, 12).unwrap().to_string(), "0.0000");
    }

    #[test]
    fn test_equality_ignores_trailing_zeros() {
        assert_eq!(d("1.5"), d("1.5000"));
        assert_eq!(d("0.000"), d("0"));
        assert_ne!(d("1.5"), d("-1.5"));
        assert_ne!(d("150"), d("15"));
        assert!(d("1.000").is_one());
        assert!(d("0.00").is_zero());
    }

    // Renders a sign, magnitude and scale as fixed-place text using integer
    // arithmetic only.
    fn fixed_text(negative: bool, magnitude: u128, scale: u32) -> String {
        let digits = magnitude.to_string();
        let sign = if negative && magnitude != 0 { "-" } else { "" };
        let scale = scale as usize;
        if scale == 0 {
            return format!("{}{}", sign, digits);
        }
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        format!("{}{}.{}", sign, int_part, frac_part)
    }

    proptest! {
        #[test]
        fn prop_parse_display_round_trip(mantissa in -10i64.pow(15)..10i64.pow(15), scale in 0u32..12) {
            let text = fixed_text(mantissa < 0, mantissa.unsigned_abs() as u128, scale);
            let parsed = d(&text);
            prop_assert_eq!(parsed.to_string(), text.clone());
            prop_assert_eq!(parsed.scale(), scale);
            prop_assert_eq!(parsed.is_negative(), text.starts_with('-'));
        }

        #[test]
        fn prop_round_dp_is_half_away_from_zero(
            mantissa in -10i64.pow(15)..10i64.pow(15),
            scale in 0u32..10,
            places in 0u32..10,
        ) {
            let negative = mantissa < 0;
            let magnitude = mantissa.unsigned_abs() as u128;
            let value = d(&fixed_text(negative, magnitude, scale));

            let expected = if places >= scale {
                fixed_text(negative, magnitude * 10u128.pow(places - scale), places)
            } else {
                let step = 10u128.pow(scale - places);
                let mut rounded = magnitude / step;
                if (magnitude % step) * 2 >= step {
                    rounded += 1;
                }
                fixed_text(negative, rounded, places)
            };
            prop_assert_eq!(value.to_fixed(places), expected);
        }

        #[test]
        fn prop_quantize_fails_only_beyond_precision(
            mantissa in -10i64.pow(15)..10i64.pow(15),
            scale in 0u32..8,
            precision in 1u32..16,
        ) {
            let value = d(&fixed_text(mantissa < 0, mantissa.unsigned_abs() as u128, scale));
            let rounded = value.round_dp(4);
            let text = rounded.to_string();
            let significant = text
                .trim_start_matches('-')
                .trim_start_matches(|c: char| c == '0' || c == '.')
                .replace('.', "")
                .len();
            match value.quantize(4, precision) {
                Some(q) => {
                    prop_assert!(significant <= precision as usize);
                    prop_assert_eq!(q.to_string(), rounded.to_string());
                }
                None => prop_assert!(significant > precision as usize),
            }
        }

        #[test]
        fn prop_trailing_zeros_do_not_change_equality(
            mantissa in -10i64.pow(12)..10i64.pow(12),
            scale in 0u32..8,
            zeros in 1usize..6,
        ) {
            let text = fixed_text(mantissa < 0, mantissa.unsigned_abs() as u128, scale);
            let padded = if scale == 0 {
                format!("{}.{}", text, "0".repeat(zeros))
            } else {
                format!("{}{}", text, "0".repeat(zeros))
            };
            prop_assert_eq!(d(&text), d(&padded));
            prop_assert_eq!(d(&padded).scale(), scale + zeros as u32);
        }

        #[test]
        fn prop_from_f64_round_trips(x in -1.0e12f64..1.0e12) {
            let value = Decimal::from_f64(x).unwrap();
            prop_assert_eq!(value.to_f64(), x);
            prop_assert_eq!(value.to_string().parse::<f64>().unwrap(), x);
        }
    }

    #[test]
    fn test_integral_conversions() {
        assert_eq!(d("12.000").to_i64(), Some(12));
        assert_eq!(d("12.5").to_i64(), None);
        assert_eq!(Decimal::from_i64(-305).to_string(), "-305");
        assert!((d("2.75").to_f64() - 2.75).abs() < f64::EPSILON);
    }
}
