// Weft - weft-runtime
// Module: numeric semantics
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Numeric instruction semantics that need care beyond what the Rust
//! operators provide: trapping division, trapping and saturating
//! float-to-int truncation, and the IEEE-754 min/max/nearest rules.

use crate::trap::{Trap, TrapKind};

type TrapResult<T> = core::result::Result<T, Trap>;

pub fn div_s32(lhs: i32, rhs: i32) -> TrapResult<i32> {
    if rhs == 0 {
        return Err(Trap::new(TrapKind::DivideByZero));
    }
    if lhs == i32::MIN && rhs == -1 {
        return Err(Trap::new(TrapKind::IntegerOverflow));
    }
    Ok(lhs.wrapping_div(rhs))
}

pub fn div_u32(lhs: u32, rhs: u32) -> TrapResult<u32> {
    if rhs == 0 {
        return Err(Trap::new(TrapKind::DivideByZero));
    }
    Ok(lhs / rhs)
}

pub fn rem_s32(lhs: i32, rhs: i32) -> TrapResult<i32> {
    if rhs == 0 {
        return Err(Trap::new(TrapKind::DivideByZero));
    }
    // MIN % -1 is 0, not an overflow.
    Ok(lhs.wrapping_rem(rhs))
}

pub fn rem_u32(lhs: u32, rhs: u32) -> TrapResult<u32> {
    if rhs == 0 {
        return Err(Trap::new(TrapKind::DivideByZero));
    }
    Ok(lhs % rhs)
}

pub fn div_s64(lhs: i64, rhs: i64) -> TrapResult<i64> {
    if rhs == 0 {
        return Err(Trap::new(TrapKind::DivideByZero));
    }
    if lhs == i64::MIN && rhs == -1 {
        return Err(Trap::new(TrapKind::IntegerOverflow));
    }
    Ok(lhs.wrapping_div(rhs))
}

pub fn div_u64(lhs: u64, rhs: u64) -> TrapResult<u64> {
    if rhs == 0 {
        return Err(Trap::new(TrapKind::DivideByZero));
    }
    Ok(lhs / rhs)
}

pub fn rem_s64(lhs: i64, rhs: i64) -> TrapResult<i64> {
    if rhs == 0 {
        return Err(Trap::new(TrapKind::DivideByZero));
    }
    Ok(lhs.wrapping_rem(rhs))
}

pub fn rem_u64(lhs: u64, rhs: u64) -> TrapResult<u64> {
    if rhs == 0 {
        return Err(Trap::new(TrapKind::DivideByZero));
    }
    Ok(lhs % rhs)
}

// Trapping float-to-int truncation: NaN traps with invalid-conversion,
// out-of-range traps with integer-overflow. Bounds compare the truncated
// value against the exactly representable power-of-two limits.

pub fn trunc_f32_to_i32(val: f32) -> TrapResult<i32> {
    if val.is_nan() {
        return Err(Trap::new(TrapKind::InvalidConversionToInteger));
    }
    let t = val.trunc();
    if t >= 2147483648.0 || t < -2147483648.0 {
        return Err(Trap::new(TrapKind::IntegerOverflow));
    }
    Ok(t as i32)
}

pub fn trunc_f32_to_u32(val: f32) -> TrapResult<u32> {
    if val.is_nan() {
        return Err(Trap::new(TrapKind::InvalidConversionToInteger));
    }
    let t = val.trunc();
    if t >= 4294967296.0 || t < 0.0 {
        return Err(Trap::new(TrapKind::IntegerOverflow));
    }
    Ok(t as u32)
}

pub fn trunc_f64_to_i32(val: f64) -> TrapResult<i32> {
    if val.is_nan() {
        return Err(Trap::new(TrapKind::InvalidConversionToInteger));
    }
    let t = val.trunc();
    if t >= 2147483648.0 || t < -2147483648.0 {
        return Err(Trap::new(TrapKind::IntegerOverflow));
    }
    Ok(t as i32)
}

pub fn trunc_f64_to_u32(val: f64) -> TrapResult<u32> {
    if val.is_nan() {
        return Err(Trap::new(TrapKind::InvalidConversionToInteger));
    }
    let t = val.trunc();
    if t >= 4294967296.0 || t < 0.0 {
        return Err(Trap::new(TrapKind::IntegerOverflow));
    }
    Ok(t as u32)
}

pub fn trunc_f32_to_i64(val: f32) -> TrapResult<i64> {
    if val.is_nan() {
        return Err(Trap::new(TrapKind::InvalidConversionToInteger));
    }
    let t = val.trunc();
    if t >= 9223372036854775808.0 || t < -9223372036854775808.0 {
        return Err(Trap::new(TrapKind::IntegerOverflow));
    }
    Ok(t as i64)
}

pub fn trunc_f32_to_u64(val: f32) -> TrapResult<u64> {
    if val.is_nan() {
        return Err(Trap::new(TrapKind::InvalidConversionToInteger));
    }
    let t = val.trunc();
    if t >= 18446744073709551616.0 || t < 0.0 {
        return Err(Trap::new(TrapKind::IntegerOverflow));
    }
    Ok(t as u64)
}

pub fn trunc_f64_to_i64(val: f64) -> TrapResult<i64> {
    if val.is_nan() {
        return Err(Trap::new(TrapKind::InvalidConversionToInteger));
    }
    let t = val.trunc();
    if t >= 9223372036854775808.0 || t < -9223372036854775808.0 {
        return Err(Trap::new(TrapKind::IntegerOverflow));
    }
    Ok(t as i64)
}

pub fn trunc_f64_to_u64(val: f64) -> TrapResult<u64> {
    if val.is_nan() {
        return Err(Trap::new(TrapKind::InvalidConversionToInteger));
    }
    let t = val.trunc();
    if t >= 18446744073709551616.0 || t < 0.0 {
        return Err(Trap::new(TrapKind::IntegerOverflow));
    }
    Ok(t as u64)
}

/// Saturating float-to-int truncation (`0xFC` forms): NaN becomes 0,
/// out-of-range clamps.
macro_rules! trunc_sat {
    ($name:ident, $from:ty, $to:ty) => {
        #[must_use]
        pub fn $name(val: $from) -> $to {
            // `as` casts from float to int saturate and map NaN to 0.
            val as $to
        }
    };
}

trunc_sat!(trunc_sat_f32_to_i32, f32, i32);
trunc_sat!(trunc_sat_f32_to_u32, f32, u32);
trunc_sat!(trunc_sat_f64_to_i32, f64, i32);
trunc_sat!(trunc_sat_f64_to_u32, f64, u32);
trunc_sat!(trunc_sat_f32_to_i64, f32, i64);
trunc_sat!(trunc_sat_f32_to_u64, f32, u64);
trunc_sat!(trunc_sat_f64_to_i64, f64, i64);
trunc_sat!(trunc_sat_f64_to_u64, f64, u64);

/// IEEE-754 minimum: NaN if either operand is NaN, `-0.0 < +0.0`.
#[must_use]
pub fn fmin32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a < b {
        a
    } else if b < a {
        b
    } else if a.is_sign_negative() {
        a
    } else {
        b
    }
}

#[must_use]
pub fn fmax32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a > b {
        a
    } else if b > a {
        b
    } else if a.is_sign_positive() {
        a
    } else {
        b
    }
}

#[must_use]
pub fn fmin64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a < b {
        a
    } else if b < a {
        b
    } else if a.is_sign_negative() {
        a
    } else {
        b
    }
}

#[must_use]
pub fn fmax64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a > b {
        a
    } else if b > a {
        b
    } else if a.is_sign_positive() {
        a
    } else {
        b
    }
}

/// Round to nearest, ties to even.
#[must_use]
pub fn nearest32(val: f32) -> f32 {
    val.round_ties_even()
}

#[must_use]
pub fn nearest64(val: f64) -> f64 {
    val.round_ties_even()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_division_overflow_traps() {
        assert_eq!(
            div_s32(i32::MIN, -1).unwrap_err().kind,
            TrapKind::IntegerOverflow
        );
        assert_eq!(div_s32(7, 0).unwrap_err().kind, TrapKind::DivideByZero);
        assert_eq!(div_s32(-7, 2).unwrap(), -3);
        assert_eq!(
            div_s64(i64::MIN, -1).unwrap_err().kind,
            TrapKind::IntegerOverflow
        );
    }

    #[test]
    fn min_rem_minus_one_is_zero() {
        assert_eq!(rem_s32(i32::MIN, -1).unwrap(), 0);
        assert_eq!(rem_s64(i64::MIN, -1).unwrap(), 0);
    }

    #[test]
    fn trunc_traps_distinguish_nan_and_range() {
        assert_eq!(
            trunc_f32_to_i32(f32::NAN).unwrap_err().kind,
            TrapKind::InvalidConversionToInteger
        );
        assert_eq!(
            trunc_f32_to_i32(2147483648.0).unwrap_err().kind,
            TrapKind::IntegerOverflow
        );
        assert_eq!(trunc_f32_to_i32(-2147483648.0).unwrap(), i32::MIN);
        assert_eq!(trunc_f64_to_i32(2147483647.0).unwrap(), i32::MAX);
        assert_eq!(trunc_f64_to_u32(-0.5).unwrap(), 0);
        assert_eq!(
            trunc_f64_to_u32(-1.0).unwrap_err().kind,
            TrapKind::IntegerOverflow
        );
    }

    #[test]
    fn trunc_sat_clamps() {
        assert_eq!(trunc_sat_f32_to_i32(f32::NAN), 0);
        assert_eq!(trunc_sat_f32_to_i32(f32::INFINITY), i32::MAX);
        assert_eq!(trunc_sat_f32_to_i32(f32::NEG_INFINITY), i32::MIN);
        assert_eq!(trunc_sat_f64_to_u64(-3.0), 0);
        assert_eq!(trunc_sat_f64_to_u64(1e30), u64::MAX);
    }

    #[test]
    fn min_max_zero_signs() {
        assert!(fmin32(-0.0, 0.0).is_sign_negative());
        assert!(fmax32(-0.0, 0.0).is_sign_positive());
        assert!(fmin64(0.0, -0.0).is_sign_negative());
        assert!(fmax32(1.0, f32::NAN).is_nan());
    }

    #[test]
    fn nearest_ties_to_even() {
        assert_eq!(nearest32(2.5), 2.0);
        assert_eq!(nearest32(3.5), 4.0);
        assert_eq!(nearest64(-2.5), -2.0);
        assert_eq!(nearest64(0.5), 0.0);
    }
}
