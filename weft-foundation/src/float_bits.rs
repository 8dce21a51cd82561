// Weft - weft-foundation
// Module: float bit patterns
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Wrapper types for f32 and f64 ensuring bit-pattern based equality and
//! hashing.
//!
//! WebAssembly values are bit patterns; two NaNs with different payloads are
//! different values even though `f32::eq` says otherwise. All float values
//! in the engine are stored through these wrappers and only converted to
//! native floats at the arithmetic sites.

use core::hash::{Hash, Hasher};

/// Wrapper for f32 that implements `Hash`, `PartialEq` and `Eq` based on bit
/// patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct FloatBits32(pub u32);

impl FloatBits32 {
    /// The canonical NaN bit pattern for f32.
    pub const NAN: Self = FloatBits32(0x7fc0_0000);

    /// Creates a `FloatBits32` from an `f32` value.
    #[must_use]
    pub fn from_float(val: f32) -> Self {
        Self(val.to_bits())
    }

    /// Returns the `f32` value represented by this bit pattern.
    #[must_use]
    pub const fn value(self) -> f32 {
        f32::from_bits(self.0)
    }

    /// Returns the underlying bits.
    #[must_use]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Creates a `FloatBits32` from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

impl Hash for FloatBits32 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Wrapper for f64 that implements `Hash`, `PartialEq` and `Eq` based on bit
/// patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct FloatBits64(pub u64);

impl FloatBits64 {
    /// The canonical NaN bit pattern for f64.
    pub const NAN: Self = FloatBits64(0x7ff8_0000_0000_0000);

    /// Creates a `FloatBits64` from an `f64` value.
    #[must_use]
    pub fn from_float(val: f64) -> Self {
        Self(val.to_bits())
    }

    /// Returns the `f64` value represented by this bit pattern.
    #[must_use]
    pub const fn value(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Returns the underlying bits.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Creates a `FloatBits64` from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl Hash for FloatBits64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_payloads_are_distinct() {
        let a = FloatBits32(0x7fc0_0000);
        let b = FloatBits32(0x7fc0_0001);
        assert!(a.value().is_nan());
        assert!(b.value().is_nan());
        assert_ne!(a, b);
    }

    #[test]
    fn signed_zero_is_distinct() {
        let pos = FloatBits64::from_float(0.0);
        let neg = FloatBits64::from_float(-0.0);
        assert_ne!(pos, neg);
        assert_eq!(pos.value(), neg.value());
    }

    #[test]
    fn round_trips_bits() {
        let f = FloatBits64::from_float(1.5);
        assert_eq!(FloatBits64::from_bits(f.to_bits()), f);
    }
}
