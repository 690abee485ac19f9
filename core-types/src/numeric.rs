// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Bridge from unbounded ledger integers to the bounded numbers kept in the mirror.
//!
//! The mirror is display/index material only: values above the safe range are
//! clamped, never wrapped, and nothing downstream may make an admission or
//! settlement decision from a bridged value.

use primitive_types::U256;

/// Largest integer the document store's numeric type holds exactly (`2^53 - 1`).
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;
/// Smallest integer the document store's numeric type holds exactly.
pub const MIN_SAFE_INTEGER: i64 = -MAX_SAFE_INTEGER;

/// Maps a ledger integer onto the mirror's bounded range.
///
/// Exact for `value <= MAX_SAFE_INTEGER`, saturating above. The input is unsigned,
/// so the lower saturation bound can never be reached from here.
pub fn to_bounded(value: U256) -> i64 {
    if value.bits() > 127 {
        return MAX_SAFE_INTEGER;
    }
    clamp_bounded(value.low_u128() as i128)
}

/// Signed counterpart of [`to_bounded`], saturating at both ends.
pub fn clamp_bounded(value: i128) -> i64 {
    value.clamp(MIN_SAFE_INTEGER as i128, MAX_SAFE_INTEGER as i128) as i64
}
