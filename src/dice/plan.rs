//! Launch-count table for fair physical dice.
//!
//! A die with `f` faces yields `log2(f)` bits per launch; reaching the
//! 256-bit target takes `ceil(256 / log2(f))` launches. The values are
//! precomputed for the supported platonic-solid set (plus the coin) so a
//! plan can never under-collect by a fractional bit.

use crate::{Error, Result};

pub const TARGET_BITS: u32 = 256;

pub const SUPPORTED_FACES: [u32; 6] = [2, 4, 6, 8, 12, 20];

/// Launches required to reach [`TARGET_BITS`] with a die of `faces` faces.
/// Face counts outside the supported set are a caller error.
pub fn required_launches(faces: u32) -> Result<u32> {
    match faces {
        2 => Ok(256),
        4 => Ok(128),
        6 => Ok(100),
        8 => Ok(86),
        12 => Ok(72),
        20 => Ok(60),
        other => Err(Error::UnsupportedFaceCount(other)),
    }
}
