//! Internal fixed-point math and lookup tables for the polysynth voice engine.
//!
//! This crate provides low-level, zero-dependency building blocks shared by
//! `polysynth-core`. Everything here is `const`-friendly where possible and
//! has no external dependencies, matching the rest of the audio-rate path's
//! "no heap, no float on the hot path" discipline.
//!
//! # Contents
//!
//! - [`fixed`] - Q1.10 / Q16.16 fixed-point helpers
//! - [`pan`] - equal-power pan lookup tables
//! - [`unison`] - unison-voice level-normalisation constants

pub mod fixed;
pub mod pan;
pub mod unison;

pub use fixed::{clamp_i32, mul_q10, permille_to_q10, q16_to_int, Q10_ONE, Q10_SHIFT, Q16_ONE, Q16_SHIFT};
pub use pan::{pan_gains, PAN_COS_TABLE, PAN_SIN_TABLE};
pub use unison::{unison_divisor, DIVIDE_FIXED, THREE_OSC_DIVIDE, TWO_OSC_DIVIDE};
