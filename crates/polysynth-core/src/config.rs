//! Engine-wide compile-time-ish configuration.
//!
//! The source firmware pins these as `#define`/`static const` members of the
//! wave generator class. We keep them as `const` associated values on
//! [`EngineConfig`] instead of free-floating magic numbers, built with the
//! same builder-style `const fn` pattern used for plugin metadata elsewhere
//! in this codebase.
//!
//! # Example
//!
//! ```ignore
//! use polysynth_core::EngineConfig;
//!
//! static CONFIG: EngineConfig = EngineConfig::new(48_000).with_delay_capacity(14_400);
//! ```

/// Polyphony slot count. The source firmware hard-codes this at 4.
pub const MAX_NOTES: usize = 4;
/// Maximum unison voices per oscillator.
pub const MAX_VOICE: usize = 8;
/// Length of a single-cycle wavetable, in samples. Power of two.
pub const WAVETABLE_LEN: usize = 2048;
/// `32 - log2(WAVETABLE_LEN)`: right-shift applied to a 32-bit phase
/// accumulator to obtain a wavetable index.
pub const BIT_SHIFT: u32 = 32 - WAVETABLE_LEN.trailing_zeros();
/// Default delay ring capacity: 300 ms at 48 kHz.
pub const DEFAULT_DELAY_CAPACITY: usize = 14_400;
/// Default sample rate, in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Runtime engine configuration.
///
/// Distinct from [`crate::Engine`]'s own fields, which carry the live,
/// mutable synth parameters (ADSR times, oscillator setup, filter/delay
/// state): this struct pins the values that are fixed for the lifetime of
/// an [`crate::Engine`] instance — sample rate and delay-ring capacity —
/// and is consumed once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Output sample rate, in Hz.
    pub sample_rate: u32,
    /// Capacity of each delay ring, in samples.
    pub delay_capacity: usize,
}

impl EngineConfig {
    /// Creates a configuration for the given sample rate, with the default
    /// delay-ring capacity.
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            delay_capacity: DEFAULT_DELAY_CAPACITY,
        }
    }

    /// Overrides the delay-ring capacity.
    pub const fn with_delay_capacity(mut self, delay_capacity: usize) -> Self {
        self.delay_capacity = delay_capacity;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}
