//! Stateful second-order IIR filters (biquads), direct-form I.
//!
//! Coefficients are derived from the standard RBJ cookbook formulas at
//! control rate (floating point is fine here — §4.3/§9 only forbid float on
//! the per-sample path) and stored scaled to Q16.16 so the per-sample
//! evaluation is pure integer math. L and R channels keep independent
//! history.

use polysynth_utils::fixed::{mul_q10, Q10_ONE, Q16_SHIFT};
use std::f64::consts::PI;

/// Lower/upper clamp for filter cutoff frequency, in Hz.
pub const FREQ_RANGE: (f64, f64) = (20.0, 20_000.0);
/// Lower/upper clamp for filter Q.
pub const Q_RANGE: (f64, f64) = (0.02, 40.0);
/// Default "fully wet" mix value (Q1.10).
pub const DEFAULT_MIX: i32 = Q10_ONE;

/// Q16.16 biquad coefficients, scaled the way the source firmware scales
/// them: `(b/a) * 65536`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoeffs {
    pub f0: i64,
    pub f1: i64,
    pub f2: i64,
    pub f3: i64,
    pub f4: i64,
}

impl BiquadCoeffs {
    /// Low-pass coefficients for the given cutoff frequency and Q at `sample_rate`.
    pub fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let freq = freq.clamp(FREQ_RANGE.0, FREQ_RANGE.1);
        let q = q.clamp(Q_RANGE.0, Q_RANGE.1);
        let omega = 2.0 * PI * freq / sample_rate;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();

        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;
        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;

        Self::scale(b0, b1, b2, a0, a1, a2)
    }

    /// High-pass coefficients for the given cutoff frequency and Q at `sample_rate`.
    pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let freq = freq.clamp(FREQ_RANGE.0, FREQ_RANGE.1);
        let q = q.clamp(Q_RANGE.0, Q_RANGE.1);
        let omega = 2.0 * PI * freq / sample_rate;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();

        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;
        let b0 = (1.0 + cos_omega) / 2.0;
        let b1 = -(1.0 + cos_omega);
        let b2 = (1.0 + cos_omega) / 2.0;

        Self::scale(b0, b1, b2, a0, a1, a2)
    }

    fn scale(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        let scale = (1i64 << Q16_SHIFT) as f64;
        Self {
            f0: ((b0 / a0) * scale) as i64,
            f1: ((b1 / a0) * scale) as i64,
            f2: ((b2 / a0) * scale) as i64,
            f3: ((a1 / a0) * scale) as i64,
            f4: ((a2 / a0) * scale) as i64,
        }
    }
}

/// Per-channel direct-form-I history.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadHistory {
    in1: i64,
    in2: i64,
    out1: i64,
    out2: i64,
}

impl BiquadHistory {
    #[inline]
    fn process(&mut self, coeffs: &BiquadCoeffs, input: i16, mix: i32) -> i16 {
        let input = input as i64;
        let out = (coeffs.f0 * input + coeffs.f1 * self.in1 + coeffs.f2 * self.in2
            - coeffs.f3 * self.out1
            - coeffs.f4 * self.out2)
            >> Q16_SHIFT;
        self.in2 = self.in1;
        self.in1 = input;
        self.out2 = self.out1;
        self.out1 = out;

        let out = out.clamp(i16::MIN as i64, i16::MAX as i64) as i16;
        let dry = mul_q10(Q10_ONE - mix, input as i32);
        let wet = mul_q10(mix, out as i32);
        (dry + wet).clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

/// One stereo biquad section (either the LPF or the HPF).
#[derive(Debug, Clone, Default)]
pub struct Biquad {
    enabled: bool,
    coeffs: BiquadCoeffs,
    left: BiquadHistory,
    right: BiquadHistory,
}

impl Biquad {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    /// Processes one stereo sample, or passes it through untouched if disabled.
    #[inline]
    pub fn process(&mut self, in_l: i16, in_r: i16, mix: i32) -> (i16, i16) {
        if !self.enabled {
            return (in_l, in_r);
        }
        (
            self.left.process(&self.coeffs, in_l, mix),
            self.right.process(&self.coeffs, in_r, mix),
        )
    }
}

/// The LPF + HPF pair applied in series during the mixer stage.
#[derive(Debug, Clone)]
pub struct FilterPair {
    pub lpf: Biquad,
    pub hpf: Biquad,
    pub lpf_mix: i32,
    pub hpf_mix: i32,
}

impl Default for FilterPair {
    fn default() -> Self {
        Self {
            lpf: Biquad::default(),
            hpf: Biquad::default(),
            lpf_mix: DEFAULT_MIX,
            hpf_mix: DEFAULT_MIX,
        }
    }
}

impl FilterPair {
    pub fn new(sample_rate: f64) -> Self {
        let mut pair = Self::default();
        pair.lpf.set_coeffs(BiquadCoeffs::lowpass(1000.0, 1.0 / 2f64.sqrt(), sample_rate));
        pair.hpf.set_coeffs(BiquadCoeffs::highpass(500.0, 1.0 / 2f64.sqrt(), sample_rate));
        pair
    }

    #[inline]
    pub fn process(&mut self, in_l: i16, in_r: i16) -> (i16, i16) {
        let (l, r) = self.lpf.process(in_l, in_r, self.lpf_mix);
        self.hpf.process(l, r, self.hpf_mix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_filter_passes_through() {
        let mut biquad = Biquad::default();
        assert_eq!(biquad.process(1234, -1234, DEFAULT_MIX), (1234, -1234));
    }

    #[test]
    fn lowpass_attenuates_high_frequency_step() {
        let mut biquad = Biquad::default();
        biquad.set_coeffs(BiquadCoeffs::lowpass(200.0, 1.0 / 2f64.sqrt(), 48_000.0));
        biquad.set_enabled(true);
        // Feed a full-scale alternating (Nyquist) signal and confirm the
        // steady-state output settles well below the input amplitude.
        let mut last = (0i16, 0i16);
        for i in 0..200 {
            let x = if i % 2 == 0 { i16::MAX } else { i16::MIN };
            last = biquad.process(x, x, DEFAULT_MIX);
        }
        assert!((last.0 as i32).abs() < (i16::MAX as i32) / 4);
    }

    #[test]
    fn default_filter_pair_matches_source_defaults() {
        let pair = FilterPair::new(48_000.0);
        assert!(!pair.lpf.enabled());
        assert!(!pair.hpf.enabled());
    }
}
