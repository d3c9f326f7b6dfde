//! Single-cycle wavetable storage.
//!
//! Four built-in tables (sine, triangle, saw, square) are generated once at
//! construction and are immutable for the process lifetime. Two additional
//! "custom" tables — one per pitched oscillator, OSC1 and OSC2 — can be
//! overwritten wholesale by a [`crate::command::Command::SetCustomShape`]
//! command. The sub-oscillator has no custom-table slot, matching the source
//! firmware (`setCustomShape` only ever targets OSC1/OSC2).
//!
//! All tables are length [`WAVETABLE_LEN`], a power of two, so that
//! `table[(phase >> BIT_SHIFT) & (WAVETABLE_LEN - 1)]` is valid for any
//! 32-bit `phase`.

use crate::config::WAVETABLE_LEN;
use std::f64::consts::PI;

/// Selects a built-in waveform shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Saw,
    Square,
}

/// Which oscillator a custom-table upload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomSlot {
    Osc1,
    Osc2,
}

/// A shape selector for one oscillator: "pointer-or-null" in the source
/// firmware, modeled here as an enum instead of an `Option<*const i16>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OscillatorSource {
    /// Oscillator disabled (null pointer in the source).
    #[default]
    Disabled,
    Builtin(Waveform),
    /// Use this oscillator's custom table (only meaningful for OSC1/OSC2).
    Custom,
}

impl OscillatorSource {
    /// True when this oscillator produces any signal at all.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Owns the four built-in tables plus the two mutable custom tables.
pub struct WavetableStore {
    sine: Box<[i16; WAVETABLE_LEN]>,
    triangle: Box<[i16; WAVETABLE_LEN]>,
    saw: Box<[i16; WAVETABLE_LEN]>,
    square: Box<[i16; WAVETABLE_LEN]>,
    custom_osc1: Box<[i16; WAVETABLE_LEN]>,
    custom_osc2: Box<[i16; WAVETABLE_LEN]>,
}

impl WavetableStore {
    pub fn new() -> Self {
        Self {
            sine: Box::new(generate_sine()),
            triangle: Box::new(generate_triangle()),
            saw: Box::new(generate_saw()),
            square: Box::new(generate_square()),
            custom_osc1: Box::new([0i16; WAVETABLE_LEN]),
            custom_osc2: Box::new([0i16; WAVETABLE_LEN]),
        }
    }

    /// Resolves an [`OscillatorSource`] to its backing table, if enabled.
    pub fn resolve(&self, source: OscillatorSource, slot: CustomSlot) -> Option<&[i16; WAVETABLE_LEN]> {
        match source {
            OscillatorSource::Disabled => None,
            OscillatorSource::Builtin(Waveform::Sine) => Some(&self.sine),
            OscillatorSource::Builtin(Waveform::Triangle) => Some(&self.triangle),
            OscillatorSource::Builtin(Waveform::Saw) => Some(&self.saw),
            OscillatorSource::Builtin(Waveform::Square) => Some(&self.square),
            OscillatorSource::Custom => Some(match slot {
                CustomSlot::Osc1 => &self.custom_osc1,
                CustomSlot::Osc2 => &self.custom_osc2,
            }),
        }
    }

    /// Overwrites a custom table wholesale. `data` shorter than
    /// [`WAVETABLE_LEN`] leaves the remaining entries untouched; longer is
    /// truncated, mirroring the source's fixed-size `memcpy`.
    pub fn set_custom(&mut self, slot: CustomSlot, data: &[i16]) {
        let target = match slot {
            CustomSlot::Osc1 => &mut self.custom_osc1,
            CustomSlot::Osc2 => &mut self.custom_osc2,
        };
        let n = data.len().min(WAVETABLE_LEN);
        target[..n].copy_from_slice(&data[..n]);
    }
}

impl Default for WavetableStore {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_sine() -> [i16; WAVETABLE_LEN] {
    let mut table = [0i16; WAVETABLE_LEN];
    for (i, sample) in table.iter_mut().enumerate() {
        let phase = 2.0 * PI * i as f64 / WAVETABLE_LEN as f64;
        *sample = (phase.sin() * i16::MAX as f64) as i16;
    }
    table
}

fn generate_triangle() -> [i16; WAVETABLE_LEN] {
    let mut table = [0i16; WAVETABLE_LEN];
    for (i, sample) in table.iter_mut().enumerate() {
        let x = i as f64 / WAVETABLE_LEN as f64;
        let tri = if x < 0.25 {
            4.0 * x
        } else if x < 0.75 {
            2.0 - 4.0 * x
        } else {
            4.0 * x - 4.0
        };
        *sample = (tri * i16::MAX as f64) as i16;
    }
    table
}

fn generate_saw() -> [i16; WAVETABLE_LEN] {
    let mut table = [0i16; WAVETABLE_LEN];
    for (i, sample) in table.iter_mut().enumerate() {
        let x = i as f64 / WAVETABLE_LEN as f64;
        let saw = 2.0 * x - 1.0;
        *sample = (saw * i16::MAX as f64) as i16;
    }
    table
}

fn generate_square() -> [i16; WAVETABLE_LEN] {
    let mut table = [0i16; WAVETABLE_LEN];
    for (i, sample) in table.iter_mut().enumerate() {
        *sample = if i < WAVETABLE_LEN / 2 {
            i16::MAX
        } else {
            -i16::MAX
        };
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_table_starts_at_zero_crossing() {
        let store = WavetableStore::new();
        let sine = store
            .resolve(OscillatorSource::Builtin(Waveform::Sine), CustomSlot::Osc1)
            .unwrap();
        assert_eq!(sine[0], 0);
        assert!(sine[WAVETABLE_LEN / 4] > 30000);
    }

    #[test]
    fn square_table_is_bimodal() {
        let store = WavetableStore::new();
        let square = store
            .resolve(OscillatorSource::Builtin(Waveform::Square), CustomSlot::Osc1)
            .unwrap();
        assert_eq!(square[0], i16::MAX);
        assert_eq!(square[WAVETABLE_LEN / 2], -i16::MAX);
    }

    #[test]
    fn disabled_resolves_to_none() {
        let store = WavetableStore::new();
        assert!(store.resolve(OscillatorSource::Disabled, CustomSlot::Osc1).is_none());
    }

    #[test]
    fn custom_table_round_trips() {
        let mut store = WavetableStore::new();
        let mut data = [0i16; WAVETABLE_LEN];
        data[3] = 12345;
        store.set_custom(CustomSlot::Osc1, &data);
        let resolved = store.resolve(OscillatorSource::Custom, CustomSlot::Osc1).unwrap();
        assert_eq!(resolved[3], 12345);
    }

    #[test]
    fn custom_table_short_write_leaves_tail_untouched() {
        let mut store = WavetableStore::new();
        store.set_custom(CustomSlot::Osc2, &[1, 2, 3]);
        let resolved = store.resolve(OscillatorSource::Custom, CustomSlot::Osc2).unwrap();
        assert_eq!(&resolved[..3], &[1, 2, 3]);
        assert_eq!(resolved[3], 0);
    }
}
