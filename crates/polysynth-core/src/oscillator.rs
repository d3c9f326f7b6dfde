//! Oscillator bank: per-oscillator unison/detune/spread-pan parameters and
//! the per-sample generation step.
//!
//! Each of the three oscillator slots (OSC1, OSC2, SUB) can run `1..=MAX_VOICE`
//! detuned unison copies, panned across the stereo field and summed with a
//! level normaliser so that adding unison voices doesn't raise perceived
//! loudness. Pitch math (MIDI note + octave/semitone/cent offsets -> phase
//! delta) happens at control rate in plain `f64`; only the per-sample mix is
//! integer.

use crate::config::{BIT_SHIFT, MAX_VOICE, MAX_NOTES};
use crate::voice::Voice;
use crate::wavetable::{CustomSlot, OscillatorSource, WavetableStore};
use polysynth_utils::fixed::{mul_q10, Q10_ONE, Q10_SHIFT};
use polysynth_utils::pan::pan_gains;
use polysynth_utils::unison::{unison_divisor, THREE_OSC_DIVIDE, TWO_OSC_DIVIDE};

/// Hard ceiling on the total unison-voice count summed across OSC1, OSC2 and
/// SUB at once, independent of each oscillator's own `1..=MAX_VOICE` range.
/// This is the admission control the command layer consults before honoring
/// a `SET_VOICE` that would push the per-sample workload past what the
/// per-frame budget allows.
pub const MAX_TOTAL_UNISON: u8 = MAX_VOICE as u8;

/// Which oscillator slot a unison-count admission check is being run for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnisonTarget {
    Osc1,
    Osc2,
    Sub,
}

/// Per-oscillator unison/detune/spread/pitch-offset parameters.
#[derive(Debug, Clone, Copy)]
pub struct OscillatorParams {
    pub source: OscillatorSource,
    /// Unison voice count, `1..=MAX_VOICE`.
    pub voices: u8,
    /// Total detune spread across all unison voices, in cents.
    pub detune_cents: i32,
    /// Stereo spread of unison voices, `0..=100` (0 = mono, 100 = full width).
    pub spread: u8,
    pub octave: i8,
    pub semitone: i8,
    pub cent: i8,
    /// Output level for this oscillator, Q1.10.
    pub level: i32,
}

impl Default for OscillatorParams {
    fn default() -> Self {
        Self {
            source: OscillatorSource::Disabled,
            voices: 1,
            detune_cents: 0,
            spread: 0,
            octave: 0,
            semitone: 0,
            cent: 0,
            level: Q10_ONE,
        }
    }
}

impl OscillatorParams {
    /// Per-unison-voice `(pan_l, pan_r)` gains, Q1.10-scaled from the
    /// `i16::MAX`-scaled pan table. Voice `0` is always centred; the
    /// remaining voices spread symmetrically outward.
    fn unison_pan(&self, unison_index: u8) -> (i32, i32) {
        if self.voices <= 1 || self.spread == 0 {
            return (Q10_ONE, Q10_ONE);
        }
        let span = (self.voices - 1).max(1) as i32;
        let centered = unison_index as i32 * 2 - span;
        let pan_pos = 50 + (centered * self.spread as i32) / (2 * span);
        let pan_pos = pan_pos.clamp(0, 100) as u8;
        let (cos, sin) = pan_gains(pan_pos);
        (
            (cos as i32 * Q10_ONE) / i16::MAX as i32,
            (sin as i32 * Q10_ONE) / i16::MAX as i32,
        )
    }

    /// Cents offset applied to unison voice `index`, symmetric around zero.
    fn unison_detune(&self, index: u8) -> f64 {
        if self.voices <= 1 {
            return 0.0;
        }
        let span = (self.voices - 1) as f64;
        let centered = index as f64 - span / 2.0;
        self.detune_cents as f64 * centered / span
    }
}

/// Owns OSC1/OSC2/SUB parameters and the ring-modulation switch; performs
/// per-sample generation for every voice.
#[derive(Debug, Clone)]
pub struct OscillatorBank {
    pub osc1: OscillatorParams,
    pub osc2: OscillatorParams,
    pub sub: OscillatorParams,
    pub ring_mod: bool,
}

impl Default for OscillatorBank {
    fn default() -> Self {
        Self {
            osc1: OscillatorParams {
                source: OscillatorSource::Builtin(crate::wavetable::Waveform::Sine),
                ..OscillatorParams::default()
            },
            osc2: OscillatorParams::default(),
            sub: OscillatorParams::default(),
            ring_mod: false,
        }
    }
}

impl OscillatorBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn active_oscillator_count(&self) -> u32 {
        [self.osc1.source, self.osc2.source, self.sub.source]
            .iter()
            .filter(|s| s.is_enabled())
            .count() as u32
    }

    fn mix_divisor(&self) -> u16 {
        match self.active_oscillator_count() {
            0 | 1 => 1000,
            2 => TWO_OSC_DIVIDE,
            _ => THREE_OSC_DIVIDE,
        }
    }

    /// Admission control for a proposed new unison count on `target`:
    /// rejects the change if it would push the combined OSC1+OSC2+SUB unison
    /// total above [`MAX_TOTAL_UNISON`]. SUB only ever contributes a flat `1`
    /// to the other two oscillators' sums (it is not itself a multi-voice
    /// unison source), matching the admission check the source firmware runs
    /// before committing any of `setShape`/`setVoice`/`setCustomShape`.
    pub fn can_set_voices(&self, target: UnisonTarget, proposed: u8) -> bool {
        if !(1..=MAX_VOICE as u8).contains(&proposed) {
            return false;
        }
        let sub_contrib = self.sub.source.is_enabled() as u16;
        let other = match target {
            UnisonTarget::Osc1 => self.osc2.voices as u16 + sub_contrib,
            UnisonTarget::Osc2 => self.osc1.voices as u16 + sub_contrib,
            UnisonTarget::Sub => self.osc1.voices as u16 + self.osc2.voices as u16,
        };
        other + proposed as u16 <= MAX_TOTAL_UNISON as u16
    }

    /// Computes and stores phase deltas (and, if gliding, glide targets) for
    /// every unison voice of every oscillator slot, for a note at
    /// `midi_note`. `glide` selects whether existing phase deltas become
    /// glide targets (portamento) or are overwritten immediately.
    pub fn set_frequency(&self, voice: &mut Voice, midi_note: u8, sample_rate: u32, glide: bool) {
        set_osc_frequency(
            &self.osc1,
            &mut voice.osc1_phase_delta,
            &mut voice.osc1_glide_delta,
            midi_note,
            sample_rate,
            glide,
        );
        set_osc_frequency(
            &self.osc2,
            &mut voice.osc2_phase_delta,
            &mut voice.osc2_glide_delta,
            midi_note,
            sample_rate,
            glide,
        );
        let mut sub_delta = [0u32; 1];
        let mut sub_glide = [0u32; 1];
        set_osc_frequency(&self.sub, &mut sub_delta, &mut sub_glide, midi_note, sample_rate, glide);
        voice.osc_sub_phase_delta = sub_delta[0];
        voice.osc_sub_glide_delta = sub_glide[0];
    }

    /// Advances one voice's oscillator phases by one sample and returns its
    /// stereo contribution (pre-envelope, pre-gain). `glide_factor_q10`,
    /// when `Some`, nudges the voice's glide-delta arrays toward their
    /// phase-delta targets by that Q1.10 fraction before using the
    /// glide-delta (not phase-delta) arrays to advance phase — this is the
    /// monophonic portamento path; `None` advances phase directly off
    /// `phase_delta`, unchanged.
    #[inline]
    pub fn generate_sample(
        &self,
        voice: &mut Voice,
        tables: &WavetableStore,
        glide_factor_q10: Option<i32>,
    ) -> (i32, i32) {
        let (osc1_deltas, osc2_deltas, sub_delta) = if let Some(factor) = glide_factor_q10 {
            for i in 0..MAX_VOICE {
                voice.osc1_glide_delta[i] =
                    glide_step(voice.osc1_glide_delta[i], voice.osc1_phase_delta[i], factor);
                voice.osc2_glide_delta[i] =
                    glide_step(voice.osc2_glide_delta[i], voice.osc2_phase_delta[i], factor);
            }
            voice.osc_sub_glide_delta =
                glide_step(voice.osc_sub_glide_delta, voice.osc_sub_phase_delta, factor);
            (voice.osc1_glide_delta, voice.osc2_glide_delta, voice.osc_sub_glide_delta)
        } else {
            (voice.osc1_phase_delta, voice.osc2_phase_delta, voice.osc_sub_phase_delta)
        };

        let osc1 = generate_osc(&self.osc1, tables, CustomSlot::Osc1, &mut voice.osc1_phase, &osc1_deltas);
        let osc2 = generate_osc(&self.osc2, tables, CustomSlot::Osc2, &mut voice.osc2_phase, &osc2_deltas);

        let sub_sample = if self.sub.source.is_enabled() {
            if let Some(table) = tables.resolve(self.sub.source, CustomSlot::Osc1) {
                let idx = (voice.osc_sub_phase >> BIT_SHIFT) as usize;
                voice.osc_sub_phase = voice.osc_sub_phase.wrapping_add(sub_delta);
                let s = table[idx] as i32;
                (mul_q10(self.sub.level, s), mul_q10(self.sub.level, s))
            } else {
                (0, 0)
            }
        } else {
            (0, 0)
        };

        // Ring modulation replaces OSC2 with (OSC1*OSC2)/16384 and OSC1 with
        // (OSC1+OSC2)/2; both replaced signals are then summed as usual.
        let (l, r) = if self.ring_mod && self.osc1.source.is_enabled() && self.osc2.source.is_enabled() {
            let ring_osc1_l = (osc1.0 + osc2.0) / 2;
            let ring_osc1_r = (osc1.1 + osc2.1) / 2;
            let ring_osc2_l = (osc1.0 as i64 * osc2.0 as i64 / 16384) as i32;
            let ring_osc2_r = (osc1.1 as i64 * osc2.1 as i64 / 16384) as i32;
            (
                ring_osc1_l + ring_osc2_l + sub_sample.0,
                ring_osc1_r + ring_osc2_r + sub_sample.1,
            )
        } else {
            (osc1.0 + osc2.0 + sub_sample.0, osc1.1 + osc2.1 + sub_sample.1)
        };

        let divisor = self.mix_divisor() as i32;
        ((l * 1000) / divisor, (r * 1000) / divisor)
    }
}

/// One step of a fixed-point portamento slide: moves `current` a
/// `factor_q10` fraction of the way toward `target`. Replaces the source
/// firmware's audio-rate float `lerp()`, since floating point never
/// belongs on the per-sample path.
#[inline]
fn glide_step(current: u32, target: u32, factor_q10: i32) -> u32 {
    let diff = target as i64 - current as i64;
    let step = (diff * factor_q10 as i64) >> Q10_SHIFT;
    (current as i64 + step) as u32
}

/// Generates and sums every unison copy of one pitched oscillator (OSC1 or
/// OSC2), applying per-voice spread-pan and the unison level normaliser.
fn generate_osc(
    params: &OscillatorParams,
    tables: &WavetableStore,
    slot: CustomSlot,
    phases: &mut [u32; MAX_VOICE],
    deltas: &[u32; MAX_VOICE],
) -> (i32, i32) {
    if !params.source.is_enabled() {
        return (0, 0);
    }
    let Some(table) = tables.resolve(params.source, slot) else {
        return (0, 0);
    };

    let voices = params.voices.max(1).min(MAX_VOICE as u8);
    let mut sum_l = 0i32;
    let mut sum_r = 0i32;
    for i in 0..voices as usize {
        let idx = (phases[i] >> BIT_SHIFT) as usize;
        phases[i] = phases[i].wrapping_add(deltas[i]);
        let raw = table[idx] as i32;
        let (pan_l, pan_r) = params.unison_pan(i as u8);
        sum_l += mul_q10(pan_l, raw);
        sum_r += mul_q10(pan_r, raw);
    }

    let normalized = if voices > 1 {
        let divisor = unison_divisor(voices) as i32;
        (sum_l * 100 / divisor, sum_r * 100 / divisor)
    } else {
        (sum_l, sum_r)
    };

    (mul_q10(params.level, normalized.0), mul_q10(params.level, normalized.1))
}

/// Computes MIDI-note -> phase-delta for every unison voice of one
/// oscillator slot, applying octave/semitone/cent offsets and symmetric
/// unison detune.
fn set_osc_frequency(
    params: &OscillatorParams,
    deltas: &mut [u32],
    glide_targets: &mut [u32],
    midi_note: u8,
    sample_rate: u32,
    glide: bool,
) {
    let base_semitones = midi_note as f64 - 69.0 + params.octave as f64 * 12.0 + params.semitone as f64;
    let voices = params.voices.max(1) as usize;
    for (i, delta) in deltas.iter_mut().enumerate().take(voices) {
        let cents = params.unison_detune(i as u8) + params.cent as f64;
        let semitones = base_semitones + cents / 100.0;
        let freq = 440.0 * 2f64.powf(semitones / 12.0);
        let new_delta = ((freq * (1u64 << 32) as f64) / sample_rate as f64) as u32;
        // `*delta` (`phase_delta`) always becomes the new pitch target.
        // When not gliding, the glide-delta tracking value snaps straight
        // there too; when gliding, it's left where it is so the per-sample
        // lerp in `OscillatorBank::generate_sample` slides into the new
        // pitch instead of jumping.
        *delta = new_delta;
        if !glide {
            glide_targets[i] = new_delta;
        }
    }
}

/// Divides the total configured unison voices across OSC1/OSC2 by
/// [`MAX_NOTES`] to report a conservative per-voice workload estimate; used
/// only for diagnostics, not admission control (that's [`OscillatorBank::can_set_voices`]).
pub fn estimated_per_voice_unison_load(bank: &OscillatorBank) -> u32 {
    (bank.osc1.voices as u32 + bank.osc2.voices as u32) / MAX_NOTES as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wavetable::Waveform;

    #[test]
    fn disabled_oscillator_contributes_silence() {
        let bank = OscillatorBank {
            osc1: OscillatorParams::default(),
            osc2: OscillatorParams::default(),
            sub: OscillatorParams::default(),
            ring_mod: false,
        };
        let tables = WavetableStore::new();
        let mut voice = Voice::idle();
        let (l, r) = bank.generate_sample(&mut voice, &tables, None);
        assert_eq!((l, r), (0, 0));
    }

    #[test]
    fn single_voice_osc1_passes_through_table_scaled_by_level() {
        let mut bank = OscillatorBank::new();
        bank.osc1.level = Q10_ONE / 2;
        bank.osc2.source = OscillatorSource::Disabled;
        let tables = WavetableStore::new();
        let mut voice = Voice::idle();
        bank.set_frequency(&mut voice, 69, 48_000, false);
        let (l, _r) = bank.generate_sample(&mut voice, &tables, None);
        // Sine table sample 0 is 0, so output should start at zero.
        assert_eq!(l, 0);
    }

    #[test]
    fn glide_moves_delta_toward_target_without_reaching_it_in_one_step() {
        let bank = OscillatorBank::new();
        let tables = WavetableStore::new();
        let mut voice = Voice::idle();
        bank.set_frequency(&mut voice, 69, 48_000, false);
        let target = voice.osc1_phase_delta[0];
        // Start the glide from a stationary delta to observe one partial step.
        voice.osc1_glide_delta = [0; MAX_VOICE];
        voice.osc2_glide_delta = [0; MAX_VOICE];
        voice.osc_sub_glide_delta = 0;
        bank.generate_sample(&mut voice, &tables, Some(Q10_ONE / 4));
        assert!(voice.osc1_glide_delta[0] > 0);
        assert!(voice.osc1_glide_delta[0] < target);
    }

    #[test]
    fn unison_voices_beyond_max_total_are_rejected() {
        let bank = OscillatorBank::new();
        assert!(!bank.can_set_voices(UnisonTarget::Osc1, MAX_VOICE as u8 + 1));
    }

    #[test]
    fn admission_control_respects_combined_total() {
        let mut bank = OscillatorBank::new();
        bank.osc2.source = OscillatorSource::Builtin(Waveform::Saw);
        bank.osc2.voices = 6;
        assert!(!bank.can_set_voices(UnisonTarget::Osc1, 6));
        assert!(bank.can_set_voices(UnisonTarget::Osc1, 2));
    }

    #[test]
    fn admission_control_counts_sub_as_one_voice() {
        let mut bank = OscillatorBank::new();
        bank.sub.source = OscillatorSource::Builtin(Waveform::Sine);
        // osc2 stays at its default single voice, disabled.
        assert!(bank.can_set_voices(UnisonTarget::Osc1, 6));
        assert!(!bank.can_set_voices(UnisonTarget::Osc1, 7));
    }

    #[test]
    fn admission_control_sub_target_sums_osc1_and_osc2() {
        let mut bank = OscillatorBank::new();
        bank.osc1.voices = 4;
        bank.osc2.source = OscillatorSource::Builtin(Waveform::Saw);
        bank.osc2.voices = 4;
        assert!(!bank.can_set_voices(UnisonTarget::Sub, 1));
    }

    #[test]
    fn set_frequency_produces_nonzero_delta_for_audible_note() {
        let bank = OscillatorBank::new();
        let mut voice = Voice::idle();
        bank.set_frequency(&mut voice, 69, 48_000, false);
        assert!(voice.osc1_phase_delta[0] > 0);
    }

    #[test]
    fn ring_mod_combines_osc1_and_osc2() {
        let mut bank = OscillatorBank::new();
        bank.osc2.source = OscillatorSource::Builtin(Waveform::Square);
        bank.ring_mod = true;
        let tables = WavetableStore::new();
        let mut voice = Voice::idle();
        bank.set_frequency(&mut voice, 69, 48_000, false);
        // Just confirm this path doesn't panic and returns some value.
        let _ = bank.generate_sample(&mut voice, &tables, None);
    }
}
