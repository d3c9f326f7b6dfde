//! AMP ADSR envelope generator.
//!
//! State lives in [`EnvelopeState`], one instance per voice. Per-sample
//! output is computed by [`EnvelopeState::sample`], table-driven exactly as
//! specified: attack, then forced release, then release, then decay, else
//! sustain — first match wins. Stage *transitions* (attack crossing into
//! decay, decay crossing into sustain, release/force-release completing)
//! are checked once per engine frame via [`EnvelopeState::frame_transition`],
//! not every sample, matching the source firmware's split between its
//! per-sample inner loop and its per-frame housekeeping pass.

use polysynth_utils::fixed::{permille_to_q10, Q10_SHIFT};

/// Envelope time/level parameters, captured per voice at note-on so that
/// later parameter edits never retroactively alter a voice already in
/// flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeParams {
    pub attack: i32,
    pub decay: i32,
    pub release: i32,
    pub force_release: i32,
    pub sustain: i32,
    pub level_diff: i32,
}

/// Result of a once-per-frame transition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeTransition {
    /// No stage boundary crossed.
    None,
    /// Release or forced release completed; the voice should be freed.
    Finished,
}

/// Per-voice envelope counters and cached gain values.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeState {
    params: EnvelopeParams,
    attack_cnt: i32,
    decay_cnt: i32,
    release_cnt: i32,
    force_release_cnt: i32,
    /// Last computed envelope output, Q1.10.
    pub adsr_gain: i32,
    /// Envelope output captured at the moment release (or forced release)
    /// began; release/force-release curves scale from this value.
    pub note_off_gain: i32,
}

impl EnvelopeState {
    /// A freshly idle envelope: no stage active, zero output.
    pub fn idle() -> Self {
        Self {
            params: EnvelopeParams::default(),
            attack_cnt: -1,
            decay_cnt: -1,
            release_cnt: -1,
            force_release_cnt: -1,
            adsr_gain: 0,
            note_off_gain: 0,
        }
    }

    /// Starts a fresh attack with the given (already-snapshotted) parameters.
    pub fn trigger(&mut self, params: EnvelopeParams) {
        self.params = params;
        self.attack_cnt = 0;
        self.decay_cnt = -1;
        self.release_cnt = -1;
        self.force_release_cnt = -1;
    }

    /// Begins a normal release from the current envelope output.
    pub fn begin_release(&mut self) {
        self.note_off_gain = self.adsr_gain;
        self.release_cnt = self.params.release;
        self.attack_cnt = -1;
        self.decay_cnt = -1;
    }

    /// Begins a forced release (voice-steal case) from the current envelope output.
    pub fn begin_force_release(&mut self) {
        self.note_off_gain = self.adsr_gain;
        self.force_release_cnt = self.params.force_release;
        self.attack_cnt = -1;
        self.decay_cnt = -1;
    }

    /// Computes this sample's envelope output (Q1.10) and advances counters.
    /// First matching stage wins: attack, forced release, release, decay,
    /// sustain.
    #[inline]
    pub fn sample(&mut self) -> i32 {
        let gain = if self.attack_cnt >= 0 && self.attack_cnt < self.params.attack {
            let out = (self.attack_cnt << Q10_SHIFT) / self.params.attack.max(1);
            self.attack_cnt += 1;
            out
        } else if self.force_release_cnt >= 0 {
            let out =
                (self.note_off_gain * self.force_release_cnt) / self.params.force_release.max(1);
            if self.force_release_cnt > 0 {
                self.force_release_cnt -= 1;
            }
            out
        } else if self.release_cnt >= 0 {
            let out = (self.note_off_gain * self.release_cnt) / self.params.release.max(1);
            if self.release_cnt > 0 {
                self.release_cnt -= 1;
            }
            out
        } else if self.decay_cnt >= 0 {
            let out =
                self.params.sustain + (self.params.level_diff * self.decay_cnt) / self.params.decay.max(1);
            if self.decay_cnt > 0 {
                self.decay_cnt -= 1;
            }
            out
        } else {
            self.params.sustain
        };

        self.adsr_gain = gain;
        gain
    }

    /// Once-per-frame stage-boundary check. Returns [`EnvelopeTransition::Finished`]
    /// when release or forced release has just completed; the caller is
    /// responsible for freeing the voice and servicing its note cache.
    pub fn frame_transition(&mut self) -> EnvelopeTransition {
        if self.attack_cnt >= 0 && self.attack_cnt >= self.params.attack {
            self.attack_cnt = -1;
            self.decay_cnt = self.params.decay;
            return EnvelopeTransition::None;
        }
        if self.release_cnt == 0 || self.force_release_cnt == 0 {
            self.release_cnt = -1;
            self.force_release_cnt = -1;
            return EnvelopeTransition::Finished;
        }
        if self.decay_cnt == 0 {
            self.decay_cnt = -1;
        }
        EnvelopeTransition::None
    }
}

impl Default for EnvelopeState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Converts a millisecond time value (clamped `0..=32000`) to a sample count,
/// matching the source's `(((ms << 10) / 1000) * sample_rate) >> 10` formula.
pub fn ms_to_samples(ms: i32, sample_rate: u32) -> i32 {
    let ms = ms.clamp(0, 32_000);
    (((ms << Q10_SHIFT) / 1000) * sample_rate as i32) >> Q10_SHIFT
}

/// Converts a `0..=1000` sustain permille value into `(sustain_q10, level_diff)`.
pub fn sustain_to_q10(permille: i32) -> (i32, i32) {
    let permille = permille.clamp(0, 1000);
    let sustain_q10 = permille_to_q10(permille);
    (sustain_q10, 1024 - sustain_q10)
}
