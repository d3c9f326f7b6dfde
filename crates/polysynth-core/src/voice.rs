//! Per-voice (per-"Note", in the source firmware's terminology) state.
//!
//! A [`Voice`] is one polyphony slot: oscillator phase/phase-delta/glide
//! arrays for OSC1 and OSC2 (one entry per unison voice), a single
//! sub-oscillator phase, and an [`EnvelopeState`]. Slots are allocated once
//! at engine construction and reused for the engine's lifetime — see
//! [`crate::allocator::VoiceAllocator`] for assignment policy.

use crate::config::MAX_VOICE;
use crate::envelope::EnvelopeState;

/// Sentinel `note` value meaning "this slot is free".
pub const FREE_NOTE: u8 = 0xFF;

/// One polyphony slot.
#[derive(Debug, Clone)]
pub struct Voice {
    pub active: bool,
    /// MIDI note number, or [`FREE_NOTE`] when unassigned.
    pub note: u8,
    /// Age rank: higher is newer, `-1` means free. Dense over `0..active_count`.
    pub actnum: i8,
    /// Velocity-scaled amplitude, Q1.10.
    pub gain: i32,

    pub osc1_phase: [u32; MAX_VOICE],
    pub osc2_phase: [u32; MAX_VOICE],
    pub osc_sub_phase: u32,

    pub osc1_phase_delta: [u32; MAX_VOICE],
    pub osc2_phase_delta: [u32; MAX_VOICE],
    pub osc_sub_phase_delta: u32,

    /// Glide-in-progress phase delta; in glide mode this, not
    /// `oscN_phase_delta`, is what advances phase each sample.
    pub osc1_glide_delta: [u32; MAX_VOICE],
    pub osc2_glide_delta: [u32; MAX_VOICE],
    pub osc_sub_glide_delta: u32,

    pub envelope: EnvelopeState,
}

impl Voice {
    /// A freshly idle, unassigned voice.
    pub fn idle() -> Self {
        Self {
            active: false,
            note: FREE_NOTE,
            actnum: -1,
            gain: 0,
            osc1_phase: [0; MAX_VOICE],
            osc2_phase: [0; MAX_VOICE],
            osc_sub_phase: 0,
            osc1_phase_delta: [0; MAX_VOICE],
            osc2_phase_delta: [0; MAX_VOICE],
            osc_sub_phase_delta: 0,
            osc1_glide_delta: [0; MAX_VOICE],
            osc2_glide_delta: [0; MAX_VOICE],
            osc_sub_glide_delta: 0,
            envelope: EnvelopeState::idle(),
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        !self.active
    }

    /// Re-randomizes oscillator phases. Called only when a truly free slot
    /// is reused, so retriggering an already-sounding note never clicks.
    pub fn reset_phase(&mut self, rng_state: &mut u32) {
        for i in 0..MAX_VOICE {
            let r = next_phase_seed(rng_state);
            self.osc1_phase[i] = r;
            self.osc2_phase[i] = r;
            if i == 0 {
                self.osc_sub_phase = r;
            }
        }
    }

    /// Zeroes every phase-delta array (used by `note_reset`).
    pub fn reset_phase_delta(&mut self) {
        self.osc1_phase_delta = [0; MAX_VOICE];
        self.osc2_phase_delta = [0; MAX_VOICE];
        self.osc_sub_phase_delta = 0;
    }

    /// Resets this slot to fully idle, matching `noteReset()`'s per-voice body.
    pub fn reset(&mut self, rng_state: &mut u32) {
        self.reset_phase(rng_state);
        self.reset_phase_delta();
        self.active = false;
        self.actnum = -1;
        self.note = FREE_NOTE;
        self.gain = 0;
        self.envelope = EnvelopeState::idle();
    }
}

/// A simple xorshift step used in place of `rand()` for phase
/// randomization. Deterministic given a seed, which keeps output
/// reproducible for identical command histories (§8 property 3).
#[inline]
fn next_phase_seed(state: &mut u32) -> u32 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *state = x;
    x
}

/// Holds a pending `(note, velocity)` that arrived while its target slot was
/// still in forced release. At most one pending note per slot.
#[derive(Debug, Clone, Copy)]
pub struct NoteCache {
    pub processed: bool,
    pub note: u8,
    pub velocity: u8,
}

impl NoteCache {
    pub fn empty() -> Self {
        Self {
            processed: true,
            note: 0,
            velocity: 0,
        }
    }
}
