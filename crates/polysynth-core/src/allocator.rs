//! Voice allocation: maps incoming note-on/off to one of `MAX_NOTES` voices,
//! handling reuse, stealing, forced-release caching, and age-rank bookkeeping.
//!
//! The age-rank (`actnum`) update here replaces the source firmware's
//! brittle `actnum == 3` (`== MAX_NOTES - 1`) special case with a single
//! "promote to newest, compress older" operation parameterised by
//! `MAX_NOTES`, per the re-architecture note in the system this was
//! distilled from. [`promote_actnum`](VoiceAllocator::promote_actnum) is
//! used uniformly for both a fresh note-on and a cache-replay after forced
//! release, where the source called two different code paths.

use crate::config::MAX_NOTES;
use crate::envelope::EnvelopeParams;
use crate::voice::{NoteCache, Voice, FREE_NOTE};

/// Outcome of starting a note-on, before the caller (which owns pitch and
/// envelope-parameter state) finishes wiring up the voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteOnOutcome {
    /// The note was already sounding on this slot; nothing more to do.
    Reused(usize),
    /// `slot` was active and has been put into forced release; the new
    /// note is cached and will start automatically once that finishes.
    Stolen { slot: usize },
    /// Caller should finish starting a new voice at `slot` via
    /// [`VoiceAllocator::finish_note_on`]. `was_free` indicates whether
    /// phases should be re-randomized (only true retriggers skip this).
    Start { slot: usize, was_free: bool },
    /// Out-of-range note/velocity, zero velocity, or no slot available.
    Rejected,
}

/// Owns the voice pool, the per-slot note cache, and the monophonic switch.
pub struct VoiceAllocator {
    voices: [Voice; MAX_NOTES],
    cache: [NoteCache; MAX_NOTES],
    monophonic: bool,
    rng_state: u32,
}

impl VoiceAllocator {
    pub fn new() -> Self {
        Self {
            voices: std::array::from_fn(|_| Voice::idle()),
            cache: [NoteCache::empty(); MAX_NOTES],
            monophonic: false,
            rng_state: 0x2545_F491,
        }
    }

    pub fn voice(&self, slot: usize) -> &Voice {
        &self.voices[slot]
    }

    pub fn voice_mut(&mut self, slot: usize) -> &mut Voice {
        &mut self.voices[slot]
    }

    pub fn voices(&self) -> &[Voice; MAX_NOTES] {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut [Voice; MAX_NOTES] {
        &mut self.voices
    }

    pub fn set_monophonic(&mut self, enable: bool) {
        self.monophonic = enable;
    }

    pub fn monophonic(&self) -> bool {
        self.monophonic
    }

    pub fn active_count(&self) -> u8 {
        self.voices.iter().filter(|v| v.active).count() as u8
    }

    pub fn is_note_active(&self, note: u8) -> bool {
        self.voices.iter().any(|v| v.note == note && v.active)
    }

    pub fn get_note_index(&self, note: u8) -> Option<usize> {
        self.voices.iter().position(|v| v.note == note)
    }

    /// First free slot if any voice is idle; otherwise the slot with the
    /// smallest age rank (the oldest active voice), to be stolen.
    fn get_old_slot(&self) -> Option<usize> {
        if (self.active_count() as usize) < MAX_NOTES {
            self.voices.iter().position(|v| !v.active)
        } else {
            self.voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.actnum)
                .map(|(i, _)| i)
        }
    }

    /// Begins a note-on. Does not touch oscillator pitch or envelope
    /// parameters; the caller finishes the job with
    /// [`finish_note_on`](Self::finish_note_on) when the outcome is
    /// [`NoteOnOutcome::Start`].
    pub fn begin_note_on(&mut self, note: u8, velocity: u8, cache_replay: Option<usize>) -> NoteOnOutcome {
        if note > 127 || velocity > 127 || velocity == 0 {
            return NoteOnOutcome::Rejected;
        }

        let slot = if let Some(s) = cache_replay {
            s
        } else if self.monophonic {
            0
        } else if self.is_note_active(note) {
            match self.get_note_index(note) {
                Some(s) => s,
                None => return NoteOnOutcome::Rejected,
            }
        } else {
            match self.get_old_slot() {
                Some(s) => s,
                None => return NoteOnOutcome::Rejected,
            }
        };

        if cache_replay.is_none() && self.is_note_active(note) && self.get_note_index(note) == Some(slot) {
            return NoteOnOutcome::Reused(slot);
        }

        if cache_replay.is_none() && self.voices[slot].active {
            self.voices[slot].envelope.begin_force_release();
            self.cache[slot] = NoteCache {
                processed: false,
                note,
                velocity,
            };
            return NoteOnOutcome::Stolen { slot };
        }

        let was_free = self.voices[slot].note == FREE_NOTE;
        NoteOnOutcome::Start { slot, was_free }
    }

    /// Completes a [`NoteOnOutcome::Start`]: snapshots envelope parameters,
    /// assigns gain, re-randomizes phase only for a truly free slot, and
    /// promotes the voice's age rank to newest.
    pub fn finish_note_on(
        &mut self,
        slot: usize,
        note: u8,
        gain: i32,
        params: EnvelopeParams,
        was_free: bool,
    ) {
        if was_free {
            let mut rng = self.rng_state;
            self.voices[slot].reset_phase(&mut rng);
            self.rng_state = rng;
        }
        self.voices[slot].envelope.trigger(params);
        self.voices[slot].note = note;
        self.voices[slot].gain = gain;
        self.voices[slot].active = true;
        self.promote_actnum(slot);
    }

    /// Promotes `slot` to the newest age rank, compressing every other
    /// active voice's rank to keep ranks dense over `0..active_count`.
    pub fn promote_actnum(&mut self, slot: usize) {
        let new_rank = self
            .voices
            .iter()
            .enumerate()
            .filter(|(i, v)| *i != slot && v.active && v.actnum >= 0)
            .count()
            .min(MAX_NOTES - 1) as i8;

        for (i, v) in self.voices.iter_mut().enumerate() {
            if i == slot || !v.active || v.actnum < 0 {
                continue;
            }
            if v.actnum >= new_rank {
                v.actnum -= 1;
            }
        }
        self.voices[slot].actnum = new_rank;
    }

    /// Compresses age ranks after `slot` is about to be freed: every active
    /// voice ranked above it moves down by one.
    fn compress_after_free(&mut self, slot: usize) {
        let freed_rank = self.voices[slot].actnum;
        for (i, v) in self.voices.iter_mut().enumerate() {
            if i != slot && v.active && v.actnum > freed_rank {
                v.actnum -= 1;
            }
        }
    }

    /// Frees `slot` (release/forced-release completion). Must be called
    /// after the voice's envelope has already signalled
    /// [`crate::envelope::EnvelopeTransition::Finished`].
    pub fn free_slot(&mut self, slot: usize) {
        self.compress_after_free(slot);
        self.voices[slot].active = false;
        self.voices[slot].note = FREE_NOTE;
        self.voices[slot].gain = 0;
        self.voices[slot].actnum = -1;
    }

    /// Returns and consumes `slot`'s pending cached note, if any.
    pub fn service_cache(&mut self, slot: usize) -> Option<(u8, u8)> {
        let cache = &mut self.cache[slot];
        if cache.processed {
            None
        } else {
            cache.processed = true;
            Some((cache.note, cache.velocity))
        }
    }

    pub fn note_off(&mut self, note: u8) {
        for c in self.cache.iter_mut() {
            if c.note == note && !c.processed {
                c.processed = true;
            }
        }
        if let Some(slot) = self.get_note_index(note) {
            if self.voices[slot].active {
                self.voices[slot].envelope.begin_release();
            }
        }
    }

    /// Forces every slot to an idle, empty state.
    pub fn reset(&mut self) {
        for v in self.voices.iter_mut() {
            let mut rng = self.rng_state;
            v.reset(&mut rng);
            self.rng_state = rng;
        }
    }
}

impl Default for VoiceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_params() -> EnvelopeParams {
        EnvelopeParams {
            attack: 10,
            decay: 10,
            release: 10,
            force_release: 10,
            sustain: 1024,
            level_diff: 0,
        }
    }

    #[test]
    fn note_on_allocates_free_slot_and_is_active() {
        let mut alloc = VoiceAllocator::new();
        match alloc.begin_note_on(60, 100, None) {
            NoteOnOutcome::Start { slot, was_free } => {
                assert!(was_free);
                alloc.finish_note_on(slot, 60, 512, env_params(), was_free);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(alloc.is_note_active(60));
        assert_eq!(alloc.active_count(), 1);
    }

    #[test]
    fn steal_oldest_when_full_and_rank_density_holds() {
        let mut alloc = VoiceAllocator::new();
        for note in 60..60 + MAX_NOTES as u8 {
            if let NoteOnOutcome::Start { slot, was_free } = alloc.begin_note_on(note, 100, None) {
                alloc.finish_note_on(slot, note, 512, env_params(), was_free);
            }
        }
        let ranks: Vec<i8> = alloc.voices().iter().map(|v| v.actnum).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2, 3]);

        // 5th note-on must steal the oldest (actnum == 0).
        let oldest_slot = alloc
            .voices()
            .iter()
            .position(|v| v.actnum == 0)
            .unwrap();
        match alloc.begin_note_on(70, 100, None) {
            NoteOnOutcome::Stolen { slot } => assert_eq!(slot, oldest_slot),
            other => panic!("expected steal, got {:?}", other),
        }
        assert_eq!(alloc.active_count(), MAX_NOTES as u8);
    }

    #[test]
    fn note_off_on_inactive_note_is_a_no_op() {
        let mut alloc = VoiceAllocator::new();
        alloc.note_off(99);
        assert_eq!(alloc.active_count(), 0);
    }

    #[test]
    fn zero_velocity_is_rejected_for_note_on() {
        let mut alloc = VoiceAllocator::new();
        assert_eq!(alloc.begin_note_on(60, 0, None), NoteOnOutcome::Rejected);
    }

    #[test]
    fn free_slot_compresses_ranks_to_stay_dense() {
        let mut alloc = VoiceAllocator::new();
        let mut slots = vec![];
        for note in 60..63 {
            if let NoteOnOutcome::Start { slot, was_free } = alloc.begin_note_on(note, 100, None) {
                alloc.finish_note_on(slot, note, 512, env_params(), was_free);
                slots.push(slot);
            }
        }
        // Free the middle-ranked voice and check the top rank compresses down.
        let mid_slot = alloc
            .voices()
            .iter()
            .position(|v| v.actnum == 1)
            .unwrap();
        alloc.free_slot(mid_slot);
        let ranks: Vec<i8> = alloc
            .voices()
            .iter()
            .filter(|v| v.active)
            .map(|v| v.actnum)
            .collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1]);
    }
}
