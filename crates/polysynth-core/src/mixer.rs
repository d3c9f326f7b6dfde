//! Final per-sample mixing stage: master pan, the LPF/HPF filter pair, and
//! the stereo feedback delay.
//!
//! Runs once per sample, after every voice's oscillator contribution has
//! been summed. Order matches the source firmware's `generate()` tail: pan
//! first, then the filter pair, then delay. Master *level* is deliberately
//! not reapplied here — per §4.7 it is folded into each voice's `gain` at
//! note-on time (see `Engine::note_on`), so changing it never retroactively
//! affects a note already sounding.

use crate::delay::DelayRing;
use crate::filter::FilterPair;
use polysynth_utils::fixed::{mul_q10, Q10_ONE};
use polysynth_utils::pan::pan_gains;

/// Converts an `i16::MAX`-scaled pan-table gain into Q1.10.
#[inline]
fn q10_from_pan_gain(gain: i16) -> i32 {
    (gain as i32 * Q10_ONE) / i16::MAX as i32
}

/// Converts a millisecond delay time into a sample count at `sample_rate`,
/// clamped to `[1, capacity)`.
pub fn delay_time_to_samples(ms: u32, sample_rate: u32, capacity: usize) -> usize {
    let samples = (ms as u64 * sample_rate as u64 / 1000) as usize;
    samples.clamp(1, capacity.saturating_sub(1).max(1))
}

/// Owns master pan, the filter pair, and the stereo delay rings.
pub struct Mixer {
    pub master_pan: u8,
    pub filters: FilterPair,
    pub delay_enabled: bool,
    /// Feedback fed back into the ring on write, Q1.10 (`<= 900/1000` per §4.7).
    pub delay_feedback: i32,
    /// Wet level mixed into the dry signal on read, Q1.10 (`<= 1000/1000`).
    pub delay_level: i32,
    delay_l: DelayRing,
    delay_r: DelayRing,
}

impl Mixer {
    pub fn new(sample_rate: u32, delay_capacity: usize) -> Self {
        Self {
            master_pan: 50,
            filters: FilterPair::new(sample_rate as f64),
            delay_enabled: false,
            delay_feedback: permille_default(500),
            delay_level: permille_default(300),
            delay_l: DelayRing::new(delay_capacity),
            delay_r: DelayRing::new(delay_capacity),
        }
    }

    pub fn set_delay_time_ms(&mut self, ms: u32, sample_rate: u32) {
        let samples = delay_time_to_samples(ms, sample_rate, self.delay_l.capacity());
        self.delay_l.set_interval(samples);
        self.delay_r.set_interval(samples);
    }

    pub fn reset_delay(&mut self) {
        self.delay_l.reset();
        self.delay_r.reset();
    }

    /// Mixes one summed voice sample (already at final amplitude — master
    /// level has already been folded into each voice's gain) down to the
    /// final stereo `i16` output.
    #[inline]
    pub fn process(&mut self, sum_l: i32, sum_r: i32) -> (i16, i16) {
        let (pan_l, pan_r) = pan_gains(self.master_pan);
        let panned_l = mul_q10(q10_from_pan_gain(pan_l), sum_l);
        let panned_r = mul_q10(q10_from_pan_gain(pan_r), sum_r);
        let dry_l = panned_l.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        let dry_r = panned_r.clamp(i16::MIN as i32, i16::MAX as i32) as i16;

        let (filtered_l, filtered_r) = self.filters.process(dry_l, dry_r);

        if !self.delay_enabled {
            self.delay_l.update();
            self.delay_r.update();
            return (filtered_l, filtered_r);
        }

        let out_l = delay_channel(&mut self.delay_l, self.delay_level, self.delay_feedback, filtered_l);
        let out_r = delay_channel(&mut self.delay_r, self.delay_level, self.delay_feedback, filtered_r);
        (out_l, out_r)
    }
}

/// One channel's worth of `delayProcess`: reads the ring's current tail,
/// mixes it into the dry input for the output sample, writes the
/// feedback-scaled tail plus dry input back into the ring, then advances.
#[inline]
fn delay_channel(ring: &mut DelayRing, level: i32, feedback: i32, input: i16) -> i16 {
    let tail = ring.read(0) as i32;
    let out = (input as i32 + mul_q10(level, tail)).clamp(i16::MIN as i32, i16::MAX as i32);
    let feedback_in = (input as i32 + mul_q10(feedback, tail)).clamp(i16::MIN as i32, i16::MAX as i32);
    ring.write(feedback_in as i16);
    ring.update();
    out as i16
}

/// `SET_DELAY`'s permille-scale defaults (300/1000 level, 500/1000 feedback),
/// matching the source firmware's `setDelay` default arguments.
fn permille_default(permille: i32) -> i32 {
    (permille << 10) / 1000
}

/// Estimated sample count until the feedback tail decays below -60 dB
/// (§4.7), given `feedback` in Q1.10 and `time_ms` the per-repeat delay time.
/// Saturates to `u32::MAX` for `feedback >= 1024` (unity or more — the tail
/// never decays).
pub fn estimate_delay_tail_samples(feedback_q10: i32, time_ms: u32, sample_rate: u32) -> u32 {
    if feedback_q10 >= Q10_ONE {
        return u32::MAX;
    }
    if feedback_q10 <= 0 {
        return 0;
    }
    let feedback_ratio = feedback_q10 as f64 / Q10_ONE as f64;
    let repeats = 0.001f64.ln() / feedback_ratio.ln();
    let reverb_time_ms = repeats * time_ms as f64;
    let samples = (reverb_time_ms / 1000.0) * sample_rate as f64;
    if samples <= 0.0 {
        0
    } else {
        samples as u32
    }
}
