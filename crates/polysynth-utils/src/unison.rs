//! Unison level-normalisation constants.
//!
//! Summing `n` detuned copies of the same waveform raises peak amplitude
//! roughly as `sqrt(n)`. These divisors (expressed as percent, i.e. `141`
//! means "divide by 1.41") were chosen empirically to keep the summed peak
//! close to a single voice's peak across `2..=8` unison voices, and are also
//! reused to normalise the OSC1+OSC2(+SUB) mix when more than one oscillator
//! is enabled.

/// Indexed by `unison_count - 2` for counts `2..=8`; index `0` and `2` double
/// as the two-oscillator and three-oscillator mix divisors respectively.
pub const DIVIDE_FIXED: [u16; 7] = [141, 173, 200, 224, 245, 265, 283];

/// Returns the percent divisor for `count` unison voices (`count >= 2`).
///
/// Callers must not invoke this for `count < 2`; a single voice needs no
/// normalisation and is handled separately by oscillator code.
#[inline]
pub fn unison_divisor(count: u8) -> u16 {
    debug_assert!(count >= 2, "unison_divisor is undefined for count < 2");
    let idx = (count.saturating_sub(2)) as usize;
    DIVIDE_FIXED[idx.min(DIVIDE_FIXED.len() - 1)]
}

/// Divisor applied to the oscillator mix when exactly two oscillators are active.
pub const TWO_OSC_DIVIDE: u16 = DIVIDE_FIXED[0];
/// Divisor applied to the oscillator mix when all three oscillators are active.
pub const THREE_OSC_DIVIDE: u16 = DIVIDE_FIXED[2];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_voices_matches_table_head() {
        assert_eq!(unison_divisor(2), 141);
    }

    #[test]
    fn eight_voices_matches_table_tail() {
        assert_eq!(unison_divisor(8), 283);
    }
}
