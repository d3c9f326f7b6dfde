//! End-to-end scenarios against the public `Engine` API, mirroring the
//! playback-pipeline integration style of `bevy_ym2149`'s
//! `tests/integration_playback.rs`: drive the engine through a command
//! sequence, then assert on externally observable state (used-voice count,
//! note activity, output bounds) rather than on internals.

use polysynth_core::command::OscTarget;
use polysynth_core::wavetable::Waveform;
use polysynth_core::{Engine, EngineConfig};

fn engine_at(sample_rate: u32) -> Engine {
    Engine::new(EngineConfig::new(sample_rate)).expect("valid config")
}

/// Every produced sample must land in the full 16-bit signed range.
#[test]
fn bounded_output() {
    let mut engine = engine_at(48_000);
    engine.set_shape(OscTarget::Osc1, Some(Waveform::Saw));
    engine.set_voice_count(OscTarget::Osc1, 8);
    engine.set_detune(OscTarget::Osc1, 40);
    engine.set_spread(OscTarget::Osc1, 100);
    engine.note_on(69, 127);
    for _ in 0..48_000 {
        let (l, r) = engine.next_sample();
        assert!((i16::MIN..=i16::MAX).contains(&l));
        assert!((i16::MIN..=i16::MAX).contains(&r));
    }
}

/// With no note ever started and delay disabled, the engine must be
/// silent from the first sample.
#[test]
fn silence_with_no_notes() {
    let mut engine = engine_at(48_000);
    engine.set_shape(OscTarget::Osc1, Some(Waveform::Sine));
    for _ in 0..2_000 {
        let (l, r) = engine.next_sample();
        assert_eq!((l, r), (0, 0));
    }
}

/// E1 — single sine note: after 1ms the attack envelope should have
/// reached full scale, and after `release` completes the voice frees.
#[test]
fn single_sine_note_lifecycle() {
    let mut engine = engine_at(48_000);
    engine.set_shape(OscTarget::Osc1, Some(Waveform::Sine));
    engine.set_attack(1);
    engine.set_release(10);
    engine.note_on(69, 127);

    for _ in 0..48 {
        engine.next_sample();
    }
    assert_eq!(engine.used_voices(), 1);
    assert!(engine.is_note(69));

    // Let the attack settle well past 1ms, then release.
    for _ in 0..200 {
        engine.next_sample();
    }
    engine.note_off(69);

    // 10ms release + generous margin for decay/rounding.
    for _ in 0..960 {
        engine.next_sample();
    }
    assert_eq!(engine.used_voices(), 0);
    assert!(!engine.is_note(69));
}

/// E2 — polyphony and steal: with MAX_NOTES = 4, a 5th rapid note-on must
/// steal a voice rather than silently fail, and the active count never
/// exceeds capacity.
#[test]
fn polyphony_and_steal() {
    let mut engine = engine_at(48_000);
    engine.set_shape(OscTarget::Osc1, Some(Waveform::Square));
    engine.set_attack(1);
    engine.set_release(200);

    for note in 60..64 {
        engine.note_on(note, 100);
    }
    assert_eq!(engine.used_voices(), 4);

    // A 5th note-on while all four are sounding: must not panic and must
    // not grow beyond the voice pool.
    engine.note_on(64, 100);
    assert_eq!(engine.used_voices(), 4);
    for _ in 0..10 {
        engine.next_sample();
    }
    assert_eq!(engine.used_voices(), 4);
}

/// E6 — malformed command: a wire command truncated below its required
/// payload length must be dropped entirely, leaving engine state
/// unchanged, and a subsequent well-formed command must still work.
#[test]
fn malformed_command_is_dropped() {
    use polysynth_core::command::{dispatch, Command};

    // NOTE_ON normally takes {note, velocity}; one byte short of that.
    assert_eq!(Command::parse(&[0xBE, 60]), None);

    let mut engine = engine_at(48_000);
    engine.set_shape(OscTarget::Osc1, Some(Waveform::Sine));
    assert_eq!(engine.used_voices(), 0);

    // The well-formed command right after it must still start exactly one
    // voice.
    let (command, consumed) = Command::parse(&[0xBE, 60, 100]).expect("well-formed NOTE_ON");
    assert_eq!(consumed, 3);
    dispatch(&mut engine, command);
    assert_eq!(engine.used_voices(), 1);
    assert!(engine.is_note(60));
}

/// `note_off` on a note that was never on (or already released) is a
/// documented no-op, not an error.
#[test]
fn note_off_on_inactive_note_is_noop() {
    let mut engine = engine_at(48_000);
    engine.set_shape(OscTarget::Osc1, Some(Waveform::Sine));
    engine.note_off(72);
    assert_eq!(engine.used_voices(), 0);
    engine.note_on(72, 100);
    engine.note_off(99);
    assert_eq!(engine.used_voices(), 1);
}

/// Round-trip wavetable: a custom table loaded via `SET_CSHAPE` and then
/// selected must reproduce the uploaded data at integer phase increments.
#[test]
fn custom_wavetable_round_trip() {
    use polysynth_core::wavetable::{CustomSlot, WavetableStore};

    let mut table = vec![0i16; 2048];
    for (i, sample) in table.iter_mut().enumerate() {
        *sample = ((i as i32 * 37) % 65536 - 32768) as i16;
    }

    let mut store = WavetableStore::new();
    store.set_custom(CustomSlot::Osc1, &table);
    let resolved = store
        .resolve(
            polysynth_core::wavetable::OscillatorSource::Custom,
            CustomSlot::Osc1,
        )
        .expect("custom table present");
    assert_eq!(resolved.as_slice(), table.as_slice());
}

/// Delay disabled keeps the mixer a pure pass-through path (no tail after
/// the last voice ends).
#[test]
fn delay_disabled_produces_no_tail() {
    let mut engine = engine_at(48_000);
    engine.set_shape(OscTarget::Osc1, Some(Waveform::Sine));
    engine.set_attack(1);
    engine.set_release(1);
    engine.note_on(69, 127);
    for _ in 0..200 {
        engine.next_sample();
    }
    engine.note_off(69);
    for _ in 0..500 {
        engine.next_sample();
    }
    // Voice is long gone and delay was never enabled: must be silent.
    for _ in 0..100 {
        assert_eq!(engine.next_sample(), (0, 0));
    }
}

/// Delay tail: after the last voice ends, a feedback delay keeps
/// producing non-zero samples for a while, then returns to exact silence.
#[test]
fn delay_tail_decays_to_silence() {
    let mut engine = engine_at(48_000);
    engine.set_shape(OscTarget::Osc1, Some(Waveform::Sine));
    engine.set_attack(1);
    engine.set_release(1);
    engine.set_delay(true, 50, 500, 512);
    engine.note_on(69, 127);
    for _ in 0..100 {
        engine.next_sample();
    }
    engine.note_off(69);
    for _ in 0..200 {
        engine.next_sample();
    }
    assert_eq!(engine.used_voices(), 0);

    let tail = engine.delay_tail_samples();
    assert!(tail > 0);

    let mut saw_nonzero = false;
    for _ in 0..2_000 {
        let (l, r) = engine.next_sample();
        if l != 0 || r != 0 {
            saw_nonzero = true;
        }
    }
    assert!(saw_nonzero, "delay tail should be audible after note release");

    // Well past the estimated tail length, the ring must have drained.
    for _ in 0..(tail as usize * 4 + 10_000) {
        engine.next_sample();
    }
    assert_eq!(engine.next_sample(), (0, 0));
}

/// E3 — unison mix: an 8-voice detuned, fully spread unison must not peak
/// more than ~3% louder than the single-unison case, confirming the
/// level-normalisation table in `polysynth_utils::unison` does its job.
#[test]
fn unison_mix_stays_within_normalisation_budget() {
    fn peak_magnitude(configure: impl Fn(&mut Engine)) -> i32 {
        let mut engine = engine_at(48_000);
        engine.set_shape(OscTarget::Osc1, Some(Waveform::Saw));
        engine.set_attack(0);
        configure(&mut engine);
        engine.note_on(69, 127);
        let mut peak = 0i32;
        for _ in 0..200 {
            let (l, r) = engine.next_sample();
            peak = peak.max(l.unsigned_abs() as i32 + r.unsigned_abs() as i32);
        }
        peak
    }

    let single = peak_magnitude(|_| {});
    let unison = peak_magnitude(|e| {
        e.set_voice_count(OscTarget::Osc1, 8);
        e.set_detune(OscTarget::Osc1, 200);
        e.set_spread(OscTarget::Osc1, 100);
    });

    assert!(
        unison as f64 <= single as f64 * 1.03,
        "unison peak {unison} exceeded single-voice peak {single} by more than 3%"
    );
}

/// E4 — LPF smoke test: a 200 Hz/Q≈0.707 lowpass applied to a square wave
/// at MIDI 69 (≈440 Hz) must suppress the second harmonic (≈880 Hz) at
/// least 20 dB below the fundamental, confirmed via a single-bin Goertzel
/// magnitude estimate (no FFT dependency needed for two known bins).
#[test]
fn lpf_smoke_suppresses_second_harmonic() {
    fn goertzel_magnitude(samples: &[f64], target_hz: f64, sample_rate: f64) -> f64 {
        let k = (0.5 + samples.len() as f64 * target_hz / sample_rate).floor();
        let omega = 2.0 * std::f64::consts::PI * k / samples.len() as f64;
        let coeff = 2.0 * omega.cos();
        let (mut s_prev, mut s_prev2) = (0.0, 0.0);
        for &x in samples {
            let s = x + coeff * s_prev - s_prev2;
            s_prev2 = s_prev;
            s_prev = s;
        }
        (s_prev2 * s_prev2 + s_prev * s_prev - coeff * s_prev * s_prev2).max(0.0).sqrt()
    }

    let mut engine = engine_at(48_000);
    engine.set_shape(OscTarget::Osc1, Some(Waveform::Square));
    engine.set_attack(0);
    engine.set_lpf(true, 200.0, 1.0 / std::f64::consts::SQRT_2);
    engine.note_on(69, 127);

    // Let the filter settle, then capture a steady-state analysis window.
    for _ in 0..4_000 {
        engine.next_sample();
    }
    let window: Vec<f64> = (0..4_096).map(|_| engine.next_sample().0 as f64).collect();

    let fundamental_hz = 440.0;
    let fundamental = goertzel_magnitude(&window, fundamental_hz, 48_000.0);
    let second_harmonic = goertzel_magnitude(&window, fundamental_hz * 2.0, 48_000.0);

    assert!(fundamental > 0.0, "fundamental magnitude should be nonzero");
    let ratio_db = 20.0 * (second_harmonic / fundamental).log10();
    assert!(
        ratio_db <= -20.0,
        "second harmonic only {ratio_db:.1} dB below fundamental (want <= -20 dB)"
    );
}

/// `sound_stop` must force every voice idle immediately, regardless of
/// envelope stage.
#[test]
fn sound_stop_clears_all_voices() {
    let mut engine = engine_at(48_000);
    engine.set_shape(OscTarget::Osc1, Some(Waveform::Sine));
    for note in 60..64 {
        engine.note_on(note, 100);
    }
    assert_eq!(engine.used_voices(), 4);
    engine.sound_stop();
    assert_eq!(engine.used_voices(), 0);
    for note in 60..64 {
        assert!(!engine.is_note(note));
    }
}
