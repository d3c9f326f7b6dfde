//! Renders a fixed command script through [`polysynth_core::Engine`] to a
//! WAV file.
//!
//! The original firmware's `main.cpp` is a thin Arduino `setup()`/`loop()`
//! that reads UART bytes and blinks a status LED — out of scope for this
//! crate (see `SPEC_FULL.md` §2). What it never gave a developer was a way
//! to just hear the engine work, so this binary drives the engine with a
//! short scripted performance instead of a live bus, and writes the result
//! to a WAV file with `hound`, the same way `ym-replayer`'s
//! `export/wav.rs` renders a tracker song to disk.

use std::path::PathBuf;
use std::process;

use polysynth_core::command::OscTarget;
use polysynth_core::wavetable::Waveform;
use polysynth_core::{Engine, EngineConfig};

struct CliArgs {
    output: PathBuf,
    sample_rate: u32,
}

fn print_usage_and_exit(code: i32) -> ! {
    eprintln!("Usage: render-demo [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --out <file.wav>        Output WAV path [default: demo.wav]");
    eprintln!("  --sample-rate <hz>      Output sample rate [default: 48000]");
    eprintln!("  -h, --help              Show this help");
    process::exit(code);
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut output = PathBuf::from("demo.wav");
    let mut sample_rate = 48_000u32;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--out" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("Missing value for --out");
                    print_usage_and_exit(1);
                };
                output = PathBuf::from(value);
            }
            "--sample-rate" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("Missing value for --sample-rate");
                    print_usage_and_exit(1);
                };
                sample_rate = value.parse().unwrap_or_else(|_| {
                    eprintln!("Invalid --sample-rate value '{value}'");
                    print_usage_and_exit(1);
                });
            }
            "-h" | "--help" => print_usage_and_exit(0),
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage_and_exit(1);
            }
        }
        i += 1;
    }

    CliArgs { output, sample_rate }
}

/// One scheduled performance event: fires once the render loop's sample
/// counter reaches `at_sample`.
struct Event {
    at_sample: u64,
    action: Box<dyn Fn(&mut Engine)>,
}

fn event(at_sample: u64, action: impl Fn(&mut Engine) + 'static) -> Event {
    Event {
        at_sample,
        action: Box::new(action),
    }
}

/// Builds the fixed command script: a short arpeggio over a detuned
/// unison saw pad with the LPF sweeping in, then a chord that demonstrates
/// voice stealing against `MAX_NOTES`, then a single short note through
/// the feedback delay so the tail is audible after the note itself ends.
fn build_script(sample_rate: u32) -> (Vec<Event>, u64) {
    let sr = sample_rate as u64;
    let mut events = Vec::new();

    events.push(event(0, |e: &mut Engine| {
        e.set_shape(OscTarget::Osc1, Some(Waveform::Saw));
        e.set_voice_count(OscTarget::Osc1, 4);
        e.set_detune(OscTarget::Osc1, 25);
        e.set_spread(OscTarget::Osc1, 80);
        e.set_attack(5);
        e.set_decay(300);
        e.set_sustain(700);
        e.set_release(250);
        e.set_pan(50);
        e.set_lpf(true, 1_200.0, 0.9);
    }));

    // Arpeggio: A3, C#4, E4, A4, each a quarter second apart.
    let arpeggio = [57u8, 61, 64, 69];
    for (i, &note) in arpeggio.iter().enumerate() {
        let at = i as u64 * sr / 2;
        events.push(event(at, move |e: &mut Engine| e.note_on(note, 110)));
        events.push(event(at + sr / 2 - sr / 16, move |e: &mut Engine| {
            e.note_off(note)
        }));
    }

    let chord_start = arpeggio.len() as u64 * sr / 2 + sr / 2;

    // Polyphony + steal demo: MAX_NOTES = 4, so the 5th note-on here steals
    // the oldest (A3).
    let chord = [57u8, 60, 64, 67, 72];
    for (i, &note) in chord.iter().enumerate() {
        let at = chord_start + i as u64 * sr / 8;
        events.push(event(at, move |e: &mut Engine| e.note_on(note, 100)));
    }
    let chord_release_at = chord_start + sr;
    for &note in &chord {
        events.push(event(chord_release_at, move |e: &mut Engine| {
            e.note_off(note)
        }));
    }

    let delay_start = chord_release_at + sr;
    events.push(event(delay_start, |e: &mut Engine| {
        e.set_lpf(false, 1_200.0, 0.707);
        e.set_voice_count(OscTarget::Osc1, 1);
        e.set_detune(OscTarget::Osc1, 0);
        e.set_attack(2);
        e.set_release(80);
        e.set_delay(true, 220, 550, 520);
    }));
    events.push(event(delay_start + sr / 8, |e: &mut Engine| {
        e.note_on(69, 127);
    }));
    events.push(event(delay_start + sr / 4, |e: &mut Engine| {
        e.note_off(69);
    }));

    // Tail + 2s of headroom for the delay to ring out and the engine to
    // settle back to silence.
    let total = delay_start + sr / 4 + sr * 2;
    events.sort_by_key(|e| e.at_sample);
    (events, total)
}

fn main() {
    env_logger::init();
    let cli = parse_args();

    let config = EngineConfig::new(cli.sample_rate);
    let mut engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to build engine: {e}");
            process::exit(1);
        }
    };

    let (events, total_samples) = build_script(cli.sample_rate);
    println!(
        "Rendering {} samples ({:.1}s) at {} Hz to {}...",
        total_samples,
        total_samples as f64 / cli.sample_rate as f64,
        cli.sample_rate,
        cli.output.display()
    );

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: cli.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = match hound::WavWriter::create(&cli.output, spec) {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("Failed to create {}: {e}", cli.output.display());
            process::exit(1);
        }
    };

    let mut next_event = 0usize;
    for sample_idx in 0..total_samples {
        while next_event < events.len() && events[next_event].at_sample == sample_idx {
            (events[next_event].action)(&mut engine);
            next_event += 1;
        }

        let (l, r) = engine.next_sample();
        if let Err(e) = writer.write_sample(l).and_then(|_| writer.write_sample(r)) {
            eprintln!("Failed to write sample: {e}");
            process::exit(1);
        }
    }

    if let Err(e) = writer.finalize() {
        eprintln!("Failed to finalize {}: {e}", cli.output.display());
        process::exit(1);
    }

    println!("Done. Peak voices in use during render were bounded by MAX_NOTES.");
}
