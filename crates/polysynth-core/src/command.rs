//! Wire command parsing and dispatch.
//!
//! Opcodes mirror the source firmware's `SYNTH_*` instruction set
//! (`0xBE..=0xD1`), one opcode per byte followed by a fixed-size payload.
//! Multi-byte numeric fields are little-endian, resolving the byte-order
//! ambiguity the distilled spec flagged for `SET_ATTACK`/`SET_DECAY`/
//! `SET_RELEASE`/`SET_SUSTAIN`.
//!
//! Parsing and dispatch are both infallible: a malformed or truncated
//! command is dropped and logged, never propagated as an error (see
//! [`crate::error`]).

use crate::engine::Engine;
use crate::wavetable::{CustomSlot, Waveform};

/// Which oscillator slot a per-oscillator command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscTarget {
    Osc1,
    Osc2,
    Sub,
}

impl OscTarget {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Osc1),
            1 => Some(Self::Osc2),
            2 => Some(Self::Sub),
            _ => None,
        }
    }
}

/// A fully parsed command, ready to apply to an [`Engine`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    SetShape { target: OscTarget, waveform: Option<Waveform> },
    SoundStop,
    SetPan { pan: u8 },
    SetAttack { ms: u16 },
    SetRelease { ms: u16 },
    SetDecay { ms: u16 },
    SetSustain { permille: u16 },
    GetUsed,
    IsNote { note: u8 },
    SetCustomShape { slot: CustomSlot, data: Vec<i16> },
    SetVoice { target: OscTarget, count: u8 },
    SetDetune { target: OscTarget, detune: u8 },
    SetSpread { target: OscTarget, spread: u8 },
    SetOctave { target: OscTarget, octave: i8 },
    SetSemitone { target: OscTarget, semitone: i8 },
    SetCent { target: OscTarget, cent: i8 },
    SetLevel { permille: u16 },
    SetOscLevel { target: OscTarget, permille: u16 },
    SetLpf { enable: bool, freq: f32, q: f32 },
    SetHpf { enable: bool, freq: f32, q: f32 },
    SetDelay { enable: bool, time_ms: u16, level: u16, feedback: u16 },
    SetMod { ring_mod: bool },
    SetMonophonic { enable: bool },
    SetGlide { enable: bool, time_ms: u16 },
    ResetParam,
}

/// Result of applying a query command; the bus-transport framing
/// (`DATA_BEGIN`/`DATA_END`/etc.) is out of scope here, see [`SPEC_FULL.md`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    UsedVoices(u8),
    NoteActive(bool),
}

mod opcode {
    pub const NOTE_ON: u8 = 0xBE;
    pub const NOTE_OFF: u8 = 0xBF;
    pub const SET_SHAPE: u8 = 0xC0;
    pub const SOUND_STOP: u8 = 0xC1;
    pub const SET_PAN: u8 = 0xC2;
    pub const SET_ATTACK: u8 = 0xC3;
    pub const SET_RELEASE: u8 = 0xC4;
    pub const SET_DECAY: u8 = 0xC5;
    pub const SET_SUSTAIN: u8 = 0xC6;
    pub const GET_USED: u8 = 0xC7;
    pub const IS_NOTE: u8 = 0xC8;
    pub const SET_CSHAPE: u8 = 0xC9;
    pub const SET_VOICE: u8 = 0xCA;
    pub const SET_DETUNE: u8 = 0xCB;
    pub const SET_SPREAD: u8 = 0xCC;
    pub const SET_OCT: u8 = 0xCD;
    pub const SET_SEMI: u8 = 0xCE;
    pub const SET_CENT: u8 = 0xCF;
    pub const SET_LEVEL: u8 = 0xD0;
    pub const SET_OSC_LVL: u8 = 0xD1;
    pub const SET_LPF: u8 = 0xD2;
    pub const SET_HPF: u8 = 0xD3;
    pub const SET_DELAY: u8 = 0xD4;
    pub const SET_MOD: u8 = 0xD5;
    pub const SET_MONO: u8 = 0xD6;
    pub const SET_GLIDE: u8 = 0xD7;
    pub const RESET_PARAM: u8 = 0xD8;
}

/// `id = 0xFF` disables the target oscillator (outer `None`); any other
/// unrecognized id is a malformed command (inner `None`, propagated as the
/// whole `?` chain failing in [`Command::parse`]).
fn waveform_from_byte(b: u8) -> Option<Option<Waveform>> {
    match b {
        0 => Some(Some(Waveform::Sine)),
        1 => Some(Some(Waveform::Triangle)),
        2 => Some(Some(Waveform::Saw)),
        3 => Some(Some(Waveform::Square)),
        0xFF => Some(None),
        _ => None,
    }
}

fn read_u16_le(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_le_bytes([*bytes.first()?, *bytes.get(1)?]))
}

/// `SET_LEVEL`/`SET_OSC_LVL` encode their payload as `hi, lo` — big-endian,
/// per SPEC_FULL's resolution of spec.md's byte-order ambiguity.
fn read_u16_be(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([*bytes.first()?, *bytes.get(1)?]))
}

fn read_f32_le(bytes: &[u8]) -> Option<f32> {
    Some(f32::from_le_bytes([
        *bytes.first()?,
        *bytes.get(1)?,
        *bytes.get(2)?,
        *bytes.get(3)?,
    ]))
}

impl Command {
    /// Parses one command from the front of `bytes`. Returns the command
    /// and how many bytes it consumed, or `None` if `bytes` doesn't hold a
    /// complete, recognized command (the caller should drop the opcode byte
    /// and retry on the next byte, or wait for more data).
    pub fn parse(bytes: &[u8]) -> Option<(Command, usize)> {
        let op = bytes.first().copied();
        let result = Self::try_parse(bytes);
        if result.is_none() {
            if let Some(op) = op {
                log::debug!("dropping malformed or truncated command, opcode={op:#04x}");
            }
        }
        result
    }

    fn try_parse(bytes: &[u8]) -> Option<(Command, usize)> {
        let op = *bytes.first()?;
        let body = &bytes[1..];
        match op {
            opcode::NOTE_ON => Some((
                Command::NoteOn {
                    note: *body.first()?,
                    velocity: *body.get(1)?,
                },
                3,
            )),
            opcode::NOTE_OFF => Some((Command::NoteOff { note: *body.first()? }, 2)),
            opcode::SET_SHAPE => {
                let target = OscTarget::from_byte(*body.first()?)?;
                let waveform = waveform_from_byte(*body.get(1)?)?;
                Some((Command::SetShape { target, waveform }, 3))
            }
            opcode::SOUND_STOP => Some((Command::SoundStop, 1)),
            opcode::SET_PAN => Some((Command::SetPan { pan: *body.first()? }, 2)),
            opcode::SET_ATTACK => Some((Command::SetAttack { ms: read_u16_le(body)? }, 3)),
            opcode::SET_RELEASE => Some((Command::SetRelease { ms: read_u16_le(body)? }, 3)),
            opcode::SET_DECAY => Some((Command::SetDecay { ms: read_u16_le(body)? }, 3)),
            opcode::SET_SUSTAIN => Some((
                Command::SetSustain {
                    permille: read_u16_le(body)?,
                },
                3,
            )),
            opcode::GET_USED => Some((Command::GetUsed, 1)),
            opcode::IS_NOTE => Some((Command::IsNote { note: *body.first()? }, 2)),
            opcode::SET_CSHAPE => {
                let slot = match *body.first()? {
                    0 => CustomSlot::Osc1,
                    1 => CustomSlot::Osc2,
                    _ => return None,
                };
                let payload = &body[1..];
                let samples: Vec<i16> = payload
                    .chunks_exact(2)
                    .map(|c| i16::from_le_bytes([c[0], c[1]]))
                    .collect();
                Some((Command::SetCustomShape { slot, data: samples }, 2 + payload.len()))
            }
            opcode::SET_VOICE => {
                let count = *body.first()?;
                let target = OscTarget::from_byte(*body.get(1)?)?;
                Some((Command::SetVoice { target, count }, 3))
            }
            opcode::SET_DETUNE => {
                let detune = *body.first()?;
                let target = OscTarget::from_byte(*body.get(1)?)?;
                Some((Command::SetDetune { target, detune }, 3))
            }
            opcode::SET_SPREAD => {
                let spread = *body.first()?;
                let target = OscTarget::from_byte(*body.get(1)?)?;
                Some((Command::SetSpread { target, spread }, 3))
            }
            opcode::SET_OCT => {
                let target = OscTarget::from_byte(*body.first()?)?;
                Some((
                    Command::SetOctave {
                        target,
                        octave: *body.get(1)? as i8,
                    },
                    3,
                ))
            }
            opcode::SET_SEMI => {
                let target = OscTarget::from_byte(*body.first()?)?;
                Some((
                    Command::SetSemitone {
                        target,
                        semitone: *body.get(1)? as i8,
                    },
                    3,
                ))
            }
            opcode::SET_CENT => {
                let target = OscTarget::from_byte(*body.first()?)?;
                Some((
                    Command::SetCent {
                        target,
                        cent: *body.get(1)? as i8,
                    },
                    3,
                ))
            }
            opcode::SET_LEVEL => Some((
                Command::SetLevel {
                    permille: read_u16_be(body)?,
                },
                3,
            )),
            opcode::SET_OSC_LVL => {
                let target = OscTarget::from_byte(*body.first()?)?;
                let permille = read_u16_be(&body[1..])?;
                Some((Command::SetOscLevel { target, permille }, 4))
            }
            opcode::SET_LPF => {
                let enable = *body.first()? != 0;
                if enable {
                    let freq = read_f32_le(&body[1..])?;
                    let q = read_f32_le(&body[5..])?;
                    Some((Command::SetLpf { enable, freq, q }, 10))
                } else {
                    Some((Command::SetLpf { enable, freq: 0.0, q: 0.0 }, 2))
                }
            }
            opcode::SET_HPF => {
                let enable = *body.first()? != 0;
                if enable {
                    let freq = read_f32_le(&body[1..])?;
                    let q = read_f32_le(&body[5..])?;
                    Some((Command::SetHpf { enable, freq, q }, 10))
                } else {
                    Some((Command::SetHpf { enable, freq: 0.0, q: 0.0 }, 2))
                }
            }
            opcode::SET_DELAY => {
                let enable = *body.first()? != 0;
                if enable {
                    let time_ms = read_u16_le(&body[1..])?;
                    let level = read_u16_le(&body[3..])?;
                    let feedback = read_u16_le(&body[5..])?;
                    Some((
                        Command::SetDelay {
                            enable,
                            time_ms,
                            level,
                            feedback,
                        },
                        8,
                    ))
                } else {
                    Some((
                        Command::SetDelay {
                            enable,
                            time_ms: 0,
                            level: 0,
                            feedback: 0,
                        },
                        2,
                    ))
                }
            }
            opcode::SET_MOD => Some((
                Command::SetMod {
                    ring_mod: *body.first()? != 0,
                },
                2,
            )),
            opcode::SET_MONO => Some((
                Command::SetMonophonic {
                    enable: *body.first()? != 0,
                },
                2,
            )),
            opcode::SET_GLIDE => {
                let enable = *body.first()? != 0;
                let time_ms = read_u16_le(&body[1..])?;
                Some((Command::SetGlide { enable, time_ms }, 4))
            }
            opcode::RESET_PARAM => Some((Command::ResetParam, 1)),
            _ => None,
        }
    }
}

/// Applies a parsed command to the engine, returning a [`Response`] for
/// query commands. Out-of-range values are clamped by the engine's setters,
/// never rejected here.
pub fn dispatch(engine: &mut Engine, command: Command) -> Option<Response> {
    match command {
        Command::NoteOn { note, velocity } => {
            engine.note_on(note, velocity);
            None
        }
        Command::NoteOff { note } => {
            engine.note_off(note);
            None
        }
        Command::SetShape { target, waveform } => {
            engine.set_shape(target, waveform);
            None
        }
        Command::SoundStop => {
            engine.sound_stop();
            None
        }
        Command::SetPan { pan } => {
            engine.set_pan(pan);
            None
        }
        Command::SetAttack { ms } => {
            engine.set_attack(ms);
            None
        }
        Command::SetRelease { ms } => {
            engine.set_release(ms);
            None
        }
        Command::SetDecay { ms } => {
            engine.set_decay(ms);
            None
        }
        Command::SetSustain { permille } => {
            engine.set_sustain(permille);
            None
        }
        Command::GetUsed => Some(Response::UsedVoices(engine.used_voices())),
        Command::IsNote { note } => Some(Response::NoteActive(engine.is_note(note))),
        Command::SetCustomShape { slot, data } => {
            engine.set_custom_shape(slot, &data);
            None
        }
        Command::SetVoice { target, count } => {
            engine.set_voice_count(target, count);
            None
        }
        Command::SetDetune { target, detune } => {
            engine.set_detune(target, detune);
            None
        }
        Command::SetSpread { target, spread } => {
            engine.set_spread(target, spread);
            None
        }
        Command::SetOctave { target, octave } => {
            engine.set_octave(target, octave);
            None
        }
        Command::SetSemitone { target, semitone } => {
            engine.set_semitone(target, semitone);
            None
        }
        Command::SetCent { target, cent } => {
            engine.set_cent(target, cent);
            None
        }
        Command::SetLevel { permille } => {
            engine.set_master_level(permille);
            None
        }
        Command::SetOscLevel { target, permille } => {
            engine.set_osc_level(target, permille);
            None
        }
        Command::SetLpf { enable, freq, q } => {
            engine.set_lpf(enable, freq, q);
            None
        }
        Command::SetHpf { enable, freq, q } => {
            engine.set_hpf(enable, freq, q);
            None
        }
        Command::SetDelay {
            enable,
            time_ms,
            level,
            feedback,
        } => {
            engine.set_delay(enable, time_ms, level, feedback);
            None
        }
        Command::SetMod { ring_mod } => {
            engine.set_ring_mod(ring_mod);
            None
        }
        Command::SetMonophonic { enable } => {
            engine.set_monophonic(enable);
            None
        }
        Command::SetGlide { enable, time_ms } => {
            engine.set_glide(enable, time_ms);
            None
        }
        Command::ResetParam => {
            engine.reset_parameters();
            None
        }
    }
}
