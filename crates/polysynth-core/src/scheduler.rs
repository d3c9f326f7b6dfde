//! Dual-core cooperative scheduler.
//!
//! The source firmware splits each frame's work across two physical cores,
//! handshaking through a shared mailbox whose mode field the datasheet marks
//! `volatile` in some places and plain in others — an inconsistency this
//! crate resolves by making the mailbox field an `AtomicU8` with explicit
//! `Release`/`Acquire` ordering at every mode transition, the same
//! discipline this codebase uses elsewhere for lock-free state (see the
//! ring-buffer cursor handling pattern this crate's sibling audio code uses
//! atomics for).
//!
//! This crate runs the two "cores" as two closures invoked in sequence
//! within [`Scheduler::run_frame`] rather than as free-running OS threads:
//! the source hardware's second core exists to hide per-sample work behind
//! the first core's output stage, but nothing in this engine's public API
//! depends on that overlap, and running synchronously keeps every
//! `process_frame` call deterministic and directly testable. The mailbox
//! and mode machine are kept faithfully regardless, since they define the
//! actual handshake contract (what data core 1 may touch and when), not
//! just a threading detail.

use std::sync::atomic::{AtomicU8, Ordering};

/// Pipeline stage currently owned by core 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CalcMode {
    /// No cross-core work outstanding.
    Idle = 0,
    /// Core 1 is computing oscillator samples for the active voices.
    Note = 1,
    /// Core 1 is recomputing phase deltas after a pitch-affecting parameter change.
    SetF = 2,
    /// Core 1 is applying master pan and the filter pair.
    PanFilter = 3,
}

impl CalcMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Note,
            2 => Self::SetF,
            3 => Self::PanFilter,
            _ => Self::Idle,
        }
    }
}

/// The shared mode flag two cores hand off through. A real split-core
/// deployment would also carry cross-core argument fields here (e.g. the
/// pending MIDI note for [`CalcMode::SetF`]); this engine passes those as
/// plain closure captures instead, since both "cores" run on the same
/// stack.
#[derive(Debug, Default)]
pub struct Mailbox {
    mode: AtomicU8,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(CalcMode::Idle as u8),
        }
    }

    pub fn mode(&self) -> CalcMode {
        CalcMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    fn set_mode(&self, mode: CalcMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }
}

/// Drives the per-sample CALC_NOTE -> CALC_SET_F -> CALC_PAN_FILTER handoff
/// sequence. Holds only the mailbox; [`crate::engine::Engine::next_sample`]
/// calls [`Scheduler::enter`] at each stage boundary around the
/// corresponding inline work, so the mailbox always reflects which stage is
/// conceptually "owned by core 1" at any point during a sample.
#[derive(Debug, Default)]
pub struct Scheduler {
    mailbox: Mailbox,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            mailbox: Mailbox::new(),
        }
    }

    pub fn mode(&self) -> CalcMode {
        self.mailbox.mode()
    }

    /// Transitions the mailbox to `mode`. Call with [`CalcMode::Idle`] once
    /// the sample's pipeline has fully drained.
    pub fn enter(&self, mode: CalcMode) {
        self.mailbox.set_mode(mode);
    }

    /// Drives one output sample's CALC_NOTE -> CALC_PAN_FILTER handoff,
    /// matching §4.8's per-sample pipeline. `note_fn` computes every voice's
    /// contribution, `set_f_fn` is the out-of-band pitch recompute a
    /// pending `note_on` may have queued, and `pan_filter_fn` applies
    /// master pan + the filter pair to the R channel. Returns the mailbox
    /// to [`CalcMode::Idle`] before returning.
    pub fn run_frame<A, B, C>(&self, note_fn: A, set_f_fn: B, pan_filter_fn: C)
    where
        A: FnOnce(),
        B: FnOnce(),
        C: FnOnce(),
    {
        self.enter(CalcMode::Note);
        note_fn();
        self.enter(CalcMode::SetF);
        set_f_fn();
        self.enter(CalcMode::PanFilter);
        pan_filter_fn();
        self.enter(CalcMode::Idle);
    }
}
