//! Calibration wizard state machines.
//!
//! All three wizards follow one pattern: a linear sequence of named states
//! advanced by Next/Previous navigation, where selected states trigger
//! device actions on entry and some branch on sensor checks or user
//! confirmation. Transitions are pure — `handle` returns the new state
//! plus a fixed-capacity effect list, and the [`runner`] executes those
//! effects against the channel, feeding sensor/confirmation results back
//! in as events. The wizards themselves never touch the device, so every
//! branch is testable without hardware.

pub mod check;
pub mod hotel;
pub mod runner;
pub mod stage;

use sl_common::axis::Axis;

/// Upper bound on effects emitted by a single transition.
pub const MAX_EFFECTS: usize = 4;

/// Fixed-capacity effect list; transitions never allocate.
pub type Effects = heapless::Vec<Effect, MAX_EFFECTS>;

/// Input events driving wizard transitions.
///
/// `Next`/`Previous` come from the operator; the rest are fed back by the
/// effect runner after executing probe or confirmation effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardEvent {
    /// Operator pressed "next".
    Next,
    /// Operator pressed "previous".
    Previous,
    /// Answer from the confirmation capability.
    Confirmed(bool),
    /// Result of a single hotel presence probe.
    HotelFitted(bool),
    /// Result of probing both hotel slots.
    HotelsFitted(bool),
    /// Result of the tray-on-stage sensor probe.
    TrayOnStage(bool),
    /// Result of the apartment occupancy verification.
    OccupancyOk(bool),
    /// A device step could not run (device not idle); back-step.
    StepFailed,
}

/// Device actions requested by a transition, executed by the runner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Unload both hotel racks from the machine.
    EjectHotels,
    /// Load both hotel racks into the machine.
    LoadHotels,
    /// Probe one hotel presence sensor -> `HotelFitted`.
    ProbeHotel { hotel: u8 },
    /// Probe both hotel presence sensors -> `HotelsFitted`.
    ProbeBothHotels,
    /// Probe the tray-on-stage sensor -> `TrayOnStage`.
    ProbeTrayOnStage,
    /// Move the stage to the open-clamp reference position.
    StageToOpenClamp,
    /// Home the stage transfer shuttle.
    HomeShuttle,
    /// Enable live jog controls for the given axes (presentation hint).
    EnableJog(&'static [Axis]),
    /// Relative jog of one axis by a fixed distance.
    JogMm { axis: Axis, mm: f64 },
    /// Position the loader so a tray can be inserted by hand.
    PresentTray,
    /// Pull the manually presented tray into the stage clamp.
    PullTrayToStage,
    /// Scan one hotel's apartments.
    ScanHotel(u8),
    /// Verify apartments 1 and 20 occupied, 2-19 empty -> `OccupancyOk`.
    VerifyOccupancy,
    /// Transfer the tray at (hotel, apartment) to the stage.
    LoadTray { hotel: u8, apartment: u8 },
    /// Transfer the stage tray back to (hotel, apartment).
    UnloadTray { hotel: u8, apartment: u8 },
    /// Put a question to the operator -> `Confirmed`.
    Ask(&'static str),
    /// Record hotel alignment complete (RAM push, no EEPROM write).
    MarkHotelCalibrated,
    /// Record stage position complete (RAM push, no EEPROM write).
    MarkStageCalibrated,
}

/// Result of one transition: the state entered plus its effects.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<S> {
    pub state: S,
    pub effects: Effects,
}

/// Common shape of the three wizards, used by the generic driver in
/// [`runner::advance`].
pub trait StateMachine {
    type State: Copy + PartialEq + core::fmt::Debug;

    /// Current state.
    fn state(&self) -> Self::State;

    /// Apply one event; pure apart from the wizard's own bookkeeping.
    fn handle(&mut self, event: WizardEvent) -> Step<Self::State>;

    /// Whether the wizard reached its terminal state.
    fn is_complete(&self) -> bool;
}

/// Build an effect list from a fixed array. Capacity is checked at
/// compile time, so the push can never drop an effect.
pub(crate) fn effects<const N: usize>(list: [Effect; N]) -> Effects {
    const { assert!(N <= MAX_EFFECTS) };
    let mut v = Effects::new();
    for effect in list {
        let _ = v.push(effect);
    }
    v
}
