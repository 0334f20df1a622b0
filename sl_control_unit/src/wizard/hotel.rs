//! Hotel alignment wizard.
//!
//! Aligns the hotel rack with the transfer shuttle. The operator ejects
//! the hotels, confirms hotel 1 is physically fitted, re-loads, then jogs
//! the shuttle and lift axes until the rack lines up, and finally
//! confirms. Completion records the hotel-calibrated flag in the working
//! profile (RAM push only).

use super::{Effect, Effects, StateMachine, Step, WizardEvent, effects};
use sl_common::axis::Axis;

/// Axes the operator may jog during the alignment step.
pub const ALIGN_AXES: &[Axis] = &[Axis::Hsm, Axis::Hlm];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotelAlignState {
    /// Introduction; nothing has moved yet.
    Start,
    /// Hotels ejected so the operator can check the rack seating.
    EjectHotels,
    /// Probing the hotel 1 presence sensor.
    CheckHotelFitted,
    /// Hotels loaded back into the machine.
    LoadHotels,
    /// Explains the alignment procedure.
    AlignIntro,
    /// Operator positions the shuttle at the reference apartment.
    AlignShuttle,
    /// Operator brings the lift level with the apartment floor.
    AlignLift,
    /// Free jog of both axes for the final line-up.
    Align,
    /// Operator signs off the alignment.
    Confirm,
    /// Terminal; hotel-calibrated flag recorded.
    Complete,
}

/// Hotel alignment wizard.
#[derive(Debug)]
pub struct HotelAlignWizard {
    state: HotelAlignState,
    /// True while the racks are out of the machine. Gates the eject and
    /// load effects so revisiting a state never repeats the motion.
    hotels_ejected: bool,
}

impl HotelAlignWizard {
    pub fn new() -> Self {
        Self {
            state: HotelAlignState::Start,
            hotels_ejected: false,
        }
    }

    fn enter(&mut self, state: HotelAlignState) -> Step<HotelAlignState> {
        use HotelAlignState::*;
        let fx: Effects = match state {
            EjectHotels => {
                if self.hotels_ejected {
                    effects([])
                } else {
                    self.hotels_ejected = true;
                    effects([Effect::EjectHotels])
                }
            }
            CheckHotelFitted => effects([Effect::ProbeHotel { hotel: 1 }]),
            LoadHotels => {
                if self.hotels_ejected {
                    self.hotels_ejected = false;
                    effects([Effect::LoadHotels])
                } else {
                    effects([])
                }
            }
            Align => effects([Effect::EnableJog(ALIGN_AXES)]),
            Confirm => effects([Effect::Ask(
                "Is the hotel aligned with the shuttle at the reference apartment?",
            )]),
            Complete => effects([Effect::MarkHotelCalibrated]),
            Start | AlignIntro | AlignShuttle | AlignLift => effects([]),
        };
        self.state = state;
        Step { state, effects: fx }
    }

    fn stay(&self) -> Step<HotelAlignState> {
        Step {
            state: self.state,
            effects: Effects::new(),
        }
    }
}

impl Default for HotelAlignWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for HotelAlignWizard {
    type State = HotelAlignState;

    fn state(&self) -> HotelAlignState {
        self.state
    }

    fn is_complete(&self) -> bool {
        self.state == HotelAlignState::Complete
    }

    fn handle(&mut self, event: WizardEvent) -> Step<HotelAlignState> {
        use HotelAlignState::*;
        use WizardEvent::*;
        match (self.state, event) {
            (Start, Next) => self.enter(EjectHotels),
            (EjectHotels, Next) => self.enter(CheckHotelFitted),
            (EjectHotels, Previous) => self.enter(Start),
            // Rack missing: always route back to the eject step, whatever
            // the history that led here.
            (CheckHotelFitted, HotelFitted(false)) => self.enter(EjectHotels),
            (CheckHotelFitted, HotelFitted(true)) => self.enter(LoadHotels),
            (LoadHotels, Next) => self.enter(AlignIntro),
            (AlignIntro, Next) => self.enter(AlignShuttle),
            (AlignIntro, Previous) => self.enter(LoadHotels),
            (AlignShuttle, Next) => self.enter(AlignLift),
            (AlignShuttle, Previous) => self.enter(AlignIntro),
            (AlignLift, Next) => self.enter(Align),
            (AlignLift, Previous) => self.enter(AlignShuttle),
            (Align, Next) => self.enter(Confirm),
            (Align, Previous) => self.enter(AlignLift),
            (Confirm, Confirmed(true)) => self.enter(Complete),
            (Confirm, Confirmed(false)) => self.enter(AlignIntro),
            _ => self.stay(),
        }
    }
}
