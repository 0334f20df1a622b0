//! Stage position calibration wizard.
//!
//! Teaches the machine the stage clamp position for the selected height
//! type. A tray ends up in the clamp (either one already on the stage or
//! one presented and pulled in), the operator aligns the stage Y and the
//! shuttle insertion depth, and a final full insertion verifies the
//! seating. The full-insertion and extraction steps are irreversible, so
//! they are reachable only through an explicit confirmation.

use super::{Effect, Effects, StateMachine, Step, WizardEvent, effects};
use sl_common::axis::Axis;
use sl_common::calibration::HeightType;

/// Jog axes for the stage Y alignment step.
pub const JOG_STAGE_Y: &[Axis] = &[Axis::StageY];
/// Jog axes for the insertion-depth step.
pub const JOG_INSERTION: &[Axis] = &[Axis::Stm];
/// Jog axes for the tray-floor levelling step.
pub const JOG_FLOOR: &[Axis] = &[Axis::Stm, Axis::Hlm];

/// Full-insertion travel in millimetres past the marker position.
const FULL_INSERT_MM: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageCalState {
    /// Introduction, tailored to the height type.
    Start,
    /// Hotels ejected out of the transfer path.
    EjectHotels,
    /// Open the clamp, home the shuttle, probe the stage sensor.
    CheckIfTrayOnStage,
    /// A tray is already clamped; ask whether to calibrate with it.
    ConfirmExistingTray,
    /// Loader positioned so the operator can insert a tray by hand.
    PresentTray,
    /// Pull the presented tray in and verify the sensor.
    LoadTrayToStage,
    /// Hotel 1 must be fitted as the alignment reference.
    CheckHotelFitted,
    /// Operator jogs stage Y over the clamp centre line.
    AlignStageY,
    /// Operator inserts the tray to the marker with the shuttle.
    InsertTrayToMarker,
    /// Operator levels the tray with the apartment floor.
    AlignTrayWithFloor,
    /// Point of no return: confirm before the full insertion.
    QueryInsertFully,
    /// Tray driven fully home; operator verifies the seating.
    InsertTrayFully,
    /// Tray extracted; stage-calibrated flag recorded.
    ExtractTray,
    /// Hotels ejected again so normal operation can resume.
    EjectHotelsFinal,
    /// Terminal.
    Complete,
}

/// Stage position calibration wizard.
#[derive(Debug)]
pub struct StageCalWizard {
    state: StageCalState,
    height: HeightType,
    hotels_ejected: bool,
}

impl StageCalWizard {
    pub fn new(height: HeightType) -> Self {
        Self {
            state: StageCalState::Start,
            height,
            hotels_ejected: false,
        }
    }

    /// Height type this calibration run applies to.
    pub fn height_type(&self) -> HeightType {
        self.height
    }

    /// Introductory text for the host UI, varying with the height type.
    pub fn intro_notes(&self) -> &'static str {
        match self.height {
            HeightType::None | HeightType::Fixed => {
                "Calibrate the clamp position for standard-height trays."
            }
            HeightType::Customer => {
                "Calibrate the clamp position for the customer sample holder. \
                 Fit the customer holder to the tray before starting."
            }
            HeightType::Factory => {
                "Factory calibration: use the reference tray from the tool kit."
            }
        }
    }

    #[cfg(test)]
    fn at(state: StageCalState) -> Self {
        Self {
            state,
            height: HeightType::Fixed,
            hotels_ejected: false,
        }
    }

    fn enter(&mut self, state: StageCalState) -> Step<StageCalState> {
        use StageCalState::*;
        let fx: Effects = match state {
            EjectHotels => {
                if self.hotels_ejected {
                    effects([])
                } else {
                    self.hotels_ejected = true;
                    effects([Effect::EjectHotels])
                }
            }
            CheckIfTrayOnStage => effects([
                Effect::StageToOpenClamp,
                Effect::HomeShuttle,
                Effect::ProbeTrayOnStage,
            ]),
            ConfirmExistingTray => effects([Effect::Ask(
                "A tray is already on the stage. Calibrate with it?",
            )]),
            PresentTray => effects([Effect::PresentTray]),
            LoadTrayToStage => effects([Effect::PullTrayToStage, Effect::ProbeTrayOnStage]),
            CheckHotelFitted => effects([Effect::ProbeHotel { hotel: 1 }]),
            AlignStageY => effects([Effect::EnableJog(JOG_STAGE_Y)]),
            InsertTrayToMarker => effects([Effect::EnableJog(JOG_INSERTION)]),
            AlignTrayWithFloor => effects([Effect::EnableJog(JOG_FLOOR)]),
            QueryInsertFully => effects([Effect::Ask(
                "Insert the tray fully? The insertion cannot be adjusted afterwards.",
            )]),
            InsertTrayFully => effects([
                Effect::JogMm {
                    axis: Axis::Stm,
                    mm: FULL_INSERT_MM,
                },
                Effect::Ask("Is the tray seated fully in the clamp?"),
            ]),
            ExtractTray => effects([
                Effect::JogMm {
                    axis: Axis::Stm,
                    mm: -2.0,
                },
                Effect::JogMm {
                    axis: Axis::Hlm,
                    mm: 4.0,
                },
                Effect::JogMm {
                    axis: Axis::Stm,
                    mm: -30.0,
                },
                Effect::MarkStageCalibrated,
            ]),
            EjectHotelsFinal => effects([Effect::EjectHotels]),
            Start | Complete => effects([]),
        };
        self.state = state;
        Step { state, effects: fx }
    }

    fn stay(&self) -> Step<StageCalState> {
        Step {
            state: self.state,
            effects: Effects::new(),
        }
    }
}

impl StateMachine for StageCalWizard {
    type State = StageCalState;

    fn state(&self) -> StageCalState {
        self.state
    }

    fn is_complete(&self) -> bool {
        self.state == StageCalState::Complete
    }

    fn handle(&mut self, event: WizardEvent) -> Step<StageCalState> {
        use StageCalState::*;
        use WizardEvent::*;
        match (self.state, event) {
            (Start, Next) => self.enter(EjectHotels),
            (EjectHotels, Next) => self.enter(CheckIfTrayOnStage),
            (CheckIfTrayOnStage, TrayOnStage(true)) => self.enter(ConfirmExistingTray),
            (CheckIfTrayOnStage, TrayOnStage(false)) => self.enter(PresentTray),
            (ConfirmExistingTray, Confirmed(true)) => self.enter(CheckHotelFitted),
            (ConfirmExistingTray, Confirmed(false)) => self.enter(PresentTray),
            (PresentTray, Next) => self.enter(LoadTrayToStage),
            // The pull re-probes the sensor; an empty clamp means the
            // operator never inserted a tray, so present again.
            (LoadTrayToStage, TrayOnStage(true)) => self.enter(CheckHotelFitted),
            (LoadTrayToStage, TrayOnStage(false)) => self.enter(PresentTray),
            (CheckHotelFitted, HotelFitted(true)) => self.enter(AlignStageY),
            (CheckHotelFitted, HotelFitted(false)) => self.enter(EjectHotels),
            (AlignStageY, Next) => self.enter(InsertTrayToMarker),
            (AlignStageY, Previous) => self.enter(CheckHotelFitted),
            (InsertTrayToMarker, Next) => self.enter(AlignTrayWithFloor),
            (InsertTrayToMarker, Previous) => self.enter(AlignStageY),
            (AlignTrayWithFloor, Next) => self.enter(QueryInsertFully),
            (AlignTrayWithFloor, Previous) => self.enter(InsertTrayToMarker),
            (QueryInsertFully, Confirmed(true)) => self.enter(InsertTrayFully),
            (QueryInsertFully, Confirmed(false)) => self.enter(AlignTrayWithFloor),
            (InsertTrayFully, Confirmed(true)) => self.enter(ExtractTray),
            (InsertTrayFully, Confirmed(false)) => {
                // Back the tray out by the full-insertion travel before
                // handing the Y alignment back to the operator.
                self.state = AlignStageY;
                Step {
                    state: AlignStageY,
                    effects: effects([
                        Effect::JogMm {
                            axis: Axis::Stm,
                            mm: -FULL_INSERT_MM,
                        },
                        Effect::EnableJog(JOG_STAGE_Y),
                    ]),
                }
            }
            (ExtractTray, Next) => self.enter(EjectHotelsFinal),
            (EjectHotelsFinal, Next) => self.enter(Complete),
            _ => self.stay(),
        }
    }
}
