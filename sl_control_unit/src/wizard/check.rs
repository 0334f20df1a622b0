//! Full-system check wizard.
//!
//! Verifies the complete transfer path after calibration. With a known
//! tray layout fitted (apartments 1 and 20 of each hotel occupied, the
//! rest empty), the wizard ejects and re-loads the hotels, scans both,
//! verifies the occupancy map against the expected layout, then cycles a
//! tray to the stage and back at each of the four corner stations.
//!
//! Device steps that find the loader busy back-step instead of failing
//! the whole run, so a slow transfer only costs the operator a retry.

use super::{Effect, Effects, StateMachine, Step, WizardEvent, effects};
use sl_common::protocol;

/// Corner stations exercised by the tray-cycle phase, as
/// (hotel, apartment) pairs.
pub const STATIONS: [(u8, u8); 4] = [(1, 1), (1, 20), (2, 1), (2, 20)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    /// Hotels ejected so the operator can fit the check layout.
    EjectHotels,
    /// Probing both hotel presence sensors.
    CheckHotelsFitted,
    /// Hotels loaded back in.
    LoadHotels,
    /// Scanning hotel 1.
    ScanHotel1,
    /// Scanning hotel 2.
    ScanHotel2,
    /// Comparing the occupancy map against the expected layout.
    CheckOccupancy,
    /// Transferring the tray at station `i` to the stage.
    LoadTray(u8),
    /// Transferring the tray at station `i` back to its apartment.
    UnloadTray(u8),
    /// Terminal; every station cycled cleanly.
    Complete,
}

/// Full-system check wizard.
#[derive(Debug)]
pub struct CheckWizard {
    state: CheckState,
}

impl CheckWizard {
    /// Starts at the eject step; call [`start`](Self::start) to obtain its
    /// entry effects.
    pub fn new() -> Self {
        Self {
            state: CheckState::EjectHotels,
        }
    }

    /// Entry effects of the initial state.
    pub fn start(&mut self) -> Step<CheckState> {
        self.enter(CheckState::EjectHotels)
    }

    fn enter(&mut self, state: CheckState) -> Step<CheckState> {
        use CheckState::*;
        let fx: Effects = match state {
            EjectHotels => effects([Effect::EjectHotels]),
            CheckHotelsFitted => effects([Effect::ProbeBothHotels]),
            LoadHotels => effects([Effect::LoadHotels]),
            ScanHotel1 => effects([Effect::ScanHotel(1)]),
            ScanHotel2 => effects([Effect::ScanHotel(2)]),
            CheckOccupancy => effects([Effect::VerifyOccupancy]),
            LoadTray(i) => {
                let (hotel, apartment) = STATIONS[i as usize];
                effects([Effect::LoadTray { hotel, apartment }])
            }
            UnloadTray(i) => {
                let (hotel, apartment) = STATIONS[i as usize];
                effects([Effect::UnloadTray { hotel, apartment }])
            }
            Complete => effects([]),
        };
        self.state = state;
        Step { state, effects: fx }
    }

    fn stay(&self) -> Step<CheckState> {
        Step {
            state: self.state,
            effects: Effects::new(),
        }
    }

    /// One step back, used for both `Previous` and `StepFailed`.
    fn back(&mut self) -> Step<CheckState> {
        use CheckState::*;
        match self.state {
            EjectHotels | Complete => self.stay(),
            CheckHotelsFitted => self.enter(EjectHotels),
            LoadHotels => self.enter(CheckHotelsFitted),
            ScanHotel1 => self.enter(LoadHotels),
            ScanHotel2 => self.enter(ScanHotel1),
            CheckOccupancy => self.enter(ScanHotel2),
            LoadTray(0) => self.enter(CheckOccupancy),
            LoadTray(i) => self.enter(UnloadTray(i - 1)),
            UnloadTray(i) => self.enter(LoadTray(i)),
        }
    }
}

impl Default for CheckWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for CheckWizard {
    type State = CheckState;

    fn state(&self) -> CheckState {
        self.state
    }

    fn is_complete(&self) -> bool {
        self.state == CheckState::Complete
    }

    fn handle(&mut self, event: WizardEvent) -> Step<CheckState> {
        use CheckState::*;
        use WizardEvent::*;
        match (self.state, event) {
            (EjectHotels, Next) => self.enter(CheckHotelsFitted),
            (CheckHotelsFitted, HotelsFitted(true)) => self.enter(LoadHotels),
            (CheckHotelsFitted, HotelsFitted(false)) => self.enter(EjectHotels),
            (LoadHotels, Next) => self.enter(ScanHotel1),
            (ScanHotel1, Next) => self.enter(ScanHotel2),
            (ScanHotel2, Next) => self.enter(CheckOccupancy),
            (CheckOccupancy, OccupancyOk(true)) => self.enter(LoadTray(0)),
            // Wrong layout: eject so the operator can refit the trays.
            (CheckOccupancy, OccupancyOk(false)) => self.enter(EjectHotels),
            (LoadTray(i), Next) => self.enter(UnloadTray(i)),
            (UnloadTray(i), Next) => {
                if usize::from(i) + 1 < STATIONS.len() {
                    self.enter(LoadTray(i + 1))
                } else {
                    self.enter(Complete)
                }
            }
            (_, Previous) | (_, StepFailed) => self.back(),
            _ => self.stay(),
        }
    }
}

/// Expected occupancy for the check layout: first and last apartment of
/// each hotel occupied, everything else empty.
pub const fn expected_occupied(apartment: u8) -> bool {
    apartment == 1 || apartment == protocol::APARTMENTS_PER_HOTEL
}

#[cfg(test)]
mod tests {
    use super::*;
    use WizardEvent::*;

    #[test]
    fn full_run_visits_all_four_stations() {
        let mut w = CheckWizard::new();
        let step = w.start();
        assert_eq!(step.effects.as_slice(), &[Effect::EjectHotels]);

        w.handle(Next);
        w.handle(HotelsFitted(true));
        w.handle(Next); // hotels loaded -> scan 1
        w.handle(Next); // scan 2
        w.handle(Next); // occupancy
        let step = w.handle(OccupancyOk(true));
        assert_eq!(step.state, CheckState::LoadTray(0));
        assert_eq!(
            step.effects.as_slice(),
            &[Effect::LoadTray {
                hotel: 1,
                apartment: 1
            }]
        );

        let mut visited = Vec::new();
        while !w.is_complete() {
            if let CheckState::LoadTray(i) = w.state() {
                visited.push(STATIONS[i as usize]);
            }
            w.handle(Next);
        }
        assert_eq!(visited, STATIONS.to_vec());
    }

    #[test]
    fn wrong_occupancy_returns_to_eject() {
        let mut w = CheckWizard::new();
        w.start();
        w.handle(Next);
        w.handle(HotelsFitted(true));
        w.handle(Next);
        w.handle(Next);
        w.handle(Next);
        let step = w.handle(OccupancyOk(false));
        assert_eq!(step.state, CheckState::EjectHotels);
    }

    #[test]
    fn busy_device_backs_the_load_step_off() {
        let mut w = CheckWizard::new();
        w.start();
        w.handle(Next);
        w.handle(HotelsFitted(true));
        w.handle(Next);
        w.handle(Next);
        w.handle(Next);
        w.handle(OccupancyOk(true)); // LoadTray(0)
        w.handle(Next); // UnloadTray(0)
        w.handle(Next); // LoadTray(1)
        let step = w.handle(StepFailed);
        // Retry path: re-enter the previous unload so its transfer can
        // finish before loading again.
        assert_eq!(step.state, CheckState::UnloadTray(0));
        assert_eq!(
            step.effects.as_slice(),
            &[Effect::UnloadTray {
                hotel: 1,
                apartment: 1
            }]
        );
    }

    #[test]
    fn first_load_failure_backs_off_to_occupancy() {
        let mut w = CheckWizard::new();
        w.start();
        w.handle(Next);
        w.handle(HotelsFitted(true));
        w.handle(Next);
        w.handle(Next);
        w.handle(Next);
        w.handle(OccupancyOk(true));
        let step = w.handle(StepFailed);
        assert_eq!(step.state, CheckState::CheckOccupancy);
    }

    #[test]
    fn missing_hotel_repeats_the_eject() {
        let mut w = CheckWizard::new();
        w.start();
        w.handle(Next);
        let step = w.handle(HotelsFitted(false));
        assert_eq!(step.state, CheckState::EjectHotels);
    }

    #[test]
    fn expected_layout_is_corners_only() {
        let occupied: Vec<u8> = (1..=protocol::APARTMENTS_PER_HOTEL)
            .filter(|&a| expected_occupied(a))
            .collect();
        assert_eq!(occupied, vec![1, 20]);
    }
}
