//! End-to-end wizard flows against the simulated loader.
//!
//! Each test drives a complete calibration wizard through a real
//! [`LoaderSession`] and [`SimLoader`], with scripted operator answers.
//! The device model enforces the real refusal codes (busy, ejected,
//! unscanned), so these flows fail if the wizards sequence their device
//! actions wrongly.

use sl_common::calibration::HeightType;
use sl_common::config::{LoaderConfig, TimingConfig};
use sl_control_unit::session::LoaderSession;
use sl_control_unit::wizard::check::{CheckState, CheckWizard};
use sl_control_unit::wizard::hotel::HotelAlignWizard;
use sl_control_unit::wizard::stage::StageCalWizard;
use sl_control_unit::wizard::runner::{ScriptedConfirm, advance};
use sl_control_unit::wizard::{StateMachine, WizardEvent};
use sl_sim::SimLoader;

fn fast_config() -> LoaderConfig {
    LoaderConfig {
        timing: TimingConfig {
            poll_interval_ms: 1,
            busy_poll_interval_ms: 0,
            wait_idle_timeout_s: 1.0,
        },
        ..LoaderConfig::default()
    }
}

fn connected_session(sim: SimLoader) -> LoaderSession<SimLoader> {
    let mut session = LoaderSession::new(sim, &fast_config());
    session.connect(1).unwrap();
    session
}

/// Press Next until the wizard completes, with a hard press bound.
fn drive_to_completion<M: StateMachine>(
    wizard: &mut M,
    session: &mut LoaderSession<SimLoader>,
    confirm: &mut ScriptedConfirm,
) {
    for _ in 0..32 {
        if wizard.is_complete() {
            return;
        }
        let mut runner = session.runner(confirm);
        advance(wizard, &mut runner, WizardEvent::Next).unwrap();
    }
    panic!("wizard did not complete, stuck at {:?}", wizard.state());
}

#[test]
fn hotel_alignment_records_the_flag_without_saving() {
    let mut session = connected_session(SimLoader::new());
    let mut confirm = ScriptedConfirm::always(true);
    let mut wizard = HotelAlignWizard::new();

    drive_to_completion(&mut wizard, &mut session, &mut confirm);

    assert!(session.profile().hotel_calibrated());
    // RAM push happened, EEPROM stayed untouched.
    let sim = session.channel_mut();
    assert_ne!(sim.ram_profile() & 0x10, 0);
    assert_eq!(sim.save_count(), 0);
    assert_eq!(sim.eeprom_profile(), 0);
}

#[test]
fn commit_after_wizard_writes_eeprom_once() {
    let mut session = connected_session(SimLoader::new());
    let mut confirm = ScriptedConfirm::always(true);
    let mut wizard = HotelAlignWizard::new();
    drive_to_completion(&mut wizard, &mut session, &mut confirm);

    session.set_height_type(HeightType::Fixed);
    session.commit_setup_flags().unwrap();

    let sim = session.channel_mut();
    assert_eq!(sim.save_count(), 1);
    // Height nibble 1 + hotel flag.
    assert_eq!(sim.eeprom_profile(), 0x11);
}

#[test]
fn stage_calibration_with_a_manually_presented_tray() {
    let mut session = connected_session(SimLoader::new());
    let mut confirm = ScriptedConfirm::always(true);
    let mut wizard = StageCalWizard::new(HeightType::Fixed);

    drive_to_completion(&mut wizard, &mut session, &mut confirm);

    assert!(session.profile().stage_calibrated());
    let sim = session.channel_mut();
    assert_ne!(sim.ram_profile() & 0x20, 0);
    assert_eq!(sim.save_count(), 0);
    // The closing step leaves the hotels ejected for normal hand-over.
    assert!(sim.hotels_ejected());
}

#[test]
fn stage_calibration_reuses_a_tray_already_on_stage() {
    let mut sim = SimLoader::new();
    sim.set_tray_on_stage(true);
    let mut session = connected_session(sim);
    // First answer accepts the existing tray; the rest confirm onwards.
    let mut confirm = ScriptedConfirm::always(true);
    let mut wizard = StageCalWizard::new(HeightType::Customer);

    drive_to_completion(&mut wizard, &mut session, &mut confirm);
    assert!(session.profile().stage_calibrated());
}

#[test]
fn full_system_check_cycles_every_corner_station() {
    let mut session = connected_session(SimLoader::new());
    let mut confirm = ScriptedConfirm::always(true);
    let mut wizard = CheckWizard::new();

    // The initial state's effects are not driven by an event.
    {
        let mut runner = session.runner(&mut confirm);
        let step = wizard.start();
        assert!(runner.run(&step.effects).unwrap().is_none());
    }
    drive_to_completion(&mut wizard, &mut session, &mut confirm);

    // Every tray is back in its apartment and the stage is clear.
    let sim = session.channel_mut();
    for slot in [1, 20, 21, 40] {
        assert!(sim.tray_fitted(slot), "tray {slot} not returned");
    }
    assert!(!sim.tray_on_stage());
}

#[test]
fn check_wizard_rejects_a_wrong_tray_layout() {
    let mut sim = SimLoader::new();
    sim.fit_tray(2, true); // apartment 2 must be empty
    let mut session = connected_session(sim);
    let mut confirm = ScriptedConfirm::always(true);
    let mut wizard = CheckWizard::new();

    {
        let mut runner = session.runner(&mut confirm);
        let step = wizard.start();
        runner.run(&step.effects).unwrap();
    }
    // Fitted check -> load -> scans -> occupancy, which fails and
    // routes back to the eject step.
    for _ in 0..4 {
        let mut runner = session.runner(&mut confirm);
        advance(&mut wizard, &mut runner, WizardEvent::Next).unwrap();
    }
    assert_eq!(wizard.state(), CheckState::EjectHotels);
    assert!(!wizard.is_complete());
}
