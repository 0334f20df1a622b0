//! Soak sessions against the simulated loader.
//!
//! These run the real host loop shape: poll, then one scheduler tick,
//! repeated. The simulator models busy windows in status-query ticks, so
//! the scheduler's stale-snapshot handling and its one-action-per-tick
//! discipline are both exercised for real.

use sl_common::config::{LoaderConfig, SoakConfig, TimingConfig};
use sl_control_unit::LoaderError;
use sl_control_unit::session::LoaderSession;
use sl_control_unit::soak::{AcquisitionHooks, NoopHooks, SoakPhase, SoakScheduler};
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

fn session_with(sim: SimLoader) -> LoaderSession<SimLoader> {
    let mut session = LoaderSession::new(sim, &fast_config());
    session.connect(1).unwrap();
    session
}

fn run_until_cycles(
    session: &mut LoaderSession<SimLoader>,
    soak: &mut SoakScheduler,
    hooks: &mut dyn AcquisitionHooks,
    target: u64,
) {
    for _ in 0..5_000 {
        session.poll();
        session.soak_tick(soak, hooks).unwrap();
        if soak.cycles_completed() >= target {
            return;
        }
    }
    panic!("soak stalled in {:?}", soak.phase());
}

#[test]
fn tray_cycles_complete_and_restore_the_inventory() {
    let mut sim = SimLoader::new();
    sim.clear_all_trays();
    sim.fit_tray(7, true);
    let mut session = session_with(sim);

    let mut soak = SoakScheduler::new(SoakConfig::default());
    let mut hooks = NoopHooks;
    soak.start();
    run_until_cycles(&mut session, &mut soak, &mut hooks, 3);
    soak.stop();

    let sim = session.channel_mut();
    assert!(sim.tray_fitted(7), "tray must end back in its apartment");
    assert!(!sim.tray_on_stage());
}

#[test]
fn preview_pauses_are_visited_in_order() {
    #[derive(Default)]
    struct Capture {
        stations: Vec<u8>,
    }
    impl AcquisitionHooks for Capture {
        fn on_preview_reached(&mut self, station: u8) {
            self.stations.push(station);
        }
    }

    let mut sim = SimLoader::new();
    sim.clear_all_trays();
    sim.fit_tray(3, true);
    sim.set_preview_enabled(true);
    let mut session = session_with(sim);

    let mut soak = SoakScheduler::new(SoakConfig {
        preview_enabled: true,
        ..SoakConfig::default()
    });
    let mut hooks = Capture::default();
    soak.start();
    run_until_cycles(&mut session, &mut soak, &mut hooks, 1);

    assert_eq!(hooks.stations, vec![1, 2, 3, 4]);
}

#[test]
fn raster_points_are_visited_while_the_tray_is_loaded() {
    #[derive(Default)]
    struct Capture {
        points: Vec<usize>,
    }
    impl AcquisitionHooks for Capture {
        fn on_raster_position_reached(&mut self, index: usize) {
            self.points.push(index);
        }
    }

    let mut sim = SimLoader::new();
    sim.clear_all_trays();
    sim.fit_tray(21, true);
    let mut session = session_with(sim);

    let mut soak = SoakScheduler::new(SoakConfig {
        raster_enabled: true,
        ..SoakConfig::default()
    });
    let mut hooks = Capture::default();
    soak.start();
    run_until_cycles(&mut session, &mut soak, &mut hooks, 1);

    // Default pattern: four corners of the 2 mm square, in order.
    assert_eq!(hooks.points, vec![0, 1, 2, 3]);
}

#[test]
fn scan_only_mode_never_moves_a_tray() {
    let mut session = session_with(SimLoader::new());
    let mut soak = SoakScheduler::new(SoakConfig {
        scan_only: true,
        ..SoakConfig::default()
    });
    let mut hooks = NoopHooks;
    soak.start();
    run_until_cycles(&mut session, &mut soak, &mut hooks, 2);

    let sim = session.channel_mut();
    assert!(!sim.tray_on_stage());
    for slot in [1, 20, 21, 40] {
        assert!(sim.tray_fitted(slot));
    }
}

#[test]
fn device_fault_aborts_the_session() {
    let mut sim = SimLoader::new();
    sim.clear_all_trays();
    sim.fit_tray(7, true);
    let mut session = session_with(sim);

    let mut soak = SoakScheduler::new(SoakConfig::default());
    let mut hooks = NoopHooks;
    soak.start();
    run_until_cycles(&mut session, &mut soak, &mut hooks, 1);

    session.channel_mut().force_generic_error(true);
    // One poll to observe the fault bit, then the tick must abort.
    let err = loop {
        session.poll();
        match session.soak_tick(&mut soak, &mut hooks) {
            Ok(()) => continue,
            Err(e) => break e,
        }
    };
    assert!(matches!(err, LoaderError::Fault(_)));
    assert_eq!(soak.phase(), SoakPhase::Idle);

    // A cleared fault and a restart recover the scheduler.
    session.channel_mut().force_generic_error(false);
    let target = soak.cycles_completed() + 1;
    soak.start();
    run_until_cycles(&mut session, &mut soak, &mut hooks, target);
}

#[test]
fn empty_machine_parks_the_scheduler() {
    let mut sim = SimLoader::new();
    sim.clear_all_trays();
    let mut session = session_with(sim);

    let mut soak = SoakScheduler::new(SoakConfig::default());
    let mut hooks = NoopHooks;
    soak.start();
    for _ in 0..100 {
        session.poll();
        session.soak_tick(&mut soak, &mut hooks).unwrap();
        if !soak.is_running() {
            break;
        }
    }
    assert_eq!(soak.phase(), SoakPhase::Idle);
    assert_eq!(soak.cycles_completed(), 0);
}
