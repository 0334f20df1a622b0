//! Soak-test scheduler.
//!
//! Long-running exerciser for the transfer mechanics: find the next
//! fitted tray, cycle it to the stage (optionally pausing at the preview
//! stations and rastering the stage) and back, then move on to the next
//! slot. Runs as a cooperative state machine driven by the host loop's
//! poll tick; every tick performs at most one slot probe or one command
//! issue, so the scheduler never monopolises the channel.
//!
//! The scheduler is purely reactive: it consumes the poller's latest
//! snapshot and never blocks waiting for the device. A fault bit or a
//! transport failure aborts the run back to `Idle`.

use crate::error::{LoaderError, Result, exec, exec_bool, exec_parse};
use crate::poller::StatusSnapshot;
use sl_common::channel::CommandChannel;
use sl_common::config::{RasterPoint, SoakConfig};
use sl_common::protocol;
use tracing::{debug, info, warn};

/// Acquisition callbacks invoked at preview pauses and raster positions.
/// The host wires its capture pipeline in here; the scheduler only cares
/// that the callback returns.
pub trait AcquisitionHooks {
    /// A transfer is paused at preview station `station` (1-based).
    fn on_preview_reached(&mut self, station: u8) {
        let _ = station;
    }

    /// The stage settled at raster point `index` (0-based).
    fn on_raster_position_reached(&mut self, index: usize) {
        let _ = index;
    }
}

/// Hooks that do nothing; soak for the mechanics alone.
#[derive(Debug, Default)]
pub struct NoopHooks;

impl AcquisitionHooks for NoopHooks {}

/// Scheduler phase. `Idle` means not running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoakPhase {
    Idle,
    /// Probing tray slots round-robin for the next fitted tray.
    FindNextTray,
    /// Hotel-to-stage transfer in flight (including preview pauses).
    TransferToStage,
    /// Paused at a preview station, waiting for the device to reach it.
    Preview(u8),
    /// Tray clamped on the stage.
    TrayLoaded,
    /// Stepping through the raster pattern.
    Raster(usize),
    /// Stage-to-hotel transfer in flight.
    TransferToHotel,
    /// Scan-only mode: scanning hotel 1.
    ScanHotel1,
    /// Scan-only mode: scanning hotel 2.
    ScanHotel2,
}

/// Cooperative soak scheduler; one small action per tick.
#[derive(Debug)]
pub struct SoakScheduler {
    options: SoakConfig,
    phase: SoakPhase,
    /// Slot of the tray currently cycling (valid outside FindNextTray).
    current_tray: u8,
    /// Next slot to probe, wrapping 1..=40.
    search_slot: u8,
    /// Consecutive empty probes; a full revolution stops the run.
    probes_without_tray: u8,
    previews_done: bool,
    scan_issued: bool,
    cycles: u64,
}

impl SoakScheduler {
    pub fn new(options: SoakConfig) -> Self {
        Self {
            options,
            phase: SoakPhase::Idle,
            current_tray: 0,
            search_slot: 1,
            probes_without_tray: 0,
            previews_done: false,
            scan_issued: false,
            cycles: 0,
        }
    }

    pub fn phase(&self) -> SoakPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase != SoakPhase::Idle
    }

    /// Completed tray cycles (or scan passes in scan-only mode).
    pub fn cycles_completed(&self) -> u64 {
        self.cycles
    }

    /// Arm the scheduler. Search state resets; the cycle counter keeps
    /// accumulating across runs.
    pub fn start(&mut self) {
        self.search_slot = 1;
        self.probes_without_tray = 0;
        self.previews_done = false;
        self.scan_issued = false;
        self.phase = if self.options.scan_only {
            SoakPhase::ScanHotel1
        } else {
            SoakPhase::FindNextTray
        };
        info!(
            "soak started: scan_only={} preview={} raster={}",
            self.options.scan_only, self.options.preview_enabled, self.options.raster_enabled
        );
    }

    /// Stop after the current device operation; no new commands issue.
    pub fn stop(&mut self) {
        if self.is_running() {
            info!("soak stopped after {} cycles", self.cycles);
        }
        self.phase = SoakPhase::Idle;
    }

    /// One scheduler tick. Call after each poll tick with the fresh
    /// snapshot. Errors abort the run to `Idle` and propagate.
    pub fn tick(
        &mut self,
        chan: &mut dyn CommandChannel,
        status: &StatusSnapshot,
        hooks: &mut dyn AcquisitionHooks,
    ) -> Result<()> {
        if self.phase == SoakPhase::Idle {
            return Ok(());
        }
        if status.flags.has_fault() {
            warn!(
                "soak halted by device fault {:?} after {} cycles",
                status.flags, self.cycles
            );
            self.phase = SoakPhase::Idle;
            return Err(LoaderError::Fault(status.flags));
        }
        let result = self.step(chan, status, hooks);
        if let Err(e) = &result {
            warn!("soak aborted: {e}");
            self.phase = SoakPhase::Idle;
        }
        result
    }

    fn step(
        &mut self,
        chan: &mut dyn CommandChannel,
        status: &StatusSnapshot,
        hooks: &mut dyn AcquisitionHooks,
    ) -> Result<()> {
        match self.phase {
            SoakPhase::Idle => Ok(()),
            SoakPhase::FindNextTray => self.find_next_tray(chan, status),
            SoakPhase::TransferToStage => {
                if self.options.preview_enabled && !self.previews_done {
                    self.phase = SoakPhase::Preview(1);
                } else if status.is_idle() {
                    debug!("tray {} on stage", self.current_tray);
                    self.phase = SoakPhase::TrayLoaded;
                }
                Ok(())
            }
            SoakPhase::Preview(station) => {
                let at: u8 = exec_parse(chan, protocol::PREVIEW_INDEX_GET)?;
                if at == station {
                    hooks.on_preview_reached(station);
                    exec(chan, protocol::PREVIEW_CONTINUE)?;
                    if station == protocol::PREVIEW_STATIONS {
                        self.previews_done = true;
                        self.phase = SoakPhase::TransferToStage;
                    } else {
                        self.phase = SoakPhase::Preview(station + 1);
                    }
                }
                Ok(())
            }
            SoakPhase::TrayLoaded => {
                if self.options.raster_enabled && !self.options.raster_points.is_empty() {
                    let point = self.options.raster_points[0];
                    self.goto_raster_point(chan, point)?;
                    self.phase = SoakPhase::Raster(0);
                } else if status.is_idle() {
                    self.begin_return(chan)?;
                }
                Ok(())
            }
            SoakPhase::Raster(index) => {
                if exec_bool(chan, protocol::STAGE_BUSY_GET)? {
                    return Ok(());
                }
                hooks.on_raster_position_reached(index);
                let next = index + 1;
                if next < self.options.raster_points.len() {
                    let point = self.options.raster_points[next];
                    self.goto_raster_point(chan, point)?;
                    self.phase = SoakPhase::Raster(next);
                } else {
                    self.begin_return(chan)?;
                }
                Ok(())
            }
            SoakPhase::TransferToHotel => {
                if status.is_idle() {
                    self.cycles += 1;
                    info!(
                        "soak cycle {} complete (tray {})",
                        self.cycles, self.current_tray
                    );
                    self.phase = SoakPhase::FindNextTray;
                }
                Ok(())
            }
            SoakPhase::ScanHotel1 => self.scan_step(chan, status, 1, SoakPhase::ScanHotel2),
            SoakPhase::ScanHotel2 => {
                let done = self.scan_step(chan, status, 2, SoakPhase::ScanHotel1);
                if done.is_ok() && self.phase == SoakPhase::ScanHotel1 {
                    self.cycles += 1;
                    debug!("scan pass {} complete", self.cycles);
                }
                done
            }
        }
    }

    /// Probe one slot per tick. A fitted slot starts the transfer once the
    /// device is idle; a full revolution of empty probes ends the run.
    fn find_next_tray(&mut self, chan: &mut dyn CommandChannel, status: &StatusSnapshot) -> Result<()> {
        let slot = self.search_slot;
        let fitted = exec_bool(chan, &protocol::tray_fitted_get(slot))?;
        if fitted {
            self.probes_without_tray = 0;
            if status.is_idle() {
                exec(chan, &protocol::transfer_to_stage(slot))?;
                self.current_tray = slot;
                self.previews_done = false;
                self.search_slot = Self::next_slot(slot);
                self.phase = SoakPhase::TransferToStage;
                debug!("soak transferring tray {slot} to stage");
            }
            // Device busy: keep the slot and retry next tick.
            return Ok(());
        }
        self.search_slot = Self::next_slot(slot);
        self.probes_without_tray += 1;
        if self.probes_without_tray >= protocol::TRAY_SLOTS {
            info!(
                "soak found no trays in a full revolution, stopping after {} cycles",
                self.cycles
            );
            self.phase = SoakPhase::Idle;
        }
        Ok(())
    }

    fn scan_step(
        &mut self,
        chan: &mut dyn CommandChannel,
        status: &StatusSnapshot,
        hotel: u8,
        next: SoakPhase,
    ) -> Result<()> {
        if !self.scan_issued {
            if !exec_bool(chan, &protocol::hotel_fitted_get(hotel))? {
                debug!("hotel {hotel} not fitted, skipping scan");
                self.phase = next;
            } else if status.is_idle() {
                exec(chan, &protocol::hotel_scan(hotel))?;
                self.scan_issued = true;
            }
        } else if status.is_idle() {
            self.scan_issued = false;
            self.phase = next;
        }
        Ok(())
    }

    fn goto_raster_point(&mut self, chan: &mut dyn CommandChannel, point: RasterPoint) -> Result<()> {
        exec(chan, &protocol::stage_goto(point.x_um, point.y_um))?;
        Ok(())
    }

    fn begin_return(&mut self, chan: &mut dyn CommandChannel) -> Result<()> {
        exec(chan, &protocol::transfer_from_stage(self.current_tray))?;
        self.phase = SoakPhase::TransferToHotel;
        Ok(())
    }

    const fn next_slot(slot: u8) -> u8 {
        if slot >= protocol::TRAY_SLOTS { 1 } else { slot + 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_common::channel::{ChannelError, Reply};
    use sl_common::status::{StatusFlags, decode};

    /// Device stand-in with one fitted tray; records transfer commands.
    struct SoakChan {
        fitted_slot: u8,
        sent: Vec<String>,
        fail_transport: bool,
    }

    impl SoakChan {
        fn new(fitted_slot: u8) -> Self {
            Self {
                fitted_slot,
                sent: Vec::new(),
                fail_transport: false,
            }
        }

        fn transfers(&self) -> Vec<&str> {
            self.sent
                .iter()
                .filter(|c| c.contains("transfer"))
                .map(String::as_str)
                .collect()
        }
    }

    impl CommandChannel for SoakChan {
        fn send(&mut self, command: &str) -> std::result::Result<Reply, ChannelError> {
            if self.fail_transport {
                return Err(ChannelError::Transport("link down".into()));
            }
            self.sent.push(command.to_string());
            if let Some(rest) = command.strip_prefix("loader.tray.fitted.get ") {
                let slot: u8 = rest.parse().unwrap();
                Ok(Reply::ok(if slot == self.fitted_slot { "1" } else { "0" }))
            } else if command.starts_with("loader.hotel.fitted.get") {
                Ok(Reply::ok("1"))
            } else if command == protocol::STAGE_BUSY_GET {
                Ok(Reply::ok("0"))
            } else {
                Ok(Reply::ok(""))
            }
        }
    }

    fn idle_snapshot() -> StatusSnapshot {
        let (state, flags) = decode(0);
        StatusSnapshot {
            raw: 0,
            state,
            flags,
            last_error: 0,
            connected: true,
        }
    }

    fn faulted_snapshot() -> StatusSnapshot {
        let raw = StatusFlags::GENERIC_ERROR.bits();
        let (state, flags) = decode(raw);
        StatusSnapshot {
            raw,
            state,
            flags,
            last_error: 14,
            connected: true,
        }
    }

    fn plain_options() -> SoakConfig {
        SoakConfig {
            preview_enabled: false,
            raster_enabled: false,
            scan_only: false,
            raster_points: Vec::new(),
        }
    }

    #[test]
    fn cycles_accumulate_against_an_always_idle_device() {
        let mut chan = SoakChan::new(7);
        let mut soak = SoakScheduler::new(plain_options());
        let mut hooks = NoopHooks;
        soak.start();

        let snap = idle_snapshot();
        for _ in 0..200 {
            soak.tick(&mut chan, &snap, &mut hooks).unwrap();
        }
        assert!(soak.cycles_completed() >= 2, "liveness: cycles must accrue");
        // The same fitted tray cycles every time.
        for transfer in chan.transfers() {
            assert!(transfer.ends_with(" 7"), "unexpected {transfer}");
        }
    }

    #[test]
    fn empty_machine_stops_after_one_revolution() {
        let mut chan = SoakChan::new(0); // no slot matches
        let mut soak = SoakScheduler::new(plain_options());
        let mut hooks = NoopHooks;
        soak.start();

        let snap = idle_snapshot();
        for _ in 0..protocol::TRAY_SLOTS {
            soak.tick(&mut chan, &snap, &mut hooks).unwrap();
        }
        assert_eq!(soak.phase(), SoakPhase::Idle);
        assert_eq!(soak.cycles_completed(), 0);
        assert!(chan.transfers().is_empty());
    }

    #[test]
    fn fault_bit_aborts_the_run() {
        let mut chan = SoakChan::new(7);
        let mut soak = SoakScheduler::new(plain_options());
        let mut hooks = NoopHooks;
        soak.start();

        let idle = idle_snapshot();
        for _ in 0..10 {
            soak.tick(&mut chan, &idle, &mut hooks).unwrap();
        }
        let cycles_before = soak.cycles_completed();

        let err = soak.tick(&mut chan, &faulted_snapshot(), &mut hooks).unwrap_err();
        assert!(matches!(err, LoaderError::Fault(_)));
        assert_eq!(soak.phase(), SoakPhase::Idle);

        // Idle scheduler ignores further ticks.
        soak.tick(&mut chan, &idle, &mut hooks).unwrap();
        assert_eq!(soak.cycles_completed(), cycles_before);
    }

    #[test]
    fn transport_failure_aborts_to_idle() {
        let mut chan = SoakChan::new(7);
        let mut soak = SoakScheduler::new(plain_options());
        let mut hooks = NoopHooks;
        soak.start();

        chan.fail_transport = true;
        let err = soak.tick(&mut chan, &idle_snapshot(), &mut hooks).unwrap_err();
        assert!(matches!(err, LoaderError::Transport(_)));
        assert_eq!(soak.phase(), SoakPhase::Idle);
    }

    #[test]
    fn raster_visits_every_point_before_returning() {
        struct CountingHooks {
            raster: Vec<usize>,
        }
        impl AcquisitionHooks for CountingHooks {
            fn on_raster_position_reached(&mut self, index: usize) {
                self.raster.push(index);
            }
        }

        let mut chan = SoakChan::new(3);
        let mut soak = SoakScheduler::new(SoakConfig {
            raster_enabled: true,
            raster_points: sl_common::config::default_raster_points(),
            ..plain_options()
        });
        let mut hooks = CountingHooks { raster: Vec::new() };
        soak.start();

        let snap = idle_snapshot();
        for _ in 0..60 {
            soak.tick(&mut chan, &snap, &mut hooks).unwrap();
            if soak.cycles_completed() >= 1 {
                break;
            }
        }
        assert_eq!(hooks.raster, vec![0, 1, 2, 3]);
        let moves: Vec<&String> = chan
            .sent
            .iter()
            .filter(|c| c.starts_with("controller.stage.goto-position"))
            .collect();
        assert_eq!(moves.len(), 4);
    }

    #[test]
    fn scan_only_mode_scans_both_hotels() {
        let mut chan = SoakChan::new(0);
        let mut soak = SoakScheduler::new(SoakConfig {
            scan_only: true,
            ..plain_options()
        });
        let mut hooks = NoopHooks;
        soak.start();
        assert_eq!(soak.phase(), SoakPhase::ScanHotel1);

        let snap = idle_snapshot();
        for _ in 0..8 {
            soak.tick(&mut chan, &snap, &mut hooks).unwrap();
        }
        let scans: Vec<&String> = chan
            .sent
            .iter()
            .filter(|c| c.starts_with("loader.hotel.scan"))
            .collect();
        assert!(scans.len() >= 2);
        assert!(soak.cycles_completed() >= 1);
        assert!(chan.transfers().is_empty());
    }

    #[test]
    fn stop_is_idempotent_and_halts_commands() {
        let mut chan = SoakChan::new(7);
        let mut soak = SoakScheduler::new(plain_options());
        let mut hooks = NoopHooks;
        soak.start();
        soak.tick(&mut chan, &idle_snapshot(), &mut hooks).unwrap();
        soak.stop();
        soak.stop();
        let sent_before = chan.sent.len();
        soak.tick(&mut chan, &idle_snapshot(), &mut hooks).unwrap();
        assert_eq!(chan.sent.len(), sent_before);
    }
}
