//! Loader session facade.
//!
//! Owns the command channel and everything that competes for it: the
//! status poller, the axis controller and the setup-flag store. One
//! session per physical loader; the single `&mut self` on every method is
//! what serialises channel access, there are no locks underneath.

use crate::axis_ctl::AxisController;
use crate::cancel::CancelToken;
use crate::error::{Result, exec};
use crate::poller::{StatusEdges, StatusPoller, StatusSnapshot};
use crate::setup_flags::SetupFlagStore;
use crate::soak::{AcquisitionHooks, SoakScheduler};
use crate::wizard::runner::{Confirm, EffectRunner};
use sl_common::calibration::{CalibrationProfile, HeightType};
use sl_common::channel::CommandChannel;
use sl_common::config::{LoaderConfig, TimingConfig};
use sl_common::protocol;
use tracing::{info, warn};

/// One connected loader and the state orbiting its channel.
pub struct LoaderSession<C: CommandChannel> {
    chan: C,
    poller: StatusPoller,
    flags: SetupFlagStore,
    axes: AxisController,
    cancel: CancelToken,
    timing: TimingConfig,
    connected: bool,
}

impl<C: CommandChannel> LoaderSession<C> {
    pub fn new(chan: C, config: &LoaderConfig) -> Self {
        Self {
            chan,
            poller: StatusPoller::new(),
            flags: SetupFlagStore::new(),
            axes: AxisController::new(&config.timing),
            cancel: CancelToken::new(),
            timing: config.timing.clone(),
            connected: false,
        }
    }

    /// Open the controller link and read the calibration profile.
    pub fn connect(&mut self, port: u16) -> Result<()> {
        exec(&mut self.chan, &protocol::connect(port))?;
        self.connected = true;
        info!("connected to loader on port {port}");
        self.flags.load(&mut self.chan)?;
        Ok(())
    }

    /// Close the controller link. The session keeps its last snapshot.
    pub fn disconnect(&mut self) -> Result<()> {
        exec(&mut self.chan, protocol::DISCONNECT)?;
        self.connected = false;
        info!("disconnected from loader");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Controller identification string.
    pub fn controller_info(&mut self) -> Result<String> {
        let reply = exec(&mut self.chan, protocol::CONTROLLER_INFO_GET)?;
        Ok(reply.body)
    }

    /// One status poll tick; edge transitions are logged by the poller.
    pub fn poll(&mut self) -> StatusEdges {
        self.poller.tick(&mut self.chan)
    }

    /// Latest status snapshot (copy-on-read).
    pub fn status(&self) -> StatusSnapshot {
        self.poller.snapshot()
    }

    /// Clone of the session's cancel token, for wiring a stop control.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn axes(&self) -> &AxisController {
        &self.axes
    }

    // ─── Calibration profile ────────────────────────────────────────

    /// Working copy of the calibration profile.
    pub fn profile(&self) -> CalibrationProfile {
        self.flags.profile()
    }

    pub fn set_height_type(&mut self, tag: HeightType) {
        self.flags.set_height_type(tag);
    }

    pub fn clear_hotel_flag(&mut self) {
        self.flags.clear_hotel_flag();
    }

    pub fn clear_stage_flag(&mut self) {
        self.flags.clear_stage_flag();
    }

    pub fn clear_all_flags(&mut self) {
        self.flags.clear_all();
    }

    /// Push the working profile to device RAM (cheap, safe).
    pub fn push_setup_flags(&mut self) -> Result<()> {
        self.flags.push_working_copy(&mut self.chan)
    }

    /// Commit the profile to EEPROM. The exchange owns the channel for
    /// its whole duration, so status polling is naturally suspended; do
    /// not interleave motion while the motors are powered down.
    pub fn commit_setup_flags(&mut self) -> Result<()> {
        self.flags.push_working_copy(&mut self.chan)?;
        self.flags.commit_nonvolatile(&mut self.chan)
    }

    // ─── Procedures ─────────────────────────────────────────────────

    /// Build an effect runner for driving a wizard over this session.
    pub fn runner<'a>(&'a mut self, confirm: &'a mut dyn Confirm) -> EffectRunner<'a> {
        EffectRunner::new(
            &mut self.chan,
            &self.axes,
            &mut self.flags,
            confirm,
            &self.cancel,
            &self.timing,
        )
    }

    /// One soak scheduler tick against the latest snapshot.
    pub fn soak_tick(
        &mut self,
        soak: &mut SoakScheduler,
        hooks: &mut dyn AcquisitionHooks,
    ) -> Result<()> {
        let snapshot = self.poller.snapshot();
        soak.tick(&mut self.chan, &snapshot, hooks)
    }

    /// Emergency stop: cancel every cooperative wait, then drive all
    /// axes to velocity zero.
    pub fn emergency_stop(&mut self) -> Result<()> {
        warn!("emergency stop requested");
        self.cancel.cancel();
        self.axes.stop_all(&mut self.chan)
    }

    /// Re-arm after an emergency stop.
    pub fn reset_cancel(&mut self) {
        self.cancel.reset();
    }

    /// Direct channel access, for host surfaces issuing ad-hoc queries.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.chan
    }
}
