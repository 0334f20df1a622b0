//! Wizard effect execution.
//!
//! [`EffectRunner`] owns the borrows a wizard step needs: the command
//! channel, the axis controller, the setup-flag store, the confirmation
//! capability and the cancel token. Effects run strictly in order; probe
//! and confirmation effects produce a feedback event which
//! [`advance`] loops back into the wizard until a step settles.

use super::{Effect, Effects, StateMachine, WizardEvent};
use crate::axis_ctl::AxisController;
use crate::cancel::CancelToken;
use crate::error::{LoaderError, Result, exec, exec_bool, exec_parse};
use crate::setup_flags::SetupFlagStore;
use sl_common::axis::Axis;
use sl_common::channel::CommandChannel;
use sl_common::config::TimingConfig;
use sl_common::protocol;
use sl_common::status::{MajorState, StatusFlags, decode};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Stage position with the clamp fully open, in microns.
const OPEN_CLAMP_X_UM: i64 = 0;
const OPEN_CLAMP_Y_UM: i64 = 60_000;

/// Operator confirmation capability. The host surface decides how the
/// question is presented.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Scripted answers for tests and unattended runs. Consumes the queue
/// front-first, then falls back to the default answer.
#[derive(Debug)]
pub struct ScriptedConfirm {
    answers: std::collections::VecDeque<bool>,
    fallback: bool,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            fallback: true,
        }
    }

    /// Answer every question the same way.
    pub fn always(answer: bool) -> Self {
        Self {
            answers: std::collections::VecDeque::new(),
            fallback: answer,
        }
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        let answer = self.answers.pop_front().unwrap_or(self.fallback);
        debug!("confirm {prompt:?} -> {answer}");
        answer
    }
}

/// Executes one wizard step's effects against the device.
pub struct EffectRunner<'a> {
    chan: &'a mut dyn CommandChannel,
    axes: &'a AxisController,
    flags: &'a mut SetupFlagStore,
    confirm: &'a mut dyn Confirm,
    cancel: &'a CancelToken,
    busy_poll_interval: Duration,
    wait_idle_timeout: Duration,
    jog_axes: &'static [Axis],
}

impl<'a> EffectRunner<'a> {
    pub fn new(
        chan: &'a mut dyn CommandChannel,
        axes: &'a AxisController,
        flags: &'a mut SetupFlagStore,
        confirm: &'a mut dyn Confirm,
        cancel: &'a CancelToken,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            chan,
            axes,
            flags,
            confirm,
            cancel,
            busy_poll_interval: timing.busy_poll_interval(),
            wait_idle_timeout: timing.wait_idle_timeout(),
            jog_axes: &[],
        }
    }

    /// Axes the most recent `EnableJog` effect handed to the operator.
    pub fn jog_axes(&self) -> &'static [Axis] {
        self.jog_axes
    }

    /// Run one effect list in order. At most one effect per step produces
    /// feedback; the last one wins if a step ever carries several.
    pub fn run(&mut self, effects: &Effects) -> Result<Option<WizardEvent>> {
        let mut feedback = None;
        for effect in effects {
            if let Some(event) = self.run_one(effect)? {
                feedback = Some(event);
            }
        }
        Ok(feedback)
    }

    fn run_one(&mut self, effect: &Effect) -> Result<Option<WizardEvent>> {
        debug!("effect {effect:?}");
        match *effect {
            Effect::EjectHotels => {
                self.wait_device_idle("hotel eject")?;
                exec(self.chan, protocol::HOTELS_EJECT)?;
                self.wait_device_idle("hotel eject")?;
                Ok(None)
            }
            Effect::LoadHotels => {
                self.wait_device_idle("hotel load")?;
                exec(self.chan, protocol::HOTELS_LOAD)?;
                self.wait_device_idle("hotel load")?;
                Ok(None)
            }
            Effect::ProbeHotel { hotel } => {
                let fitted = exec_bool(self.chan, &protocol::hotel_fitted_get(hotel))?;
                Ok(Some(WizardEvent::HotelFitted(fitted)))
            }
            Effect::ProbeBothHotels => {
                let mut all = true;
                for hotel in 1..=protocol::HOTEL_COUNT {
                    all &= exec_bool(self.chan, &protocol::hotel_fitted_get(hotel))?;
                }
                Ok(Some(WizardEvent::HotelsFitted(all)))
            }
            Effect::ProbeTrayOnStage => {
                let occupied = exec_bool(self.chan, protocol::TRAY_ON_STAGE_GET)?;
                Ok(Some(WizardEvent::TrayOnStage(occupied)))
            }
            Effect::StageToOpenClamp => {
                exec(
                    self.chan,
                    &protocol::stage_goto(OPEN_CLAMP_X_UM, OPEN_CLAMP_Y_UM),
                )?;
                self.wait_stage_idle()?;
                Ok(None)
            }
            Effect::HomeShuttle => {
                self.axes.home(self.chan, Axis::Stm)?;
                self.axes.wait_idle(self.chan, Axis::Stm, self.cancel)?;
                Ok(None)
            }
            Effect::EnableJog(axes) => {
                self.jog_axes = axes;
                debug!("jog enabled for {axes:?}");
                Ok(None)
            }
            Effect::JogMm { axis, mm } => {
                self.axes.jog_by_mm(self.chan, axis, mm)?;
                self.axes.wait_idle(self.chan, axis, self.cancel)?;
                Ok(None)
            }
            Effect::PresentTray => {
                self.wait_device_idle("tray present")?;
                exec(self.chan, protocol::TRAY_PRESENT)?;
                self.wait_device_idle("tray present")?;
                Ok(None)
            }
            Effect::PullTrayToStage => {
                self.wait_device_idle("tray pull")?;
                exec(self.chan, protocol::TRAY_PULL_TO_STAGE)?;
                self.wait_device_idle("tray pull")?;
                Ok(None)
            }
            Effect::ScanHotel(hotel) => {
                self.wait_device_idle("hotel scan")?;
                exec(self.chan, &protocol::hotel_scan(hotel))?;
                self.wait_device_idle("hotel scan")?;
                Ok(None)
            }
            Effect::VerifyOccupancy => {
                let ok = self.verify_occupancy()?;
                Ok(Some(WizardEvent::OccupancyOk(ok)))
            }
            Effect::LoadTray { hotel, apartment } => {
                self.transfer(protocol::hotel_apartment_to_tray(hotel, apartment), true)
            }
            Effect::UnloadTray { hotel, apartment } => {
                self.transfer(protocol::hotel_apartment_to_tray(hotel, apartment), false)
            }
            Effect::Ask(prompt) => {
                let answer = self.confirm.confirm(prompt);
                Ok(Some(WizardEvent::Confirmed(answer)))
            }
            Effect::MarkHotelCalibrated => {
                info!("hotel alignment recorded");
                self.flags.mark_hotel_done(self.chan)?;
                Ok(None)
            }
            Effect::MarkStageCalibrated => {
                info!("stage position recorded");
                self.flags.mark_stage_done(self.chan)?;
                Ok(None)
            }
        }
    }

    /// Tray transfer with an idle precondition: waits the bounded idle
    /// window first, and a device still busy after it yields `StepFailed`
    /// so the wizard back-steps instead of erroring out.
    fn transfer(&mut self, tray: u8, to_stage: bool) -> Result<Option<WizardEvent>> {
        match self.wait_device_idle("tray transfer") {
            Ok(()) => {}
            Err(LoaderError::Timeout { .. }) => {
                warn!("transfer of tray {tray} refused, device still busy");
                return Ok(Some(WizardEvent::StepFailed));
            }
            Err(e) => return Err(e),
        }
        let command = if to_stage {
            protocol::transfer_to_stage(tray)
        } else {
            protocol::transfer_from_stage(tray)
        };
        exec(self.chan, &command)?;
        self.wait_device_idle("tray transfer")?;
        Ok(None)
    }

    fn verify_occupancy(&mut self) -> Result<bool> {
        for hotel in 1..=protocol::HOTEL_COUNT {
            for apartment in 1..=protocol::APARTMENTS_PER_HOTEL {
                let occupied = exec_bool(
                    self.chan,
                    &protocol::apartment_occupied_get(hotel, apartment),
                )?;
                let expected = super::check::expected_occupied(apartment);
                if occupied != expected {
                    warn!(
                        "occupancy mismatch at hotel {hotel} apartment {apartment}: \
                         expected {expected}, found {occupied}"
                    );
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn device_status(&mut self) -> Result<(MajorState, StatusFlags)> {
        let raw: u32 = exec_parse(self.chan, protocol::STATUS_GET)?;
        Ok(decode(raw))
    }

    /// Poll the status word until the loader is idle. Checks the cancel
    /// token and the deadline on every iteration, and promotes fault bits
    /// to an error immediately.
    fn wait_device_idle(&mut self, what: &'static str) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return Err(LoaderError::Cancelled);
            }
            let (state, flags) = self.device_status()?;
            if flags.has_fault() {
                return Err(LoaderError::Fault(flags));
            }
            if state == MajorState::Idle && !flags.contains(StatusFlags::NOT_IDLE) {
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= self.wait_idle_timeout {
                return Err(LoaderError::Timeout {
                    what,
                    after: elapsed,
                });
            }
            std::thread::sleep(self.busy_poll_interval);
        }
    }

    fn wait_stage_idle(&mut self) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return Err(LoaderError::Cancelled);
            }
            if !self.axes.stage_busy(self.chan)? {
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= self.wait_idle_timeout {
                return Err(LoaderError::Timeout {
                    what: "stage move",
                    after: elapsed,
                });
            }
            std::thread::sleep(self.busy_poll_interval);
        }
    }
}

/// Apply one operator event and settle the resulting feedback chain.
///
/// Every feedback event (sensor probe, confirmation, step failure) is fed
/// straight back into the wizard until a step completes without feedback.
/// Chains are finite: each feedback-producing state routes to a state
/// whose entry effects either produce none or consume an operator answer.
pub fn advance<M: StateMachine>(
    wizard: &mut M,
    runner: &mut EffectRunner<'_>,
    event: WizardEvent,
) -> Result<M::State> {
    let mut step = wizard.handle(event);
    loop {
        match runner.run(&step.effects)? {
            Some(feedback) => step = wizard.handle(feedback),
            None => return Ok(step.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_common::channel::{ChannelError, Reply};

    /// Minimal device stand-in: idle status, configurable sensors.
    struct StubDevice {
        sent: Vec<String>,
        hotel_fitted: bool,
        tray_on_stage: bool,
    }

    impl StubDevice {
        fn new() -> Self {
            Self {
                sent: Vec::new(),
                hotel_fitted: true,
                tray_on_stage: false,
            }
        }
    }

    impl CommandChannel for StubDevice {
        fn send(&mut self, command: &str) -> std::result::Result<Reply, ChannelError> {
            self.sent.push(command.to_string());
            if command == protocol::STATUS_GET {
                Ok(Reply::ok("0"))
            } else if command.starts_with("loader.hotel.fitted.get") {
                Ok(Reply::ok(if self.hotel_fitted { "1" } else { "0" }))
            } else if command == protocol::TRAY_ON_STAGE_GET {
                Ok(Reply::ok(if self.tray_on_stage { "1" } else { "0" }))
            } else if command.ends_with("busy.get") {
                Ok(Reply::ok("0"))
            } else if command.ends_with("position.get") {
                Ok(Reply::ok("0"))
            } else if command == protocol::SETUP_FLAGS_GET {
                Ok(Reply::ok("0"))
            } else {
                Ok(Reply::ok(""))
            }
        }
    }

    fn timing() -> TimingConfig {
        TimingConfig {
            poll_interval_ms: 1,
            busy_poll_interval_ms: 0,
            wait_idle_timeout_s: 0.05,
        }
    }

    #[test]
    fn probe_effects_produce_feedback_events() {
        let mut device = StubDevice::new();
        let axes = AxisController::new(&timing());
        let mut flags = SetupFlagStore::new();
        let mut confirm = ScriptedConfirm::always(true);
        let cancel = CancelToken::new();
        let mut runner = EffectRunner::new(
            &mut device,
            &axes,
            &mut flags,
            &mut confirm,
            &cancel,
            &timing(),
        );

        let fx = crate::wizard::effects([Effect::ProbeHotel { hotel: 1 }]);
        assert_eq!(
            runner.run(&fx).unwrap(),
            Some(WizardEvent::HotelFitted(true))
        );

        let fx = crate::wizard::effects([Effect::ProbeTrayOnStage]);
        assert_eq!(
            runner.run(&fx).unwrap(),
            Some(WizardEvent::TrayOnStage(false))
        );
    }

    #[test]
    fn ask_routes_through_the_confirm_capability() {
        let mut device = StubDevice::new();
        let axes = AxisController::new(&timing());
        let mut flags = SetupFlagStore::new();
        let mut confirm = ScriptedConfirm::new(&[false]);
        let cancel = CancelToken::new();
        let mut runner = EffectRunner::new(
            &mut device,
            &axes,
            &mut flags,
            &mut confirm,
            &cancel,
            &timing(),
        );
        let fx = crate::wizard::effects([Effect::Ask("proceed?")]);
        assert_eq!(
            runner.run(&fx).unwrap(),
            Some(WizardEvent::Confirmed(false))
        );
    }

    #[test]
    fn mark_effects_push_ram_but_never_save() {
        let mut device = StubDevice::new();
        let axes = AxisController::new(&timing());
        let mut flags = SetupFlagStore::new();
        let mut confirm = ScriptedConfirm::always(true);
        let cancel = CancelToken::new();
        let mut runner = EffectRunner::new(
            &mut device,
            &axes,
            &mut flags,
            &mut confirm,
            &cancel,
            &timing(),
        );
        let fx = crate::wizard::effects([Effect::MarkHotelCalibrated]);
        runner.run(&fx).unwrap();
        assert!(flags.profile().hotel_calibrated());
        assert!(
            device
                .sent
                .iter()
                .any(|c| c.starts_with("loader.setupflags.set "))
        );
        assert!(!device.sent.iter().any(|c| c == protocol::SETUP_FLAGS_SAVE));
    }

    #[test]
    fn cancelled_token_aborts_waits() {
        let mut device = StubDevice::new();
        let axes = AxisController::new(&timing());
        let mut flags = SetupFlagStore::new();
        let mut confirm = ScriptedConfirm::always(true);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut runner = EffectRunner::new(
            &mut device,
            &axes,
            &mut flags,
            &mut confirm,
            &cancel,
            &timing(),
        );
        let fx = crate::wizard::effects([Effect::EjectHotels]);
        assert!(matches!(runner.run(&fx), Err(LoaderError::Cancelled)));
    }
}
