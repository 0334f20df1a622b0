//! Per-axis command issue and bounded busy-waiting.
//!
//! Axis moves are fire-and-forget commands; the only synchronization
//! primitive the device offers is the per-axis busy flag. `wait_idle`
//! therefore polls cooperatively: every iteration checks the cancel token
//! and the deadline before sleeping one interval, so an emergency stop is
//! never blocked behind an unresponsive axis.

use crate::cancel::CancelToken;
use crate::error::{LoaderError, Result, exec, exec_bool, exec_parse};
use sl_common::axis::{Axis, mm_to_counts};
use sl_common::channel::CommandChannel;
use sl_common::config::TimingConfig;
use sl_common::protocol;
use std::time::{Duration, Instant};
use tracing::debug;

/// Issues axis commands and supervises completion.
#[derive(Debug, Clone)]
pub struct AxisController {
    busy_poll_interval: Duration,
    wait_idle_timeout: Duration,
}

impl AxisController {
    /// Build from the timing section of the loader config.
    pub fn new(timing: &TimingConfig) -> Self {
        Self {
            busy_poll_interval: timing.busy_poll_interval(),
            wait_idle_timeout: timing.wait_idle_timeout(),
        }
    }

    /// Absolute move to `counts`. Does not block; pair with [`wait_idle`].
    ///
    /// [`wait_idle`]: Self::wait_idle
    pub fn move_to(&self, chan: &mut dyn CommandChannel, axis: Axis, counts: i64) -> Result<()> {
        exec(chan, &protocol::goto_position(axis, counts))?;
        Ok(())
    }

    /// Current encoder count for `axis`.
    pub fn position(&self, chan: &mut dyn CommandChannel, axis: Axis) -> Result<i64> {
        exec_parse(chan, &protocol::position_get(axis))
    }

    /// Relative jog: read the current position, add `delta_counts`, issue
    /// an absolute move to the sum. Fails if either exchange fails.
    pub fn jog_by(&self, chan: &mut dyn CommandChannel, axis: Axis, delta_counts: i64) -> Result<()> {
        let current = self.position(chan, axis)?;
        self.move_to(chan, axis, current + delta_counts)
    }

    /// Relative jog expressed in millimetres.
    pub fn jog_by_mm(&self, chan: &mut dyn CommandChannel, axis: Axis, mm: f64) -> Result<()> {
        self.jog_by(chan, axis, mm_to_counts(axis, mm))
    }

    /// Continuous velocity move; zero stops the axis. Used for
    /// press-and-hold manual jogging.
    pub fn move_at_velocity(
        &self,
        chan: &mut dyn CommandChannel,
        axis: Axis,
        counts_per_s: i64,
    ) -> Result<()> {
        exec(chan, &protocol::move_at_velocity(axis, counts_per_s))?;
        Ok(())
    }

    /// Stop one axis (velocity zero).
    pub fn stop(&self, chan: &mut dyn CommandChannel, axis: Axis) -> Result<()> {
        self.move_at_velocity(chan, axis, 0)
    }

    /// Stop every axis. The emergency-stop path; keeps going past
    /// per-axis failures so one dead axis cannot shield the rest.
    pub fn stop_all(&self, chan: &mut dyn CommandChannel) -> Result<()> {
        let mut first_err = None;
        for axis in Axis::ALL {
            if let Err(e) = self.stop(chan, axis) {
                debug!("stop {axis:?} failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Home the axis against its reference sensor. Does not block.
    pub fn home(&self, chan: &mut dyn CommandChannel, axis: Axis) -> Result<()> {
        exec(chan, &protocol::home(axis))?;
        Ok(())
    }

    /// Whether the axis reports motion in progress.
    pub fn is_busy(&self, chan: &mut dyn CommandChannel, axis: Axis) -> Result<bool> {
        exec_bool(chan, &protocol::busy_get(axis))
    }

    /// Poll the axis busy flag until idle.
    ///
    /// Bounded: returns `Timeout` once `wait_idle_timeout` elapses, and
    /// `Cancelled` as soon as the token is set. Both checks run on every
    /// iteration, before the sleep.
    pub fn wait_idle(
        &self,
        chan: &mut dyn CommandChannel,
        axis: Axis,
        cancel: &CancelToken,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(LoaderError::Cancelled);
            }
            if !self.is_busy(chan, axis)? {
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= self.wait_idle_timeout {
                return Err(LoaderError::Timeout {
                    what: axis.namespace(),
                    after: elapsed,
                });
            }
            std::thread::sleep(self.busy_poll_interval);
        }
    }

    /// Combined stage-pair busy query.
    pub fn stage_busy(&self, chan: &mut dyn CommandChannel) -> Result<bool> {
        exec_bool(chan, protocol::STAGE_BUSY_GET)
    }
}
