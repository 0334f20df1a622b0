//! Periodic status polling with edge detection.
//!
//! The poller owns the only mutable status cache. The host loop calls
//! [`StatusPoller::tick`] on its chosen cadence (around 150–200 ms); each
//! tick reads the status word and the last-error code, decodes them, and
//! compares against the previous snapshot. Consumers only ever see
//! copy-on-read [`StatusSnapshot`] values, so there are no torn reads.
//!
//! A transport failure during a tick is swallowed: the stale snapshot is
//! retained and the poller never takes down the host loop. Persistent
//! trouble surfaces through the comms-error status bit on the next
//! successful read.

use crate::error::{Result, exec_parse};
use sl_common::channel::CommandChannel;
use sl_common::protocol;
use sl_common::status::{MajorState, StatusFlags, decode};
use tracing::{debug, info};

/// Copy-on-read view of the device status at one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Raw status word as reported.
    pub raw: u32,
    /// Decoded major state.
    pub state: MajorState,
    /// Decoded condition flags.
    pub flags: StatusFlags,
    /// Last device error code.
    pub last_error: i32,
    /// Whether the controller link is up.
    pub connected: bool,
}

impl Default for StatusSnapshot {
    /// Before the first successful poll nothing is known.
    fn default() -> Self {
        let raw = StatusFlags::NOT_CONNECTED.bits();
        let (state, flags) = decode(raw);
        Self {
            raw,
            state,
            flags,
            last_error: 0,
            connected: false,
        }
    }
}

impl StatusSnapshot {
    /// True when the device will accept the next irreversible command.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == MajorState::Idle && !self.flags.contains(StatusFlags::NOT_IDLE)
    }
}

/// Edge transitions detected between two consecutive ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusEdges {
    /// Connectivity changed; the new value.
    pub connectivity: Option<bool>,
    /// Major state changed; (previous, current).
    pub state_change: Option<(MajorState, MajorState)>,
}

impl StatusEdges {
    /// No edges this tick.
    pub fn is_empty(&self) -> bool {
        self.connectivity.is_none() && self.state_change.is_none()
    }
}

/// Owns the status cache; updated only by [`tick`](Self::tick).
#[derive(Debug, Default)]
pub struct StatusPoller {
    last: StatusSnapshot,
    ticks: u64,
}

impl StatusPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot (stale if recent ticks failed).
    #[inline]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.last
    }

    /// Total ticks attempted.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Poll once. Returns the edges between the previous and the new
    /// snapshot; on transport failure the stale snapshot is retained and
    /// no edges are reported.
    pub fn tick(&mut self, chan: &mut dyn CommandChannel) -> StatusEdges {
        self.ticks += 1;
        match Self::read(chan) {
            Ok(snapshot) => {
                let edges = self.diff(&snapshot);
                if let Some(connected) = edges.connectivity {
                    info!("loader connectivity changed: connected={connected}");
                }
                if let Some((from, to)) = edges.state_change {
                    debug!("loader state {from:?} -> {to:?}");
                }
                self.last = snapshot;
                edges
            }
            Err(e) => {
                // Keep the stale snapshot; the poller must not crash the
                // host loop over one bad exchange.
                debug!("status poll failed, keeping stale snapshot: {e}");
                StatusEdges::default()
            }
        }
    }

    fn read(chan: &mut dyn CommandChannel) -> Result<StatusSnapshot> {
        let raw: u32 = exec_parse(chan, protocol::STATUS_GET)?;
        let last_error: i32 = exec_parse(chan, protocol::LAST_ERROR_GET)?;
        let (state, flags) = decode(raw);
        Ok(StatusSnapshot {
            raw,
            state,
            flags,
            last_error,
            connected: !flags.contains(StatusFlags::NOT_CONNECTED),
        })
    }

    fn diff(&self, new: &StatusSnapshot) -> StatusEdges {
        StatusEdges {
            connectivity: (self.last.connected != new.connected).then_some(new.connected),
            state_change: (self.last.state != new.state).then_some((self.last.state, new.state)),
        }
    }
}
