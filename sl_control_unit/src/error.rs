//! Error taxonomy for the orchestration core.
//!
//! Three families, because they recover differently:
//!
//! - `Device`/`Transport`: the channel reported a non-OK code or failed
//!   outright. Fatal to the current step; the surrounding session recovers
//!   by back-stepping or aborting to idle. Never retried automatically.
//! - `SensorMismatch`: a physical check disagreed with a precondition.
//!   Recovery is "fix the physical setup and retry the step".
//! - `Fault`: a runtime fault observed asynchronously through status bits.
//!   Halts the procedure; the operator must re-initialise.

use sl_common::channel::{ChannelError, CommandChannel, Reply};
use sl_common::reason::reason_for_code;
use sl_common::status::StatusFlags;
use std::time::Duration;
use thiserror::Error;

/// Core error type.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    /// The device answered with a non-OK status code.
    #[error("device error {code}: {reason}")]
    Device { code: i32, reason: &'static str },

    /// The transport failed to carry the exchange.
    #[error(transparent)]
    Transport(#[from] ChannelError),

    /// A reply arrived but its body could not be interpreted.
    #[error("malformed reply to {command}: {body:?}")]
    Malformed { command: String, body: String },

    /// A physical sensor disagreed with the expected precondition.
    #[error("sensor mismatch: {0}")]
    SensorMismatch(&'static str),

    /// A runtime fault surfaced through the polled status bits.
    #[error("device fault: {0:?}")]
    Fault(StatusFlags),

    /// A bounded wait expired before the device went idle.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: &'static str, after: Duration },

    /// The operation was cancelled by the operator.
    #[error("operation cancelled")]
    Cancelled,
}

impl LoaderError {
    /// Build a `Device` error from a raw status code, attaching the fixed
    /// reason string.
    pub const fn device(code: i32) -> Self {
        Self::Device {
            code,
            reason: reason_for_code(code),
        }
    }
}

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Send one command and promote a non-OK status code to [`LoaderError`].
///
/// The benign code 1 ("already in requested state") passes through as
/// success, matching device semantics.
pub fn exec(chan: &mut dyn CommandChannel, command: &str) -> Result<Reply> {
    let reply = chan.send(command)?;
    if reply.is_ok() {
        Ok(reply)
    } else {
        Err(LoaderError::device(reply.code))
    }
}

/// Send a query command and parse its body as an integer.
pub fn exec_parse<T: std::str::FromStr>(chan: &mut dyn CommandChannel, command: &str) -> Result<T> {
    let reply = exec(chan, command)?;
    reply
        .body
        .trim()
        .parse::<T>()
        .map_err(|_| LoaderError::Malformed {
            command: command.to_string(),
            body: reply.body.clone(),
        })
}

/// Send a sensor query and interpret "1"/"0" as a boolean.
pub fn exec_bool(chan: &mut dyn CommandChannel, command: &str) -> Result<bool> {
    let reply = exec(chan, command)?;
    match reply.body.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(LoaderError::Malformed {
            command: command.to_string(),
            body: reply.body.clone(),
        }),
    }
}
