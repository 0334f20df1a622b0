//! Command channel trait boundary.
//!
//! The physical transport (serial/USB behind the vendor SDK) is an
//! external collaborator. The core sees only a synchronous request/response
//! pair: send one dotted command string, receive an integer status code and
//! a response string. Implementations live outside the core (`sl_sim` for
//! development/tests, the real transport in production).

use thiserror::Error;

/// Link-level failure, distinct from a device-reported error code.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The transport failed to carry the request or response.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The channel has been closed and can accept no further commands.
    #[error("channel closed")]
    Closed,
}

/// One device response: status code plus response body.
///
/// Code `0` is success; `1` is the benign "already in requested state"
/// success variant. Any other code is a device error mapped through
/// [`crate::reason::reason_for_code`].
#[derive(Debug, Clone)]
pub struct Reply {
    /// Device status code.
    pub code: i32,
    /// Response body (may be empty).
    pub body: String,
}

impl Reply {
    /// Build a success reply with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            code: 0,
            body: body.into(),
        }
    }

    /// Build an error reply with the given device code.
    pub fn err(code: i32) -> Self {
        Self {
            code,
            body: String::new(),
        }
    }

    /// True for code 0 and the benign already-in-state code 1.
    #[inline]
    pub const fn is_ok(&self) -> bool {
        self.code == 0 || self.code == 1
    }
}

/// Synchronous command channel to the loader.
///
/// The channel is a single shared resource: `&mut self` makes at most one
/// logical operation a sender at any time, which is the whole concurrency
/// contract the device offers.
pub trait CommandChannel {
    /// Send one command string and wait for its response.
    fn send(&mut self, command: &str) -> Result<Reply, ChannelError>;
}

impl<C: CommandChannel + ?Sized> CommandChannel for &mut C {
    fn send(&mut self, command: &str) -> Result<Reply, ChannelError> {
        (**self).send(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_one_is_benign_success() {
        assert!(Reply::ok("").is_ok());
        assert!(Reply { code: 1, body: String::new() }.is_ok());
        assert!(!Reply::err(9).is_ok());
    }
}
