//! # SL Control Unit
//!
//! Orchestration core for a motorized slide/tray loader: translates
//! high-level intents (calibrate the hotel alignment, run an unattended
//! soak cycle, move tray N to the stage) into sequences of primitive
//! device commands over a synchronous request/response channel, and keeps
//! the robot in a safe, recoverable state across multi-minute,
//! user-interruptible procedures.
//!
//! ## Architecture
//!
//! - [`axis_ctl`] — per-axis moves, jogs and bounded cooperative waits
//! - [`poller`] — periodic status decoding with edge detection
//! - [`setup_flags`] — two-phase calibration profile persistence
//! - [`wizard`] — user-paced calibration state machines
//! - [`soak`] — autonomous tick-driven endurance scheduler
//! - [`session`] — facade tying the pieces to one channel
//!
//! State machines are pure: transitions return effect lists which the
//! [`wizard::runner`] executes against the channel, so every wizard can be
//! exercised in tests without a device.

pub mod axis_ctl;
pub mod cancel;
pub mod error;
pub mod poller;
pub mod session;
pub mod setup_flags;
pub mod soak;
pub mod wizard;

pub use cancel::CancelToken;
pub use error::{LoaderError, Result};
