//! SL Common Library
//!
//! Shared types and definitions for the slide/tray loader workspace.
//!
//! # Module Structure
//!
//! - [`axis`] - Axis definitions and unit conversion
//! - [`status`] - Device status word decoding and major state
//! - [`calibration`] - Persisted calibration profile bitfield
//! - [`channel`] - Command channel trait boundary
//! - [`protocol`] - Fixed dotted-command vocabulary
//! - [`reason`] - Device error-code reason table
//! - [`config`] - Configuration loading traits and types

pub mod axis;
pub mod calibration;
pub mod channel;
pub mod config;
pub mod protocol;
pub mod reason;
pub mod status;
