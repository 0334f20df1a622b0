//! Device status word decoding.
//!
//! The loader reports a single `u32` status word, refreshed by periodic
//! polling. The low nibble is a mutually-exclusive major-state field; the
//! bits above it are independent condition flags. Decoding is total: every
//! possible word maps to exactly one [`MajorState`] plus a flag set.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Mask of the major-state field within the status word.
pub const STATE_FIELD_MASK: u32 = 0x0000_000F;

bitflags! {
    /// Named condition flags decoded from the status word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u32 {
        /// No controller connected.
        const NOT_CONNECTED     = 0x0000_0010;
        /// Controller connected but not initialised.
        const NOT_INITIALISED   = 0x0000_0020;
        /// Calibration incomplete — wizards must be run.
        const NOT_SETUP         = 0x0000_0040;
        /// Hotel racks are ejected from the machine.
        const HOTEL_EJECTED     = 0x0000_0080;
        /// A mechanism is in motion.
        const NOT_IDLE          = 0x0000_0100;
        /// Hotel contents have not been scanned.
        const HOTEL_NOT_SCANNED = 0x0000_0200;
        /// Requested tray index is invalid or unoccupied.
        const INVALID_TRAY      = 0x0000_0400;
        /// Requested hotel index is invalid or not fitted.
        const INVALID_HOTEL     = 0x0000_0800;
        /// The tray-on-stage sensor reads occupied.
        const TRAY_ON_STAGE     = 0x0000_1000;
        /// Communication fault with a loader subsystem.
        const COMMS_ERROR       = 0x0000_2000;
        /// Tray presence sensor fault. **FAULT — operator intervention.**
        const TRAY_SENSOR_ERROR = 0x0000_4000;
        /// An axis stalled mid-move. **FAULT — operator intervention.**
        const AXIS_STALLED      = 0x0000_8000;
        /// Unclassified device fault. **FAULT — operator intervention.**
        const GENERIC_ERROR     = 0x0001_0000;
    }
}

impl StatusFlags {
    /// Mask of runtime faults that halt wizards and the soak scheduler.
    pub const FAULT_MASK: Self = Self::from_bits_truncate(
        Self::COMMS_ERROR.bits()
            | Self::TRAY_SENSOR_ERROR.bits()
            | Self::AXIS_STALLED.bits()
            | Self::GENERIC_ERROR.bits(),
    );

    /// Returns true if any fault flag is set.
    #[inline]
    pub const fn has_fault(&self) -> bool {
        self.intersects(Self::FAULT_MASK)
    }
}

/// Mutually-exclusive major device state, masked out of the status word.
///
/// Exactly one major state is active at any time. Wizards and the soak
/// scheduler poll until `Idle` before issuing the next irreversible
/// command; the device silently ignores or errors on commands issued
/// while busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MajorState {
    /// Ready, no motion in progress.
    Idle = 0,
    /// First-run setup (calibration incomplete).
    Setup = 1,
    /// Power-on initialisation in progress.
    Initialising = 2,
    /// Motion stopped by operator or fault.
    Stop = 3,
    /// Moving a tray from a hotel to the stage.
    TransferToStage = 4,
    /// Moving a tray from the stage back to a hotel.
    TransferFromStage = 5,
    /// Scanning hotel apartments for trays.
    ScanningHotel = 6,
    /// Loading hotel racks into the machine.
    LoadingHotels = 7,
    /// Unloading hotel racks from the machine.
    UnloadingHotels = 8,
    /// Disconnected, or an unrecognised state field value.
    Unknown = 0xFF,
}

impl MajorState {
    /// Decode the masked state field value. Unrecognised values map to
    /// `Unknown` so decoding never panics.
    #[inline]
    pub const fn from_field(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Setup,
            2 => Self::Initialising,
            3 => Self::Stop,
            4 => Self::TransferToStage,
            5 => Self::TransferFromStage,
            6 => Self::ScanningHotel,
            7 => Self::LoadingHotels,
            8 => Self::UnloadingHotels,
            _ => Self::Unknown,
        }
    }
}

impl Default for MajorState {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Decode a raw status word into its major state and condition flags.
///
/// A set `NOT_CONNECTED` bit forces `Unknown` regardless of the state
/// field — a disconnected controller reports nothing trustworthy.
pub fn decode(raw: u32) -> (MajorState, StatusFlags) {
    let flags = StatusFlags::from_bits_truncate(raw);
    let state = if flags.contains(StatusFlags::NOT_CONNECTED) {
        MajorState::Unknown
    } else {
        MajorState::from_field((raw & STATE_FIELD_MASK) as u8)
    };
    (state, flags)
}
