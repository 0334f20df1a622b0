//! Device error-code reason table.
//!
//! The controller reports numeric status codes; every non-OK code maps to
//! one of a fixed set of human-readable reasons. The table is part of the
//! external contract — codes outside it collapse to "unknown error".

/// Success.
pub const CODE_OK: i32 = 0;
/// Benign success variant: the device was already in the requested state.
pub const CODE_ALREADY_IN_STATE: i32 = 1;

/// Map a device status code to its fixed reason string.
pub const fn reason_for_code(code: i32) -> &'static str {
    match code {
        0 => "ok",
        1 => "already in requested state",
        2 => "command not supported",
        3 => "parameter out of range",
        4 => "not initialised",
        5 => "not set up",
        6 => "device busy",
        7 => "hotel ejected",
        8 => "hotel not scanned",
        9 => "invalid hotel",
        10 => "invalid tray",
        11 => "invalid apartment",
        12 => "tray sensor error",
        13 => "gripper homing failed",
        14 => "axis stalled",
        15 => "comms error",
        16 => "eeprom write failed",
        _ => "unknown error",
    }
}
