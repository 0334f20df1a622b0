//! Fixed dotted-command vocabulary.
//!
//! The controller speaks a flat namespace of dotted command strings. This
//! module is the single place command text is built; the vocabulary is an
//! external contract fixed by device firmware, not something the core may
//! extend.
//!
//! Hotel/tray numbering: two hotels of twenty apartments each. Trays are
//! addressed either as (hotel, apartment) or as a flat slot 1..=40
//! (hotel 1 apartments 1–20 are trays 1–20, hotel 2 apartments 1–20 are
//! trays 21–40).

use crate::axis::Axis;

/// Hotels fitted to the machine.
pub const HOTEL_COUNT: u8 = 2;
/// Apartments per hotel.
pub const APARTMENTS_PER_HOTEL: u8 = 20;
/// Flat tray slots across both hotels.
pub const TRAY_SLOTS: u8 = HOTEL_COUNT * APARTMENTS_PER_HOTEL;

// ─── Session ────────────────────────────────────────────────────────

/// Connect to the controller on the given COM port.
pub fn connect(port: u16) -> String {
    format!("controller.connect {port}")
}

pub const DISCONNECT: &str = "controller.disconnect";
pub const CONTROLLER_INFO_GET: &str = "controller.info.get";

// ─── Status ─────────────────────────────────────────────────────────

/// Read the status word (decimal `u32` in the body).
pub const STATUS_GET: &str = "loader.status.get";
/// Read the last device error code (decimal `i32` in the body).
pub const LAST_ERROR_GET: &str = "loader.lasterror.get";

// ─── Hotels / trays ─────────────────────────────────────────────────

pub const HOTELS_EJECT: &str = "loader.hotels.eject";
pub const HOTELS_LOAD: &str = "loader.hotels.load";

/// Scan one hotel's apartments for trays.
pub fn hotel_scan(hotel: u8) -> String {
    format!("loader.hotel.scan {hotel}")
}

/// Hotel presence sensor ("1" fitted, "0" absent).
pub fn hotel_fitted_get(hotel: u8) -> String {
    format!("loader.hotel.fitted.get {hotel}")
}

/// Apartment occupancy from the last scan ("1" occupied, "0" empty).
pub fn apartment_occupied_get(hotel: u8, apartment: u8) -> String {
    format!("loader.hotel.apartment.occupied.get {hotel} {apartment}")
}

/// Tray presence by flat slot index ("1" fitted, "0" absent).
pub fn tray_fitted_get(tray: u8) -> String {
    format!("loader.tray.fitted.get {tray}")
}

/// Tray-on-stage sensor ("1" occupied, "0" clear).
pub const TRAY_ON_STAGE_GET: &str = "loader.sensor.tray-on-stage.get";

/// Position the lift and shuttle so a tray can be inserted by hand.
pub const TRAY_PRESENT: &str = "loader.tray.present";
/// Pull a manually presented tray into the stage clamp.
pub const TRAY_PULL_TO_STAGE: &str = "loader.tray.pull-to-stage";

/// Start a hotel-to-stage transfer of the given flat slot.
pub fn transfer_to_stage(tray: u8) -> String {
    format!("loader.tray.transfer-to-stage {tray}")
}

/// Start a stage-to-hotel transfer of the given flat slot.
pub fn transfer_from_stage(tray: u8) -> String {
    format!("loader.tray.transfer-from-stage {tray}")
}

// ─── Preview stations ───────────────────────────────────────────────

/// Preview station the transfer is currently paused at (decimal, 0 = none).
pub const PREVIEW_INDEX_GET: &str = "loader.preview.index.get";
/// Resume a transfer paused at a preview station.
pub const PREVIEW_CONTINUE: &str = "loader.preview.continue";
/// Number of preview stations along the transfer path.
pub const PREVIEW_STATIONS: u8 = 4;

// ─── Setup flags ────────────────────────────────────────────────────

/// Read the RAM-resident calibration profile word (decimal).
pub const SETUP_FLAGS_GET: &str = "loader.setupflags.get";
/// Replace the RAM-resident calibration profile word. Cheap and safe.
pub fn setup_flags_set(raw: u32) -> String {
    format!("loader.setupflags.set {raw}")
}
/// Commit the RAM profile to EEPROM. Powers motors down for several
/// seconds; stage position may be lost during the write.
pub const SETUP_FLAGS_SAVE: &str = "loader.setupflags.save";

// ─── Per-axis ───────────────────────────────────────────────────────

/// Absolute move to the given encoder count.
pub fn goto_position(axis: Axis, counts: i64) -> String {
    format!("{}.goto-position {counts}", axis.namespace())
}

/// Read the current encoder count.
pub fn position_get(axis: Axis) -> String {
    format!("{}.position.get", axis.namespace())
}

/// Per-axis busy query ("1" moving, "0" idle).
pub fn busy_get(axis: Axis) -> String {
    format!("{}.busy.get", axis.namespace())
}

/// Continuous velocity move in counts/second; zero stops the axis.
pub fn move_at_velocity(axis: Axis, counts_per_s: i64) -> String {
    format!("{}.move-at-velocity {counts_per_s}", axis.namespace())
}

/// Home the axis against its reference sensor.
pub fn home(axis: Axis) -> String {
    format!("{}.home", axis.namespace())
}

// ─── Stage (XY pair) ────────────────────────────────────────────────

/// Absolute XY stage move in microns.
pub fn stage_goto(x_um: i64, y_um: i64) -> String {
    format!("controller.stage.goto-position {x_um} {y_um}")
}

/// Combined stage busy query ("1" moving, "0" idle).
pub const STAGE_BUSY_GET: &str = "controller.stage.busy.get";

// ─── Tray addressing ────────────────────────────────────────────────

/// Map a flat tray slot (1..=40) to its (hotel, apartment) pair.
pub const fn tray_to_hotel_apartment(tray: u8) -> (u8, u8) {
    if tray <= APARTMENTS_PER_HOTEL {
        (1, tray)
    } else {
        (2, tray - APARTMENTS_PER_HOTEL)
    }
}

/// Map a (hotel, apartment) pair to its flat tray slot.
pub const fn hotel_apartment_to_tray(hotel: u8, apartment: u8) -> u8 {
    (hotel - 1) * APARTMENTS_PER_HOTEL + apartment
}
