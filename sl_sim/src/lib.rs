//! Simulated slide/tray loader.
//!
//! [`SimLoader`] implements [`CommandChannel`] by interpreting the full
//! dotted command vocabulary against an in-memory model of the machine:
//! two hotel racks, forty tray slots, the stage clamp sensor, six axes
//! and the RAM/EEPROM calibration profile pair.
//!
//! Time is modelled as query ticks rather than wall clock: a started
//! operation stays in its transfer state for a fixed number of
//! `loader.status.get` reads (per-axis moves count `busy.get` reads), so
//! tests are deterministic and run at full speed. Error behaviour follows
//! the device codes: busy refusals, ejected-hotel refusals, unscanned
//! occupancy queries and the benign already-in-state code 1.

use sl_common::axis::Axis;
use sl_common::calibration::CalibrationProfile;
use sl_common::channel::{ChannelError, CommandChannel, Reply};
use sl_common::protocol;
use sl_common::status::{MajorState, StatusFlags};
use tracing::trace;

const AXES: usize = 6;
const SLOTS: usize = protocol::TRAY_SLOTS as usize;

/// Operation whose completion is pending a state countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    None,
    Eject,
    Load,
    Scan(u8),
    ToStage(u8),
    FromStage(u8),
    Present,
    Pull,
}

/// In-memory loader model speaking the dotted command protocol.
#[derive(Debug)]
pub struct SimLoader {
    connected: bool,
    state: MajorState,
    state_ticks: u8,
    pending: PendingOp,

    hotels_ejected: bool,
    hotel_fitted: [bool; 2],
    scanned: [bool; 2],
    trays: [bool; SLOTS],
    tray_on_stage: bool,
    manual_tray_available: bool,

    preview_enabled: bool,
    preview_station: u8,

    ram_profile: u32,
    eeprom_profile: u32,
    save_count: u32,

    axis_pos: [i64; AXES],
    axis_busy: [u8; AXES],
    axis_velocity: [i64; AXES],
    stage_pos: (i64, i64),
    stage_busy: u8,

    move_ticks: u8,
    generic_error: bool,
    last_error: i32,
    fail_next_send: bool,
}

impl Default for SimLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SimLoader {
    /// Fresh machine with the system-check layout fitted: both hotels
    /// present, apartments 1 and 20 of each occupied, EEPROM blank.
    pub fn new() -> Self {
        let mut trays = [false; SLOTS];
        for (hotel, apartment) in [(1, 1), (1, 20), (2, 1), (2, 20)] {
            let slot = protocol::hotel_apartment_to_tray(hotel, apartment);
            trays[slot as usize - 1] = true;
        }
        Self {
            connected: false,
            state: MajorState::Idle,
            state_ticks: 0,
            pending: PendingOp::None,
            hotels_ejected: false,
            hotel_fitted: [true, true],
            scanned: [false, false],
            trays,
            tray_on_stage: false,
            manual_tray_available: true,
            preview_enabled: false,
            preview_station: 0,
            ram_profile: 0,
            eeprom_profile: 0,
            save_count: 0,
            axis_pos: [0; AXES],
            axis_busy: [0; AXES],
            axis_velocity: [0; AXES],
            stage_pos: (0, 0),
            stage_busy: 0,
            move_ticks: 2,
            generic_error: false,
            last_error: 0,
            fail_next_send: false,
        }
    }

    // ─── Test hooks ─────────────────────────────────────────────────

    pub fn fit_tray(&mut self, slot: u8, fitted: bool) {
        self.trays[slot as usize - 1] = fitted;
    }

    pub fn clear_all_trays(&mut self) {
        self.trays = [false; SLOTS];
    }

    pub fn tray_fitted(&self, slot: u8) -> bool {
        self.trays[slot as usize - 1]
    }

    pub fn set_hotel_fitted(&mut self, hotel: u8, fitted: bool) {
        self.hotel_fitted[hotel as usize - 1] = fitted;
    }

    pub fn set_tray_on_stage(&mut self, occupied: bool) {
        self.tray_on_stage = occupied;
    }

    /// Whether a pull-to-stage finds a manually inserted tray.
    pub fn set_manual_tray_available(&mut self, available: bool) {
        self.manual_tray_available = available;
    }

    pub fn set_preview_enabled(&mut self, enabled: bool) {
        self.preview_enabled = enabled;
    }

    pub fn force_generic_error(&mut self, faulted: bool) {
        self.generic_error = faulted;
    }

    /// Fail the next exchange at the transport level.
    pub fn fail_next_send(&mut self) {
        self.fail_next_send = true;
    }

    /// Status queries one started operation spends in its busy state.
    pub fn set_move_ticks(&mut self, ticks: u8) {
        self.move_ticks = ticks;
    }

    pub fn set_eeprom_profile(&mut self, raw: u32) {
        self.eeprom_profile = raw;
    }

    pub fn ram_profile(&self) -> u32 {
        self.ram_profile
    }

    pub fn eeprom_profile(&self) -> u32 {
        self.eeprom_profile
    }

    /// EEPROM writes performed since construction.
    pub fn save_count(&self) -> u32 {
        self.save_count
    }

    pub fn hotels_ejected(&self) -> bool {
        self.hotels_ejected
    }

    pub fn tray_on_stage(&self) -> bool {
        self.tray_on_stage
    }

    pub fn axis_position(&self, axis: Axis) -> i64 {
        self.axis_pos[axis as usize]
    }

    // ─── Model ──────────────────────────────────────────────────────

    fn err(&mut self, code: i32) -> Reply {
        self.last_error = code;
        Reply::err(code)
    }

    fn busy(&self) -> bool {
        self.state != MajorState::Idle
    }

    fn begin(&mut self, state: MajorState, pending: PendingOp) {
        self.state = state;
        self.state_ticks = self.move_ticks;
        self.pending = pending;
    }

    /// Countdown driven by status reads; paused at a preview station.
    fn advance(&mut self) {
        if self.state == MajorState::Idle || self.preview_station > 0 {
            return;
        }
        if self.state_ticks > 0 {
            self.state_ticks -= 1;
        }
        if self.state_ticks == 0 {
            self.complete_pending();
        }
    }

    fn complete_pending(&mut self) {
        match self.pending {
            PendingOp::None => {}
            PendingOp::Eject => {
                self.hotels_ejected = true;
                // Removing the racks invalidates any previous scan.
                self.scanned = [false, false];
            }
            PendingOp::Load => self.hotels_ejected = false,
            PendingOp::Scan(hotel) => self.scanned[hotel as usize - 1] = true,
            PendingOp::ToStage(slot) => {
                self.trays[slot as usize - 1] = false;
                self.tray_on_stage = true;
            }
            PendingOp::FromStage(slot) => {
                self.trays[slot as usize - 1] = true;
                self.tray_on_stage = false;
            }
            PendingOp::Present => {}
            PendingOp::Pull => self.tray_on_stage = self.manual_tray_available,
        }
        self.pending = PendingOp::None;
        self.state = MajorState::Idle;
    }

    fn status_word(&self) -> u32 {
        if !self.connected {
            return StatusFlags::NOT_CONNECTED.bits();
        }
        let mut word = self.state as u32;
        let mut flags = StatusFlags::empty();
        if self.state != MajorState::Idle {
            flags |= StatusFlags::NOT_IDLE;
        }
        if self.hotels_ejected {
            flags |= StatusFlags::HOTEL_EJECTED;
        }
        if self.tray_on_stage {
            flags |= StatusFlags::TRAY_ON_STAGE;
        }
        if !(self.scanned[0] && self.scanned[1]) {
            flags |= StatusFlags::HOTEL_NOT_SCANNED;
        }
        if !CalibrationProfile::from_raw(self.ram_profile).fully_calibrated() {
            flags |= StatusFlags::NOT_SETUP;
        }
        if self.generic_error {
            flags |= StatusFlags::GENERIC_ERROR;
        }
        word |= flags.bits();
        word
    }

    // ─── Dispatch ───────────────────────────────────────────────────

    fn dispatch(&mut self, path: &str, args: &[&str]) -> Reply {
        // Controller-level commands work without a connection.
        match path {
            "controller.connect" => {
                self.connected = true;
                self.ram_profile = self.eeprom_profile;
                return Reply::ok("");
            }
            "controller.disconnect" => {
                self.connected = false;
                return Reply::ok("");
            }
            "controller.info.get" => {
                return Reply::ok("SL160 simulator fw 1.0");
            }
            "loader.status.get" => {
                self.advance();
                return Reply::ok(self.status_word().to_string());
            }
            "loader.lasterror.get" => {
                return Reply::ok(self.last_error.to_string());
            }
            _ => {}
        }
        if !self.connected {
            return self.err(15);
        }
        if let Some(reply) = self.dispatch_axis(path, args) {
            return reply;
        }
        match path {
            "loader.hotels.eject" => {
                if self.busy() {
                    self.err(6)
                } else if self.hotels_ejected {
                    Reply { code: 1, body: String::new() }
                } else {
                    self.begin(MajorState::UnloadingHotels, PendingOp::Eject);
                    Reply::ok("")
                }
            }
            "loader.hotels.load" => {
                if self.busy() {
                    self.err(6)
                } else if !self.hotels_ejected {
                    Reply { code: 1, body: String::new() }
                } else {
                    self.begin(MajorState::LoadingHotels, PendingOp::Load);
                    Reply::ok("")
                }
            }
            "loader.hotel.scan" => match parse_hotel(args) {
                Some(hotel) => {
                    if self.busy() {
                        self.err(6)
                    } else if self.hotels_ejected {
                        self.err(7)
                    } else if !self.hotel_fitted[hotel as usize - 1] {
                        self.err(9)
                    } else {
                        self.begin(MajorState::ScanningHotel, PendingOp::Scan(hotel));
                        Reply::ok("")
                    }
                }
                None => self.err(9),
            },
            "loader.hotel.fitted.get" => match parse_hotel(args) {
                Some(hotel) => Reply::ok(bool_body(self.hotel_fitted[hotel as usize - 1])),
                None => self.err(9),
            },
            "loader.hotel.apartment.occupied.get" => {
                let Some(hotel) = parse_hotel(args) else {
                    return self.err(9);
                };
                let Some(apartment) = args
                    .get(1)
                    .and_then(|a| a.parse::<u8>().ok())
                    .filter(|&a| (1..=protocol::APARTMENTS_PER_HOTEL).contains(&a))
                else {
                    return self.err(11);
                };
                if !self.scanned[hotel as usize - 1] {
                    return self.err(8);
                }
                let slot = protocol::hotel_apartment_to_tray(hotel, apartment);
                Reply::ok(bool_body(self.trays[slot as usize - 1]))
            }
            "loader.tray.fitted.get" => match parse_slot(args) {
                Some(slot) => Reply::ok(bool_body(self.trays[slot as usize - 1])),
                None => self.err(10),
            },
            "loader.sensor.tray-on-stage.get" => Reply::ok(bool_body(self.tray_on_stage)),
            "loader.tray.transfer-to-stage" => {
                let Some(slot) = parse_slot(args) else {
                    return self.err(10);
                };
                if self.busy() {
                    self.err(6)
                } else if self.hotels_ejected {
                    self.err(7)
                } else if !self.trays[slot as usize - 1] {
                    self.err(10)
                } else if self.tray_on_stage {
                    self.err(12)
                } else {
                    self.begin(MajorState::TransferToStage, PendingOp::ToStage(slot));
                    if self.preview_enabled {
                        self.preview_station = 1;
                    }
                    Reply::ok("")
                }
            }
            "loader.tray.transfer-from-stage" => {
                let Some(slot) = parse_slot(args) else {
                    return self.err(10);
                };
                if self.busy() {
                    self.err(6)
                } else if self.hotels_ejected {
                    self.err(7)
                } else if !self.tray_on_stage {
                    self.err(12)
                } else if self.trays[slot as usize - 1] {
                    self.err(10)
                } else {
                    self.begin(MajorState::TransferFromStage, PendingOp::FromStage(slot));
                    Reply::ok("")
                }
            }
            "loader.tray.present" => {
                if self.busy() {
                    self.err(6)
                } else {
                    self.begin(MajorState::TransferFromStage, PendingOp::Present);
                    Reply::ok("")
                }
            }
            "loader.tray.pull-to-stage" => {
                if self.busy() {
                    self.err(6)
                } else if self.tray_on_stage {
                    Reply { code: 1, body: String::new() }
                } else {
                    self.begin(MajorState::TransferToStage, PendingOp::Pull);
                    Reply::ok("")
                }
            }
            "loader.preview.index.get" => Reply::ok(self.preview_station.to_string()),
            "loader.preview.continue" => {
                if self.preview_station == 0 {
                    Reply { code: 1, body: String::new() }
                } else if self.preview_station < protocol::PREVIEW_STATIONS {
                    self.preview_station += 1;
                    Reply::ok("")
                } else {
                    // Past the last station the transfer resumes.
                    self.preview_station = 0;
                    self.state_ticks = self.move_ticks;
                    Reply::ok("")
                }
            }
            "loader.setupflags.get" => Reply::ok(self.ram_profile.to_string()),
            "loader.setupflags.set" => match args.first().and_then(|a| a.parse::<u32>().ok()) {
                Some(raw) => {
                    self.ram_profile = raw;
                    Reply::ok("")
                }
                None => self.err(3),
            },
            "loader.setupflags.save" => {
                if self.busy() {
                    self.err(6)
                } else {
                    self.eeprom_profile = self.ram_profile;
                    self.save_count += 1;
                    Reply::ok("")
                }
            }
            "controller.stage.goto-position" => {
                let (Some(x), Some(y)) = (
                    args.first().and_then(|a| a.parse::<i64>().ok()),
                    args.get(1).and_then(|a| a.parse::<i64>().ok()),
                ) else {
                    return self.err(3);
                };
                self.stage_pos = (x, y);
                self.stage_busy = self.move_ticks;
                Reply::ok("")
            }
            "controller.stage.busy.get" => {
                let busy = self.stage_busy > 0;
                if busy {
                    self.stage_busy -= 1;
                }
                Reply::ok(bool_body(busy))
            }
            _ => self.err(2),
        }
    }

    fn dispatch_axis(&mut self, path: &str, args: &[&str]) -> Option<Reply> {
        for axis in Axis::ALL {
            let Some(op) = path.strip_prefix(axis.namespace()) else {
                continue;
            };
            let i = axis as usize;
            return Some(match op {
                ".goto-position" => match args.first().and_then(|a| a.parse::<i64>().ok()) {
                    Some(counts) => {
                        self.axis_pos[i] = counts;
                        self.axis_busy[i] = self.move_ticks;
                        Reply::ok("")
                    }
                    None => self.err(3),
                },
                ".position.get" => Reply::ok(self.axis_pos[i].to_string()),
                ".busy.get" => {
                    let busy = self.axis_busy[i] > 0 || self.axis_velocity[i] != 0;
                    if self.axis_busy[i] > 0 {
                        self.axis_busy[i] -= 1;
                    }
                    Reply::ok(bool_body(busy))
                }
                ".move-at-velocity" => match args.first().and_then(|a| a.parse::<i64>().ok()) {
                    Some(v) => {
                        self.axis_velocity[i] = v;
                        Reply::ok("")
                    }
                    None => self.err(3),
                },
                ".home" => {
                    self.axis_pos[i] = 0;
                    self.axis_busy[i] = self.move_ticks;
                    self.axis_velocity[i] = 0;
                    Reply::ok("")
                }
                _ => self.err(2),
            });
        }
        None
    }
}

impl CommandChannel for SimLoader {
    fn send(&mut self, command: &str) -> Result<Reply, ChannelError> {
        if self.fail_next_send {
            self.fail_next_send = false;
            return Err(ChannelError::Transport("simulated link failure".into()));
        }
        let mut parts = command.split_whitespace();
        let path = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();
        let reply = self.dispatch(path, &args);
        trace!("sim {command:?} -> code {}", reply.code);
        Ok(reply)
    }
}

fn bool_body(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn parse_hotel(args: &[&str]) -> Option<u8> {
    args.first()
        .and_then(|a| a.parse::<u8>().ok())
        .filter(|&h| (1..=protocol::HOTEL_COUNT).contains(&h))
}

fn parse_slot(args: &[&str]) -> Option<u8> {
    args.first()
        .and_then(|a| a.parse::<u8>().ok())
        .filter(|&t| (1..=protocol::TRAY_SLOTS).contains(&t))
}
