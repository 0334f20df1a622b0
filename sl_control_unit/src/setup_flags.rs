//! Two-phase calibration profile persistence.
//!
//! The store holds the working copy of the profile word. Mutations are
//! in-memory only; `mark_*_done` additionally pushes the word to device
//! RAM, which is cheap and safe. The non-volatile EEPROM write is a
//! separate, explicit [`commit_nonvolatile`](SetupFlagStore::commit_nonvolatile):
//! it powers the motors down for several seconds, so it must only run
//! after explicit user confirmation, once per calibration session, with
//! status polling paused.

use crate::error::{Result, exec, exec_parse};
use sl_common::calibration::{CalibrationProfile, HeightType};
use sl_common::channel::CommandChannel;
use sl_common::protocol;
use tracing::{info, warn};

/// Working copy of the device-resident calibration profile.
#[derive(Debug, Default)]
pub struct SetupFlagStore {
    working: CalibrationProfile,
    loaded: bool,
}

impl SetupFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the working copy from the device (read-only).
    pub fn load(&mut self, chan: &mut dyn CommandChannel) -> Result<()> {
        let raw: u32 = exec_parse(chan, protocol::SETUP_FLAGS_GET)?;
        self.working = CalibrationProfile::from_raw(raw);
        self.loaded = true;
        info!(
            "calibration profile loaded: height={:?} hotel={} stage={}",
            self.working.height_type(),
            self.working.hotel_calibrated(),
            self.working.stage_calibrated()
        );
        Ok(())
    }

    /// Read-only view of the working copy.
    #[inline]
    pub fn profile(&self) -> CalibrationProfile {
        self.working
    }

    /// Whether a device profile has been read this session.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Set the height-type tag (in-memory). Set once during first-run
    /// setup; replacing an existing tag is logged because it is unusual.
    pub fn set_height_type(&mut self, tag: HeightType) {
        let current = self.working.height_type();
        if current != HeightType::None && current != tag {
            warn!("replacing height type {current:?} with {tag:?}");
        }
        self.working.set_height_type(tag);
    }

    /// Maintenance action: the hotel alignment must be re-earned.
    pub fn clear_hotel_flag(&mut self) {
        self.working.set_hotel_calibrated(false);
    }

    /// Maintenance action: the stage position must be re-earned.
    pub fn clear_stage_flag(&mut self) {
        self.working.set_stage_calibrated(false);
    }

    /// Factory reset of the working copy, height tag included.
    pub fn clear_all(&mut self) {
        self.working.clear();
    }

    /// Record hotel alignment complete and push the word to device RAM.
    pub fn mark_hotel_done(&mut self, chan: &mut dyn CommandChannel) -> Result<()> {
        self.working.set_hotel_calibrated(true);
        self.push_working_copy(chan)
    }

    /// Record stage position complete and push the word to device RAM.
    pub fn mark_stage_done(&mut self, chan: &mut dyn CommandChannel) -> Result<()> {
        self.working.set_stage_calibrated(true);
        self.push_working_copy(chan)
    }

    /// Push the working copy to device RAM. Does not touch EEPROM.
    pub fn push_working_copy(&self, chan: &mut dyn CommandChannel) -> Result<()> {
        exec(chan, &protocol::setup_flags_set(self.working.raw()))?;
        Ok(())
    }

    /// Commit the RAM profile to EEPROM.
    ///
    /// # Hazard
    ///
    /// The write powers the motors down for several seconds; stage
    /// position may be lost during the window. Only call after explicit
    /// user confirmation, and keep status polling suspended while the
    /// exchange is in flight (the write competes for the channel).
    pub fn commit_nonvolatile(&self, chan: &mut dyn CommandChannel) -> Result<()> {
        info!("committing calibration profile to non-volatile storage");
        exec(chan, protocol::SETUP_FLAGS_SAVE)?;
        Ok(())
    }
}
