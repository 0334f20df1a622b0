//! Persisted calibration profile bitfield.
//!
//! The device keeps a single integer profile word in non-volatile storage:
//! a mutually-exclusive device-height-type tag in the low nibble plus two
//! independent calibrated flags. The word round-trips over the command
//! channel as a decimal string.
//!
//! The in-memory copy here is the *working* copy. Pushing it to device RAM
//! is cheap and safe; writing it to EEPROM powers the motors down for
//! several seconds and is always a separate, explicit commit.

use serde::{Deserialize, Serialize};

const HEIGHT_TYPE_MASK: u32 = 0x0000_000F;
const HOTEL_CALIBRATED: u32 = 0x0000_0010;
const STAGE_CALIBRATED: u32 = 0x0000_0020;

/// Device height type, set exactly once during first-run setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HeightType {
    /// Not yet configured.
    None = 0,
    /// Fixed-height installation.
    Fixed = 1,
    /// Customer-adjustable height.
    Customer = 2,
    /// Factory-variable height.
    Factory = 3,
}

impl HeightType {
    /// Convert from the masked nibble value. Unknown values map to `None`.
    #[inline]
    pub const fn from_nibble(value: u8) -> Self {
        match value {
            1 => Self::Fixed,
            2 => Self::Customer,
            3 => Self::Factory,
            _ => Self::None,
        }
    }
}

/// Working copy of the device-resident calibration profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationProfile(u32);

impl CalibrationProfile {
    /// Wrap a raw profile word read from the device.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw profile word, as pushed to the device.
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Parse the decimal-string form used on the wire.
    pub fn parse(text: &str) -> Option<Self> {
        text.trim().parse::<u32>().ok().map(Self)
    }

    /// Current height-type tag.
    #[inline]
    pub const fn height_type(&self) -> HeightType {
        HeightType::from_nibble((self.0 & HEIGHT_TYPE_MASK) as u8)
    }

    /// Replace the height-type tag. The tag nibble is cleared first, so
    /// exactly one tag is active afterwards; the calibrated flags are
    /// untouched.
    pub fn set_height_type(&mut self, tag: HeightType) {
        self.0 = (self.0 & !HEIGHT_TYPE_MASK) | tag as u32;
    }

    /// Hotel alignment completed.
    #[inline]
    pub const fn hotel_calibrated(&self) -> bool {
        self.0 & HOTEL_CALIBRATED != 0
    }

    /// Stage/load position completed.
    #[inline]
    pub const fn stage_calibrated(&self) -> bool {
        self.0 & STAGE_CALIBRATED != 0
    }

    pub fn set_hotel_calibrated(&mut self, done: bool) {
        if done {
            self.0 |= HOTEL_CALIBRATED;
        } else {
            self.0 &= !HOTEL_CALIBRATED;
        }
    }

    pub fn set_stage_calibrated(&mut self, done: bool) {
        if done {
            self.0 |= STAGE_CALIBRATED;
        } else {
            self.0 &= !STAGE_CALIBRATED;
        }
    }

    /// Clear the entire profile, height tag included (factory reset).
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// True once the height type is set and both wizards have completed.
    pub const fn fully_calibrated(&self) -> bool {
        !matches!(self.height_type(), HeightType::None)
            && self.hotel_calibrated()
            && self.stage_calibrated()
    }
}

impl std::fmt::Display for CalibrationProfile {
    /// Decimal-string wire form.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_type_is_mutually_exclusive() {
        let mut profile = CalibrationProfile::default();
        profile.set_hotel_calibrated(true);
        profile.set_height_type(HeightType::Fixed);
        profile.set_height_type(HeightType::Customer);
        assert_eq!(profile.height_type(), HeightType::Customer);
        assert_eq!(profile.raw() & HEIGHT_TYPE_MASK, HeightType::Customer as u32);
        // Calibrated flags unaffected by tag changes.
        assert!(profile.hotel_calibrated());
        assert!(!profile.stage_calibrated());
    }

    #[test]
    fn flags_are_independent() {
        let mut profile = CalibrationProfile::default();
        profile.set_stage_calibrated(true);
        assert!(!profile.hotel_calibrated());
        profile.set_hotel_calibrated(true);
        profile.set_stage_calibrated(false);
        assert!(profile.hotel_calibrated());
        assert!(!profile.stage_calibrated());
    }

    #[test]
    fn decimal_round_trip() {
        let mut profile = CalibrationProfile::default();
        profile.set_height_type(HeightType::Factory);
        profile.set_hotel_calibrated(true);
        profile.set_stage_calibrated(true);
        let text = profile.to_string();
        assert_eq!(CalibrationProfile::parse(&text), Some(profile));
        assert!(profile.fully_calibrated());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(CalibrationProfile::parse("not-a-number"), None);
        assert_eq!(CalibrationProfile::parse(""), None);
    }
}
