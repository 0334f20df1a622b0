//! Axis definitions and unit conversion.
//!
//! Each axis carries its lead-screw/encoder constants and the protocol
//! namespace used to build per-axis commands. Conversion between physical
//! millimetres and device encoder counts is a pure per-axis mapping:
//!
//! `counts = round(mm * counts_per_rev / pitch_mm)`
//!
//! The three loader mechanisms (shuttle, lift, transfer) share one
//! constant set; the focus drive uses a finer pitch. The stage axes
//! resolve to 1000 counts/mm (the stage controller speaks microns).

use serde::{Deserialize, Serialize};

/// One of the fixed loader/stage axes.
///
/// Axes are never owned concurrently by more than one logical operation;
/// the axis controller polls each axis to completion before issuing the
/// next command on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    /// Hotel shuttle mechanism — positions the hotel rack.
    Hsm = 0,
    /// Hotel lift mechanism — raises/lowers a rack to align an apartment.
    Hlm = 1,
    /// Stage transfer mechanism — pushes/pulls a tray onto the stage.
    Stm = 2,
    /// Stage X axis.
    StageX = 3,
    /// Stage Y axis.
    StageY = 4,
    /// Focus drive.
    FocusZ = 5,
}

impl Axis {
    /// All axes, in protocol order.
    pub const ALL: [Axis; 6] = [
        Axis::Hsm,
        Axis::Hlm,
        Axis::Stm,
        Axis::StageX,
        Axis::StageY,
        Axis::FocusZ,
    ];

    /// The loader mechanisms (excludes the stage and focus axes).
    pub const LOADER: [Axis; 3] = [Axis::Hsm, Axis::Hlm, Axis::Stm];

    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Hsm),
            1 => Some(Self::Hlm),
            2 => Some(Self::Stm),
            3 => Some(Self::StageX),
            4 => Some(Self::StageY),
            5 => Some(Self::FocusZ),
            _ => None,
        }
    }

    /// Dotted command namespace for this axis.
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::Hsm => "loader.hsm",
            Self::Hlm => "loader.hlm",
            Self::Stm => "loader.stm",
            Self::StageX => "controller.stage.x",
            Self::StageY => "controller.stage.y",
            Self::FocusZ => "controller.z",
        }
    }

    /// Encoder counts per motor revolution.
    pub const fn encoder_counts_per_rev(self) -> f64 {
        match self {
            Self::Hsm | Self::Hlm | Self::Stm => 2000.0,
            Self::StageX | Self::StageY => 25000.0,
            Self::FocusZ => 2000.0,
        }
    }

    /// Lead-screw pitch in millimetres per revolution.
    pub const fn lead_screw_pitch_mm(self) -> f64 {
        match self {
            Self::Hsm | Self::Hlm | Self::Stm => 6.0,
            Self::StageX | Self::StageY => 25.0,
            Self::FocusZ => 2.0,
        }
    }

    /// Encoder counts per millimetre of travel.
    #[inline]
    pub fn counts_per_mm(self) -> f64 {
        self.encoder_counts_per_rev() / self.lead_screw_pitch_mm()
    }
}

/// Convert millimetres to encoder counts for `axis` (nearest count).
///
/// Out-of-range inputs are the caller's responsibility.
#[inline]
pub fn mm_to_counts(axis: Axis, mm: f64) -> i64 {
    (mm * axis.counts_per_mm()).round() as i64
}

/// Convert encoder counts back to millimetres for `axis`.
#[inline]
pub fn counts_to_mm(axis: Axis, counts: i64) -> f64 {
    counts as f64 / axis.counts_per_mm()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsm_one_mm_is_333_counts() {
        // 2000 counts/rev over a 6 mm pitch: 333.33/mm, rounded to nearest.
        assert_eq!(mm_to_counts(Axis::Hsm, 1.0), 333);
    }

    #[test]
    fn shared_constants_for_loader_mechanisms() {
        for axis in Axis::LOADER {
            assert_eq!(axis.encoder_counts_per_rev(), 2000.0);
            assert_eq!(axis.lead_screw_pitch_mm(), 6.0);
        }
        assert_ne!(
            Axis::FocusZ.lead_screw_pitch_mm(),
            Axis::Hsm.lead_screw_pitch_mm()
        );
    }

    #[test]
    fn round_trip_within_one_count() {
        for axis in Axis::ALL {
            for mm in [0.01, 0.5, 1.0, 2.0, 19.99, 30.0, 123.456] {
                let counts = mm_to_counts(axis, mm);
                let back = counts_to_mm(axis, counts);
                let one_count_mm = 1.0 / axis.counts_per_mm();
                assert!(
                    (back - mm).abs() <= one_count_mm,
                    "{axis:?}: {mm} mm -> {counts} -> {back} mm"
                );
            }
        }
    }

    #[test]
    fn negative_jogs_convert_symmetrically() {
        assert_eq!(mm_to_counts(Axis::Stm, -30.0), -mm_to_counts(Axis::Stm, 30.0));
    }

    #[test]
    fn from_u8_round_trips() {
        for axis in Axis::ALL {
            assert_eq!(Axis::from_u8(axis as u8), Some(axis));
        }
        assert_eq!(Axis::from_u8(6), None);
    }
}
