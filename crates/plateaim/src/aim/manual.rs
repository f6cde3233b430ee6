//! Static range-keyed pitch/yaw corrections.
//!
//! A calibration table measured on the range, applied after ballistic
//! compensation. Lookup only; nothing here is filtered.

use serde::{Deserialize, Serialize};

/// One calibration band: offsets applied while the target distance falls
/// in `[min_distance, max_distance)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeOffset {
    pub min_distance: f64,
    pub max_distance: f64,
    /// Additional pitch (radians).
    pub pitch_offset: f64,
    /// Additional yaw (radians).
    pub yaw_offset: f64,
}

/// Manual compensation table.
#[derive(Debug, Clone, Default)]
pub struct ManualCompensator {
    table: Vec<RangeOffset>,
}

impl ManualCompensator {
    pub fn new(table: Vec<RangeOffset>) -> Self {
        Self { table }
    }

    /// `(pitch_offset, yaw_offset)` for a target distance; zero outside
    /// every band. The first matching band wins.
    pub fn offsets_for(&self, distance: f64) -> (f64, f64) {
        self.table
            .iter()
            .find(|band| distance >= band.min_distance && distance < band.max_distance)
            .map(|band| (band.pitch_offset, band.yaw_offset))
            .unwrap_or((0.0, 0.0))
    }
}
