//! Detector tuning parameters.

use serde::{Deserialize, Serialize};

/// Configuration for light detection and armor pairing.
///
/// Ratio parameters are dimensionless: center distance divided by average
/// light length. Angles are degrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Global grayscale threshold for the binary mask.
    pub binary_threshold: u8,
    /// Minimum light aspect ratio (length / width).
    pub light_min_ratio: f64,
    /// Maximum light aspect ratio.
    pub light_max_ratio: f64,
    /// Maximum light tilt from vertical (degrees).
    pub light_max_angle: f64,
    /// Minimum mean channel difference for a confident red/blue call.
    pub light_color_diff_thresh: f64,
    /// Small-armor band: minimum center-distance ratio.
    pub armor_min_small_center_distance: f64,
    /// Small-armor band: maximum center-distance ratio. Also the
    /// small/large classification split.
    pub armor_max_small_center_distance: f64,
    /// Large-armor band: minimum center-distance ratio.
    pub armor_min_large_center_distance: f64,
    /// Large-armor band: maximum center-distance ratio.
    pub armor_max_large_center_distance: f64,
    /// Maximum angle between the light-center line and horizontal (degrees).
    pub armor_max_angle: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            binary_threshold: 90,
            light_min_ratio: 0.0001,
            light_max_ratio: 20.0,
            light_max_angle: 40.0,
            light_color_diff_thresh: 20.0,
            armor_min_small_center_distance: 0.8,
            armor_max_small_center_distance: 3.5,
            armor_min_large_center_distance: 3.5,
            armor_max_large_center_distance: 8.0,
            armor_max_angle: 35.0,
        }
    }
}
