//! Aggregate pipeline configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aim::AimConfig;
use crate::detector::{Color, DetectorConfig};
use crate::pose::PoseSolverConfig;
use crate::tracker::{EkfConfig, TrackerConfig};

/// Full configuration for one [`crate::AimPipeline`] instance.
///
/// Every stage keeps its own section; all fields have tuned defaults, so a
/// config file only needs to override what differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which team color to detect.
    pub detect_color: Color,
    pub detector: DetectorConfig,
    pub pose: PoseSolverConfig,
    pub tracker: TrackerConfig,
    pub ekf: EkfConfig,
    pub aim: AimConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detect_color: Color::Red,
            detector: DetectorConfig::default(),
            pose: PoseSolverConfig::default(),
            tracker: TrackerConfig::default(),
            ekf: EkfConfig::default(),
            aim: AimConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.detector.binary_threshold, config.detector.binary_threshold);
        assert_eq!(parsed.tracker.tracking_threshold, config.tracker.tracking_threshold);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: PipelineConfig = serde_json::from_str(
            r#"{"detect_color": "blue", "tracker": {"tracking_threshold": 5}}"#,
        )
        .unwrap();
        assert_eq!(parsed.detect_color, Color::Blue);
        assert_eq!(parsed.tracker.tracking_threshold, 5);
        assert_eq!(parsed.detector.binary_threshold, 90);
        assert_eq!(parsed.aim.bullet_speed, 30.0);
    }
}
