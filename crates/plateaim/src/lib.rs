//! plateaim — perception-to-actuation pipeline for an autonomous turret.
//!
//! Locates retro-reflective armor plates in color frames, recovers their
//! monocular pose, fuses detections over time into a persistent rotating-
//! target estimate, and converts that estimate into a ballistically
//! compensated gimbal command. The stages are:
//!
//! 1. **Detector** – binary threshold, contour → rotated-rect light
//!    extraction, color gating, pairwise armor matching.
//! 2. **PoseSolver** – plane-to-image homography + two-solution IPPE
//!    decomposition, disambiguated by reprojection error.
//! 3. **Tracker** – LOST/DETECTING/TRACKING/TEMP_LOST lifecycle gating a
//!    10-state EKF over the target's rotation center, yaw rate, radius and
//!    face height offset.
//! 4. **AimSolver** – anti-gyro face selection, gravity + linear-drag
//!    pitch compensation, range calibration offsets, fire gating.
//!
//! [`AimPipeline`] wires the chain together per frame; the individual
//! stages are public for callers that need only part of it. Transport,
//! parameter plumbing and rendering live outside this crate.

pub mod aim;
pub mod angles;
pub mod camera;
pub mod config;
pub mod detector;
pub mod pipeline;
pub mod pose;
pub mod tracker;

#[cfg(test)]
mod test_utils;

pub use aim::{AimConfig, AimSolver, GimbalCommand};
pub use camera::{CameraError, CameraIntrinsics, CameraModel, RadialTangentialDistortion};
pub use config::PipelineConfig;
pub use detector::{Armor, ArmorPose, ArmorType, Color, Detector, DetectorConfig, Light};
pub use pipeline::{AimPipeline, FrameOutput};
pub use pose::{PoseError, PoseSolver, PoseSolverConfig};
pub use tracker::{EkfConfig, Target, Tracker, TrackerConfig, TrackerState};
