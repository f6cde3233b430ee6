//! Frame-synchronous perception-to-actuation pipeline.
//!
//! Each incoming frame runs detect → pose → track → aim to completion
//! before the next is accepted; the only gate is the one-time camera
//! intrinsics delivery, which must arrive before any frame is processed.

use image::RgbImage;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::aim::{AimSolver, GimbalCommand};
use crate::camera::{CameraError, CameraModel};
use crate::config::PipelineConfig;
use crate::detector::{Armor, Detector};
use crate::pose::PoseSolver;
use crate::tracker::{Target, Tracker};

/// Substituted when the frame clock stalls or jumps.
const DEFAULT_DT: f64 = 0.01;
/// dt beyond this is treated as a clock jump.
const MAX_DT: f64 = 1.0;

/// Everything one frame produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameOutput {
    /// Posed armor detections, for debug/visualization consumers.
    pub armors: Vec<Armor>,
    /// Fused target estimate.
    pub target: Target,
    /// Gimbal command; present only while the tracker holds a usable
    /// estimate.
    pub command: Option<GimbalCommand>,
}

/// Owns the full detect → pose → track → aim chain for one camera.
///
/// Mutable shared state across frames with exactly one logical owner;
/// multiplexing across threads needs external synchronization.
pub struct AimPipeline {
    config: PipelineConfig,
    detector: Detector,
    pose_solver: Option<PoseSolver>,
    tracker: Tracker,
    aim: AimSolver,
}

impl AimPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let detector = Detector::new(config.detector.clone());
        let tracker = Tracker::new(config.tracker.clone(), &config.ekf);
        let aim = AimSolver::new(config.aim.clone());
        Self {
            config,
            detector,
            pose_solver: None,
            tracker,
            aim,
        }
    }

    /// One-time camera intrinsics delivery. Repeat deliveries are ignored;
    /// the first calibration wins.
    pub fn set_camera(&mut self, camera: CameraModel) {
        if self.pose_solver.is_some() {
            tracing::debug!("camera intrinsics already set, ignoring");
            return;
        }
        self.pose_solver = Some(PoseSolver::new(camera, &self.config.pose));
        tracing::info!("camera intrinsics received, pose solver ready");
    }

    /// Convenience form of [`Self::set_camera`] taking the raw calibration
    /// message contents: a 3×3 intrinsic matrix and a distortion vector.
    pub fn set_calibration(
        &mut self,
        k: &Matrix3<f64>,
        dist_coeffs: &[f64],
    ) -> Result<(), CameraError> {
        let camera = CameraModel::from_calibration(k, dist_coeffs)?;
        self.set_camera(camera);
        Ok(())
    }

    /// True once intrinsics have been delivered.
    pub fn camera_ready(&self) -> bool {
        self.pose_solver.is_some()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Process one frame. Returns `None` while camera intrinsics are still
    /// pending; afterwards every frame yields an output, with graceful
    /// degradation to `tracking: false` and no command when nothing is
    /// found.
    pub fn process_frame(&mut self, frame: &RgbImage, dt: f64) -> Option<FrameOutput> {
        let Some(pose_solver) = &self.pose_solver else {
            tracing::warn!("frame dropped: waiting for camera intrinsics");
            return None;
        };

        let dt = sanitize_dt(dt);

        let mut armors = self.detector.detect(frame, self.config.detect_color);
        for armor in &mut armors {
            match pose_solver.solve(armor) {
                Ok(pose) => armor.pose = Some(pose),
                Err(err) => tracing::debug!("pose solve skipped an armor: {err}"),
            }
        }

        self.tracker.update(&armors, dt);
        let target = self.tracker.target();

        let command = target.tracking.then(|| {
            self.aim.solve(
                &self.tracker.state_vector(),
                self.tracker.target_armors_num(),
                self.tracker.state(),
            )
        });

        Some(FrameOutput {
            armors,
            target,
            command,
        })
    }
}

/// Clamp dt to a sane positive range; a stalled or jumped clock must not
/// reach the EKF.
fn sanitize_dt(dt: f64) -> f64 {
    if !dt.is_finite() || dt <= 0.0 || dt > MAX_DT {
        tracing::debug!("dt {dt} out of range, substituting {DEFAULT_DT}");
        DEFAULT_DT
    } else {
        dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aim::TrajectoryCompensator;
    use crate::camera::{CameraIntrinsics, RadialTangentialDistortion};
    use crate::detector::Color;
    use crate::test_utils::draw_armor_from_corners;
    use crate::tracker::TrackerState;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn test_camera() -> CameraModel {
        CameraModel {
            intrinsics: CameraIntrinsics {
                fx: 900.0,
                fy: 900.0,
                cx: 320.0,
                cy: 256.0,
            },
            distortion: RadialTangentialDistortion::default(),
        }
    }

    /// Project the small-armor plate model at a given translation into
    /// corner pixels.
    fn plate_corners(camera: &CameraModel, position: Vector3<f64>) -> [[f64; 2]; 4] {
        let (half_w, half_h) = (0.135 / 2.0, 0.056 / 2.0);
        let model = [
            Vector3::new(-half_w, -half_h, 0.0),
            Vector3::new(half_w, -half_h, 0.0),
            Vector3::new(half_w, half_h, 0.0),
            Vector3::new(-half_w, half_h, 0.0),
        ];
        let mut corners = [[0.0; 2]; 4];
        for (c, m) in corners.iter_mut().zip(&model) {
            *c = camera.project_point(&(m + position)).unwrap();
        }
        corners
    }

    #[test]
    fn frames_are_dropped_until_camera_arrives() {
        let mut pipeline = AimPipeline::new(PipelineConfig::default());
        let frame = crate::test_utils::new_scene(640, 512);

        assert!(!pipeline.camera_ready());
        assert!(pipeline.process_frame(&frame, 0.01).is_none());

        pipeline.set_camera(test_camera());
        assert!(pipeline.camera_ready());
        assert!(pipeline.process_frame(&frame, 0.01).is_some());
    }

    #[test]
    fn first_calibration_wins() {
        let mut pipeline = AimPipeline::new(PipelineConfig::default());
        pipeline.set_camera(test_camera());

        let other = CameraModel {
            intrinsics: CameraIntrinsics {
                fx: 1.0,
                fy: 1.0,
                cx: 0.0,
                cy: 0.0,
            },
            distortion: RadialTangentialDistortion::default(),
        };
        pipeline.set_camera(other);
        assert_eq!(
            pipeline.pose_solver.as_ref().unwrap().camera().intrinsics.fx,
            900.0
        );
    }

    #[test]
    fn raw_calibration_message_builds_the_camera() {
        let mut pipeline = AimPipeline::new(PipelineConfig::default());
        let k = nalgebra::Matrix3::new(900.0, 0.0, 320.0, 0.0, 900.0, 256.0, 0.0, 0.0, 1.0);
        pipeline.set_calibration(&k, &[-0.05, 0.01]).unwrap();
        assert!(pipeline.camera_ready());

        let camera = pipeline.pose_solver.as_ref().unwrap().camera();
        assert_eq!(camera.intrinsics.cx, 320.0);
        assert_eq!(camera.distortion.k1, -0.05);
    }

    #[test]
    fn dt_is_clamped_to_sane_range() {
        assert_relative_eq!(sanitize_dt(0.016), 0.016);
        assert_relative_eq!(sanitize_dt(0.0), DEFAULT_DT);
        assert_relative_eq!(sanitize_dt(-0.5), DEFAULT_DT);
        assert_relative_eq!(sanitize_dt(2.0), DEFAULT_DT);
        assert_relative_eq!(sanitize_dt(f64::NAN), DEFAULT_DT);
    }

    #[test]
    fn empty_frame_degrades_gracefully() {
        let mut pipeline = AimPipeline::new(PipelineConfig::default());
        pipeline.set_camera(test_camera());

        let frame = crate::test_utils::new_scene(640, 512);
        let out = pipeline.process_frame(&frame, 0.01).unwrap();
        assert!(out.armors.is_empty());
        assert!(!out.target.tracking);
        assert!(out.command.is_none());
    }

    #[test]
    fn end_to_end_single_plate_scenario() {
        let camera = test_camera();
        let mut pipeline = AimPipeline::new(PipelineConfig::default());
        pipeline.set_camera(camera);

        let position = Vector3::new(0.15, 0.1, 2.5);
        let corners = plate_corners(&camera, position);
        let mut frame = crate::test_utils::new_scene(640, 512);
        draw_armor_from_corners(&mut frame, &corners, 1.5, Color::Red);

        // Confirmation threshold is 3 consecutive matched frames.
        let mut last = None;
        for _ in 0..3 {
            last = pipeline.process_frame(&frame, 0.01);
        }
        let out = last.unwrap();

        assert_eq!(out.armors.len(), 1, "exactly one armor detected");
        let pose = out.armors[0].pose.as_ref().expect("pose solve succeeded");
        assert_relative_eq!(pose.position.x, position.x, epsilon = 0.05);
        assert_relative_eq!(pose.position.y, position.y, epsilon = 0.05);
        assert_relative_eq!(pose.position.z, position.z, epsilon = 0.15);

        assert_eq!(pipeline.tracker().state(), TrackerState::Tracking);
        assert!(out.target.tracking);

        let cmd = out.command.expect("command emitted while tracking");
        assert!(cmd.fire, "fire asserted in TRACKING");

        // Closed-form expectations from the known pose.
        let expected_yaw = position.x.atan2(position.z);
        let compensator = TrajectoryCompensator::new(30.0, 9.82, 0.092);
        let expected_pitch = compensator.pitch_for(&position);
        assert_relative_eq!(cmd.yaw, expected_yaw, epsilon = 0.03);
        assert_relative_eq!(cmd.pitch, expected_pitch, epsilon = 0.03);
    }

    #[test]
    fn losing_the_plate_stops_fire() {
        let camera = test_camera();
        let mut pipeline = AimPipeline::new(PipelineConfig::default());
        pipeline.set_camera(camera);

        let corners = plate_corners(&camera, Vector3::new(0.0, 0.0, 3.0));
        let mut frame = crate::test_utils::new_scene(640, 512);
        draw_armor_from_corners(&mut frame, &corners, 1.5, Color::Red);

        for _ in 0..3 {
            pipeline.process_frame(&frame, 0.01);
        }
        assert_eq!(pipeline.tracker().state(), TrackerState::Tracking);

        // One empty frame: TEMP_LOST still yields a command, but no fire.
        let empty = crate::test_utils::new_scene(640, 512);
        let out = pipeline.process_frame(&empty, 0.01).unwrap();
        assert_eq!(pipeline.tracker().state(), TrackerState::TempLost);
        assert!(out.target.tracking);
        let cmd = out.command.expect("TEMP_LOST still aims");
        assert!(!cmd.fire);
    }
}
