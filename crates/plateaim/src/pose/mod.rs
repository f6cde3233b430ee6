//! Monocular pose recovery for detected armor plates.
//!
//! One plate is a planar square-ish target, so the solve runs through a
//! plane-to-image homography and the two-solution IPPE decomposition;
//! reprojection error against the observed corners picks the winner.

mod homography;
mod ippe;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::detector::{Armor, ArmorPose, ArmorType};

/// Physical plate model dimensions (meters).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseSolverConfig {
    /// Light-center distance of a small plate.
    pub small_armor_width: f64,
    /// Light-center distance of a large plate.
    pub large_armor_width: f64,
    /// Light-bar length (plate model height).
    pub light_bar_length: f64,
}

impl Default for PoseSolverConfig {
    fn default() -> Self {
        Self {
            small_armor_width: 0.135,
            large_armor_width: 0.225,
            light_bar_length: 0.056,
        }
    }
}

/// Pose recovery failure; the caller skips the armor and continues with the
/// rest of the frame's candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum PoseError {
    /// A corner observation could not be undistorted.
    BadObservation,
    /// The corner correspondences do not support a homography fit.
    DegenerateHomography,
    /// No decomposition candidate projected in front of the camera.
    NoValidPose,
}

impl std::fmt::Display for PoseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadObservation => write!(f, "corner observation could not be normalized"),
            Self::DegenerateHomography => write!(f, "degenerate corner homography"),
            Self::NoValidPose => write!(f, "no valid pose candidate"),
        }
    }
}

impl std::error::Error for PoseError {}

/// Extract rotation about the vertical axis as `atan2(R[2][0], R[0][0])`.
///
/// The tracker's motion model relies on this exact convention.
pub fn extract_yaw(rotation: &Matrix3<f64>) -> f64 {
    rotation[(2, 0)].atan2(rotation[(0, 0)])
}

/// Monocular plate pose solver.
pub struct PoseSolver {
    camera: CameraModel,
    small_points: [Vector3<f64>; 4],
    large_points: [Vector3<f64>; 4],
}

impl PoseSolver {
    pub fn new(camera: CameraModel, config: &PoseSolverConfig) -> Self {
        Self {
            camera,
            small_points: model_points(config.small_armor_width, config.light_bar_length),
            large_points: model_points(config.large_armor_width, config.light_bar_length),
        }
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    /// Recover the plate pose from its observed 2D corners.
    pub fn solve(&self, armor: &Armor) -> Result<ArmorPose, PoseError> {
        let corners = armor.corners();
        let model = self.object_points(armor.armor_type);

        let mut normalized = [[0.0f64; 2]; 4];
        for (n, c) in normalized.iter_mut().zip(&corners) {
            *n = self
                .camera
                .undistort_to_normalized(*c)
                .ok_or(PoseError::BadObservation)?;
        }

        let plane: Vec<[f64; 2]> = model.iter().map(|p| [p.x, p.y]).collect();
        let h = homography::fit_homography(&plane, &normalized)
            .ok_or(PoseError::DegenerateHomography)?;

        let rotations = ippe::rotation_candidates(&h).ok_or(PoseError::DegenerateHomography)?;

        // Reprojection error against the observed pixels disambiguates the
        // two planar solutions.
        let mut best: Option<(f64, ArmorPose)> = None;
        for rotation in rotations {
            let Some(translation) = ippe::solve_translation(model, &normalized, &rotation) else {
                continue;
            };
            if translation.z <= 0.0 {
                continue;
            }
            let Some(error) = self.mean_reprojection_error(model, &corners, &rotation, &translation)
            else {
                continue;
            };
            if best.as_ref().map_or(true, |(e, _)| error < *e) {
                best = Some((
                    error,
                    ArmorPose {
                        rotation,
                        position: translation,
                        yaw: extract_yaw(&rotation),
                    },
                ));
            }
        }

        best.map(|(_, pose)| pose).ok_or(PoseError::NoValidPose)
    }

    fn object_points(&self, armor_type: ArmorType) -> &[Vector3<f64>; 4] {
        match armor_type {
            ArmorType::Small => &self.small_points,
            ArmorType::Large => &self.large_points,
        }
    }

    fn mean_reprojection_error(
        &self,
        model: &[Vector3<f64>; 4],
        observed: &[[f64; 2]; 4],
        rotation: &Matrix3<f64>,
        translation: &Vector3<f64>,
    ) -> Option<f64> {
        let mut total = 0.0;
        for (x, obs) in model.iter().zip(observed) {
            let projected = self.camera.project_point(&(rotation * x + translation))?;
            let dx = projected[0] - obs[0];
            let dy = projected[1] - obs[1];
            total += (dx * dx + dy * dy).sqrt();
        }
        Some(total / model.len() as f64)
    }
}

/// Plate model corners, ordered like `Armor::corners()`:
/// top-left, top-right, bottom-right, bottom-left. Plate-centered,
/// y down, z out of the plate.
fn model_points(width: f64, height: f64) -> [Vector3<f64>; 4] {
    let half_w = width / 2.0;
    let half_h = height / 2.0;
    [
        Vector3::new(-half_w, -half_h, 0.0),
        Vector3::new(half_w, -half_h, 0.0),
        Vector3::new(half_w, half_h, 0.0),
        Vector3::new(-half_w, half_h, 0.0),
    ]
}
