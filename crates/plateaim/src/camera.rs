//! Camera intrinsics and radial-tangential distortion model.
//!
//! The pose solver works in two frames: raw image pixels (where corners are
//! observed) and normalized pinhole coordinates (where the plane-to-image
//! homography is fitted). This module provides the mapping between them,
//! plus full 3D-point projection for reprojection-error scoring.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Errors raised when building a camera model from raw calibration data.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraError {
    /// The 3×3 intrinsic matrix has a non-finite or near-zero focal length.
    InvalidIntrinsics,
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIntrinsics => write!(f, "invalid camera intrinsic matrix"),
        }
    }
}

impl std::error::Error for CameraError {}

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Returns `true` when focal lengths are finite and non-zero.
    pub fn is_valid(self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    /// Convert pixel coordinates to normalized pinhole coordinates.
    pub fn pixel_to_normalized(self, pixel_xy: [f64; 2]) -> Option<[f64; 2]> {
        if !self.is_valid() {
            return None;
        }
        let x = (pixel_xy[0] - self.cx) / self.fx;
        let y = (pixel_xy[1] - self.cy) / self.fy;
        if x.is_finite() && y.is_finite() {
            Some([x, y])
        } else {
            None
        }
    }

    /// Convert normalized pinhole coordinates to pixel coordinates.
    pub fn normalized_to_pixel(self, normalized_xy: [f64; 2]) -> [f64; 2] {
        [
            self.fx * normalized_xy[0] + self.cx,
            self.fy * normalized_xy[1] + self.cy,
        ]
    }
}

/// Brown-Conrady radial-tangential distortion coefficients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RadialTangentialDistortion {
    /// Radial coefficient k1.
    pub k1: f64,
    /// Radial coefficient k2.
    pub k2: f64,
    /// Tangential coefficient p1.
    pub p1: f64,
    /// Tangential coefficient p2.
    pub p2: f64,
    /// Radial coefficient k3.
    pub k3: f64,
}

impl RadialTangentialDistortion {
    /// Build from a calibration coefficient vector in `[k1, k2, p1, p2, k3]`
    /// order. Missing trailing coefficients are treated as zero; extra
    /// entries are ignored.
    pub fn from_coeffs(coeffs: &[f64]) -> Self {
        let at = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
        }
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort_normalized(self, normalized_xy: [f64; 2]) -> [f64; 2] {
        let x = normalized_xy[0];
        let y = normalized_xy[1];
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        [x * radial + x_tan, y * radial + y_tan]
    }
}

/// Distortion inversion settings used by iterative undistortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UndistortConfig {
    /// Maximum fixed-point iterations.
    pub max_iters: usize,
    /// Stop when the coordinate update norm is below this threshold.
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 15,
            eps: 1e-12,
        }
    }
}

/// Complete camera model (intrinsics + radial-tangential distortion).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    /// Camera intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// Distortion coefficients.
    pub distortion: RadialTangentialDistortion,
}

impl CameraModel {
    /// Build from a row-major 3×3 intrinsic matrix and a distortion
    /// coefficient vector, as delivered by the one-time calibration message.
    pub fn from_calibration(
        k: &Matrix3<f64>,
        dist_coeffs: &[f64],
    ) -> Result<Self, CameraError> {
        let intrinsics = CameraIntrinsics {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        };
        if !intrinsics.is_valid() {
            return Err(CameraError::InvalidIntrinsics);
        }
        Ok(Self {
            intrinsics,
            distortion: RadialTangentialDistortion::from_coeffs(dist_coeffs),
        })
    }

    /// Project a 3D point in the camera frame (x right, y down, z forward)
    /// to distorted pixel coordinates. Points at or behind the image plane
    /// project to `None`.
    pub fn project_point(self, point: &Vector3<f64>) -> Option<[f64; 2]> {
        if point.z <= 1e-9 {
            return None;
        }
        let normalized = [point.x / point.z, point.y / point.z];
        let distorted = self.distortion.distort_normalized(normalized);
        let pix = self.intrinsics.normalized_to_pixel(distorted);
        if pix[0].is_finite() && pix[1].is_finite() {
            Some(pix)
        } else {
            None
        }
    }

    /// Map a distorted pixel observation to ideal normalized coordinates
    /// with default iterative settings.
    pub fn undistort_to_normalized(self, pixel_xy: [f64; 2]) -> Option<[f64; 2]> {
        self.undistort_to_normalized_with(pixel_xy, UndistortConfig::default())
    }

    /// Map a distorted pixel observation to ideal normalized coordinates.
    ///
    /// Inverts the Brown-Conrady model by fixed-point iteration.
    pub fn undistort_to_normalized_with(
        self,
        pixel_xy: [f64; 2],
        cfg: UndistortConfig,
    ) -> Option<[f64; 2]> {
        let xd = self.intrinsics.pixel_to_normalized(pixel_xy)?;
        let mut x = xd[0];
        let mut y = xd[1];

        for _ in 0..cfg.max_iters.max(1) {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let radial =
                1.0 + self.distortion.k1 * r2 + self.distortion.k2 * r4 + self.distortion.k3 * r6;
            if !radial.is_finite() || radial.abs() < 1e-12 {
                return None;
            }

            let dx_tan = 2.0 * self.distortion.p1 * x * y + self.distortion.p2 * (r2 + 2.0 * x * x);
            let dy_tan = self.distortion.p1 * (r2 + 2.0 * y * y) + 2.0 * self.distortion.p2 * x * y;
            let x_next = (xd[0] - dx_tan) / radial;
            let y_next = (xd[1] - dy_tan) / radial;

            if !x_next.is_finite() || !y_next.is_finite() {
                return None;
            }

            let dx = x_next - x;
            let dy = y_next - y;
            x = x_next;
            y = y_next;

            if (dx * dx + dy * dy).sqrt() <= cfg.eps.max(0.0) {
                break;
            }
        }

        if x.is_finite() && y.is_finite() {
            Some([x, y])
        } else {
            None
        }
    }
}
