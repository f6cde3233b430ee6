//! A matched pair of lights treated as one rigid planar marker plate.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::light::Light;

/// Physical plate size class, decided by the light-distance ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmorType {
    Small,
    Large,
}

/// Recovered 3D pose of an armor plate in the camera frame
/// (x right, y down, z forward; meters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmorPose {
    /// Plate orientation.
    pub rotation: Matrix3<f64>,
    /// Plate center position.
    pub position: Vector3<f64>,
    /// Rotation about the vertical axis: `atan2(R[2][0], R[0][0])`.
    pub yaw: f64,
}

/// A detected armor plate: two matched lights plus classification metadata.
///
/// Armors are ephemeral, reconstructed every frame. `pose` stays `None`
/// until the pose solver succeeds for this plate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Armor {
    pub left_light: Light,
    pub right_light: Light,
    pub armor_type: ArmorType,
    /// Classification label; "unknown" until an external classifier fills it.
    pub number: String,
    pub pose: Option<ArmorPose>,
}

impl Armor {
    pub fn new(left_light: Light, right_light: Light, armor_type: ArmorType) -> Self {
        Self {
            left_light,
            right_light,
            armor_type,
            number: "unknown".to_string(),
            pose: None,
        }
    }

    /// Plate center in image pixels.
    pub fn center(&self) -> [f64; 2] {
        [
            (self.left_light.center[0] + self.right_light.center[0]) * 0.5,
            (self.left_light.center[1] + self.right_light.center[1]) * 0.5,
        ]
    }

    /// Corner points in image pixels, ordered top-left, top-right,
    /// bottom-right, bottom-left. The pose solver's model points follow
    /// the same order.
    pub fn corners(&self) -> [[f64; 2]; 4] {
        [
            self.left_light.top,
            self.right_light.top,
            self.right_light.bottom,
            self.left_light.bottom,
        ]
    }

    /// Pixel distance from the plate center to a reference point
    /// (typically the image center). Advisory metric for downstream
    /// consumers choosing among plates.
    pub fn distance_to_center(&self, reference: [f64; 2]) -> f64 {
        let c = self.center();
        ((c[0] - reference[0]).powi(2) + (c[1] - reference[1]).powi(2)).sqrt()
    }
}
