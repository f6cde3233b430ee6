//! A single detected light bar.

use serde::{Deserialize, Serialize};

/// Team color of a light bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Blue,
}

/// A bright line-like blob, the atomic unit of marker detection.
///
/// Derived from a minimum-area rotated rectangle every frame; never
/// persisted across frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Light {
    /// Rectangle center in image pixels.
    pub center: [f64; 2],
    /// Midpoint of the upper short edge (smaller y).
    pub top: [f64; 2],
    /// Midpoint of the lower short edge.
    pub bottom: [f64; 2],
    /// Long-axis extent in pixels.
    pub length: f64,
    /// Short-axis extent in pixels.
    pub width: f64,
    /// Long-axis deviation from vertical, degrees in [-90, 90].
    pub tilt_angle: f64,
    /// Classified color; provisional until the detector classifies it.
    pub color: Color,
}

/// Fold an angle in degrees into [-90, 90].
pub fn normalize_tilt(mut angle: f64) -> f64 {
    while angle > 90.0 {
        angle -= 180.0;
    }
    while angle < -90.0 {
        angle += 180.0;
    }
    angle
}

impl Light {
    /// Build light geometry from the four corners of a fitted rotated
    /// rectangle (winding order).
    pub fn from_rect_corners(corners: &[[f64; 2]; 4]) -> Self {
        let mid = |a: [f64; 2], b: [f64; 2]| [(a[0] + b[0]) * 0.5, (a[1] + b[1]) * 0.5];
        let dist = |a: [f64; 2], b: [f64; 2]| {
            ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
        };

        let e01 = dist(corners[0], corners[1]);
        let e12 = dist(corners[1], corners[2]);

        // Endpoints are midpoints of the two short edges.
        let (mut end_a, mut end_b, length, width) = if e01 >= e12 {
            (
                mid(corners[1], corners[2]),
                mid(corners[3], corners[0]),
                e01,
                e12,
            )
        } else {
            (
                mid(corners[0], corners[1]),
                mid(corners[2], corners[3]),
                e12,
                e01,
            )
        };
        if end_a[1] > end_b[1] {
            std::mem::swap(&mut end_a, &mut end_b);
        }

        let center = mid(end_a, end_b);
        let tilt = (end_b[0] - end_a[0])
            .atan2(end_b[1] - end_a[1])
            .to_degrees();

        Self {
            center,
            top: end_a,
            bottom: end_b,
            length,
            width,
            tilt_angle: normalize_tilt(tilt),
            color: Color::Red,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tilt_normalization_folds_into_range() {
        assert_relative_eq!(normalize_tilt(95.0), -85.0);
        assert_relative_eq!(normalize_tilt(-135.0), 45.0);
        assert_relative_eq!(normalize_tilt(180.0), 0.0);
        for a in [-400.0, -91.0, 0.0, 45.0, 89.9, 260.0] {
            let n = normalize_tilt(a);
            assert!((-90.0..=90.0).contains(&n), "{a} -> {n}");
        }
    }

    #[test]
    fn vertical_bar_has_zero_tilt() {
        let corners = [[10.0, 0.0], [14.0, 0.0], [14.0, 40.0], [10.0, 40.0]];
        let light = Light::from_rect_corners(&corners);
        assert_relative_eq!(light.tilt_angle, 0.0, epsilon = 1e-9);
        assert_relative_eq!(light.length, 40.0);
        assert_relative_eq!(light.width, 4.0);
        assert_relative_eq!(light.top[1], 0.0);
        assert_relative_eq!(light.bottom[1], 40.0);
        assert_relative_eq!(light.center[0], 12.0);
    }

    #[test]
    fn tilted_bar_tilt_is_signed() {
        // Leans right going down: bottom x > top x.
        let top = [20.0, 10.0];
        let bottom = [30.0, 40.0];
        let corners = [
            [top[0] - 1.5, top[1]],
            [top[0] + 1.5, top[1]],
            [bottom[0] + 1.5, bottom[1]],
            [bottom[0] - 1.5, bottom[1]],
        ];
        let light = Light::from_rect_corners(&corners);
        assert!(light.tilt_angle > 0.0);
        assert!(light.tilt_angle < 90.0);
    }
}
