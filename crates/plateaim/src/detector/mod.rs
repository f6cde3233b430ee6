//! Armor-plate detection from raw color frames.
//!
//! The stages are:
//!
//! 1. **Binarize** – grayscale conversion + global threshold.
//! 2. **Lights** – external contours, minimum-area rotated rectangles,
//!    aspect/tilt gating, red/blue classification.
//! 3. **Pairing** – x-sorted pairwise matching of lights into armor
//!    candidates with distance-ratio, horizontality, length-ratio and
//!    intervening-light constraints.
//!
//! Detection is per-frame and stateless apart from the retained binary
//! mask, which is exposed for debug consumers.

mod armor;
mod config;
mod contour;
mod light;

pub use armor::{Armor, ArmorPose, ArmorType};
pub use config::DetectorConfig;
pub use light::{normalize_tilt, Color, Light};

use image::{imageops, GrayImage, RgbImage};

/// Armor-plate detector.
pub struct Detector {
    config: DetectorConfig,
    binary: Option<GrayImage>,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            binary: None,
        }
    }

    /// Access the current configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Binary mask of the most recent frame, for debug consumers.
    pub fn binary_mask(&self) -> Option<&GrayImage> {
        self.binary.as_ref()
    }

    /// Detect armor plates of the requested color in a color frame.
    ///
    /// Absence of valid candidates is a normal empty result, never an
    /// error.
    pub fn detect(&mut self, frame: &RgbImage, detect_color: Color) -> Vec<Armor> {
        let gray = imageops::grayscale(frame);
        let mask = contour::binarize(&gray, self.config.binary_threshold);

        let mut lights = self.detect_lights(frame, &mask, detect_color);
        self.binary = Some(mask);

        // Deterministic left-to-right pairing order.
        lights.sort_by(|a, b| a.center[0].total_cmp(&b.center[0]));

        let armors = self.match_armors(&lights);
        tracing::debug!("{} lights, {} armors", lights.len(), armors.len());
        armors
    }

    fn detect_lights(
        &self,
        frame: &RgbImage,
        mask: &GrayImage,
        detect_color: Color,
    ) -> Vec<Light> {
        let mut lights = Vec::new();

        for contour in contour::external_contours(mask) {
            // Too few points for a stable rectangle fit.
            if contour.len() < 5 {
                continue;
            }
            let Some(rect) = contour::min_area_rect(&contour) else {
                continue;
            };

            let mut light = Light::from_rect_corners(&rect);
            if !self.is_valid_light(&light) {
                continue;
            }

            light.color = self.classify_light_color(frame, &rect);
            if light.color != detect_color {
                continue;
            }

            lights.push(light);
        }

        lights
    }

    fn is_valid_light(&self, light: &Light) -> bool {
        let ratio = light.length / light.width.max(1.0);
        if ratio < self.config.light_min_ratio || ratio > self.config.light_max_ratio {
            return false;
        }
        normalize_tilt(light.tilt_angle).abs() <= self.config.light_max_angle
    }

    /// Classify a light's color from mean channel intensities inside the
    /// filled rotated rectangle.
    fn classify_light_color(&self, frame: &RgbImage, rect: &[[f64; 2]; 4]) -> Color {
        let (w, h) = frame.dimensions();
        let min_x = rect.iter().fold(f64::INFINITY, |m, c| m.min(c[0])).floor().max(0.0) as u32;
        let max_x = rect.iter().fold(f64::NEG_INFINITY, |m, c| m.max(c[0])).ceil() as i64;
        let min_y = rect.iter().fold(f64::INFINITY, |m, c| m.min(c[1])).floor().max(0.0) as u32;
        let max_y = rect.iter().fold(f64::NEG_INFINITY, |m, c| m.max(c[1])).ceil() as i64;
        let max_x = (max_x.max(0) as u32).min(w.saturating_sub(1));
        let max_y = (max_y.max(0) as u32).min(h.saturating_sub(1));

        let mut r_sum = 0.0f64;
        let mut b_sum = 0.0f64;
        let mut count = 0u64;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if !point_in_convex_quad([x as f64 + 0.5, y as f64 + 0.5], rect) {
                    continue;
                }
                let px = frame.get_pixel(x, y);
                r_sum += px[0] as f64;
                b_sum += px[2] as f64;
                count += 1;
            }
        }

        let n = count.max(1) as f64;
        let r_mean = r_sum / n;
        let b_mean = b_sum / n;

        if r_mean - b_mean > self.config.light_color_diff_thresh {
            Color::Red
        } else if b_mean - r_mean > self.config.light_color_diff_thresh {
            Color::Blue
        } else if r_mean > b_mean {
            Color::Red
        } else {
            Color::Blue
        }
    }

    fn match_armors(&self, lights: &[Light]) -> Vec<Armor> {
        let mut armors = Vec::new();

        for i in 0..lights.len() {
            for j in (i + 1)..lights.len() {
                let left = &lights[i];
                let right = &lights[j];

                if !self.is_valid_armor(left, right) {
                    continue;
                }
                if contains_light(i, j, lights) {
                    continue;
                }

                let ratio = center_distance_ratio(left, right);
                let armor_type = if ratio < self.config.armor_max_small_center_distance {
                    ArmorType::Small
                } else {
                    ArmorType::Large
                };

                armors.push(Armor::new(left.clone(), right.clone(), armor_type));
            }
        }

        armors
    }

    fn is_valid_armor(&self, left: &Light, right: &Light) -> bool {
        let ratio = center_distance_ratio(left, right);

        let small_ok = ratio >= self.config.armor_min_small_center_distance
            && ratio <= self.config.armor_max_small_center_distance;
        let large_ok = ratio >= self.config.armor_min_large_center_distance
            && ratio <= self.config.armor_max_large_center_distance;
        if !small_ok && !large_ok {
            return false;
        }

        // The line between light centers should be near horizontal.
        let dx = right.center[0] - left.center[0];
        let dy = right.center[1] - left.center[1];
        let angle = dy.atan2(dx).abs().to_degrees();
        if angle > self.config.armor_max_angle {
            return false;
        }

        // Grossly mismatched light lengths cannot be one plate.
        let length_ratio = if left.length < right.length {
            left.length / right.length
        } else {
            right.length / left.length
        };
        length_ratio >= 0.3
    }
}

fn center_distance_ratio(left: &Light, right: &Light) -> f64 {
    let dx = right.center[0] - left.center[0];
    let dy = right.center[1] - left.center[1];
    let center_dist = (dx * dx + dy * dy).sqrt();
    let avg_length = (left.length + right.length) * 0.5;
    center_dist / avg_length.max(1e-9)
}

/// True when any other light's center x lies strictly between the pair's
/// centers; an intervening light means this is not the adjacent pair.
fn contains_light(i: usize, j: usize, lights: &[Light]) -> bool {
    let lx = lights[i].center[0];
    let rx = lights[j].center[0];
    lights
        .iter()
        .enumerate()
        .any(|(k, light)| k != i && k != j && light.center[0] > lx && light.center[0] < rx)
}

fn point_in_convex_quad(p: [f64; 2], quad: &[[f64; 2]; 4]) -> bool {
    let mut sign = 0.0f64;
    for k in 0..4 {
        let a = quad[k];
        let b = quad[(k + 1) % 4];
        let cross = (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);
        if cross.abs() < 1e-12 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{draw_bar, new_scene};

    fn detector() -> Detector {
        Detector::new(DetectorConfig::default())
    }

    #[test]
    fn empty_frame_detects_nothing() {
        let frame = new_scene(320, 240);
        let armors = detector().detect(&frame, Color::Red);
        assert!(armors.is_empty());
    }

    #[test]
    fn single_red_pair_is_detected_small() {
        let mut frame = new_scene(320, 240);
        draw_bar(&mut frame, [100.0, 80.0], [100.0, 120.0], 2.0, Color::Red);
        draw_bar(&mut frame, [160.0, 80.0], [160.0, 120.0], 2.0, Color::Red);

        let armors = detector().detect(&frame, Color::Red);
        assert_eq!(armors.len(), 1);
        assert_eq!(armors[0].armor_type, ArmorType::Small);
        assert_eq!(armors[0].number, "unknown");

        let c = armors[0].center();
        assert!((c[0] - 130.0).abs() < 2.0);
        assert!((c[1] - 100.0).abs() < 2.0);
    }

    #[test]
    fn wrong_color_pair_is_ignored() {
        let mut frame = new_scene(320, 240);
        draw_bar(&mut frame, [100.0, 80.0], [100.0, 120.0], 2.0, Color::Blue);
        draw_bar(&mut frame, [160.0, 80.0], [160.0, 120.0], 2.0, Color::Blue);

        assert!(detector().detect(&frame, Color::Red).is_empty());
        assert_eq!(detector().detect(&frame, Color::Blue).len(), 1);
    }

    #[test]
    fn over_tilted_lights_are_rejected() {
        let mut frame = new_scene(320, 240);
        // ~63 degrees from vertical, well past the 40 degree gate.
        draw_bar(&mut frame, [80.0, 90.0], [120.0, 110.0], 2.0, Color::Red);
        draw_bar(&mut frame, [160.0, 90.0], [200.0, 110.0], 2.0, Color::Red);

        assert!(detector().detect(&frame, Color::Red).is_empty());
    }

    #[test]
    fn intervening_light_blocks_outer_pair() {
        let mut frame = new_scene(480, 240);
        // Three equally plausible bars in a row: the outer pair (0, 2) must
        // not form an armor across the middle one.
        for x in [100.0, 160.0, 220.0] {
            draw_bar(&mut frame, [x, 80.0], [x, 120.0], 2.0, Color::Red);
        }

        let armors = detector().detect(&frame, Color::Red);
        for armor in &armors {
            let lx = armor.left_light.center[0];
            let rx = armor.right_light.center[0];
            assert!(
                rx - lx < 100.0,
                "pair spans an intervening light: {lx} .. {rx}"
            );
        }
    }

    #[test]
    fn mismatched_length_pair_is_rejected() {
        let mut frame = new_scene(320, 240);
        draw_bar(&mut frame, [100.0, 80.0], [100.0, 120.0], 2.0, Color::Red);
        // A stub one quarter the height: length ratio 0.25 < 0.3.
        draw_bar(&mut frame, [160.0, 95.0], [160.0, 105.0], 2.0, Color::Red);

        assert!(detector().detect(&frame, Color::Red).is_empty());
    }

    #[test]
    fn binary_mask_is_retained_for_debug() {
        let mut frame = new_scene(64, 64);
        draw_bar(&mut frame, [30.0, 10.0], [30.0, 50.0], 2.0, Color::Red);
        let mut det = detector();
        assert!(det.binary_mask().is_none());
        det.detect(&frame, Color::Red);
        let mask = det.binary_mask().unwrap();
        assert!(mask.iter().any(|&p| p == 255));
    }
}
