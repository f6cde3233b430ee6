//! Shared test utilities for image-based unit tests.
//!
//! Renders synthetic light-bar scenes directly into `RgbImage` buffers so
//! detector and end-to-end tests do not depend on fixture files.

use image::{Rgb, RgbImage};

use crate::detector::Color;

/// Black scene of the given size.
pub(crate) fn new_scene(w: u32, h: u32) -> RgbImage {
    RgbImage::new(w, h)
}

/// Bright bar fill for a team color. Values chosen so the grayscale
/// conversion clears the default binary threshold and the channel
/// difference clears the default color gate.
pub(crate) fn bar_color(color: Color) -> Rgb<u8> {
    match color {
        Color::Red => Rgb([255, 120, 60]),
        Color::Blue => Rgb([60, 120, 255]),
    }
}

/// Draw a light bar as a thick segment from `top` to `bottom` (pixel
/// coordinates), with rounded caps of radius `half_width`.
pub(crate) fn draw_bar(
    img: &mut RgbImage,
    top: [f64; 2],
    bottom: [f64; 2],
    half_width: f64,
    color: Color,
) {
    let fill = bar_color(color);
    let (w, h) = img.dimensions();

    let min_x = (top[0].min(bottom[0]) - half_width - 1.0).floor().max(0.0) as u32;
    let max_x = ((top[0].max(bottom[0]) + half_width + 1.0).ceil() as i64)
        .clamp(0, w.saturating_sub(1) as i64) as u32;
    let min_y = (top[1].min(bottom[1]) - half_width - 1.0).floor().max(0.0) as u32;
    let max_y = ((top[1].max(bottom[1]) + half_width + 1.0).ceil() as i64)
        .clamp(0, h.saturating_sub(1) as i64) as u32;

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let p = [x as f64 + 0.5, y as f64 + 0.5];
            if distance_to_segment(p, top, bottom) <= half_width {
                img.put_pixel(x, y, fill);
            }
        }
    }
}

fn distance_to_segment(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let abx = b[0] - a[0];
    let aby = b[1] - a[1];
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq < 1e-12 {
        0.0
    } else {
        (((p[0] - a[0]) * abx + (p[1] - a[1]) * aby) / len_sq).clamp(0.0, 1.0)
    };
    let cx = a[0] + t * abx;
    let cy = a[1] + t * aby;
    ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt()
}

/// Draw an armor plate given its four corner pixels (top-left, top-right,
/// bottom-right, bottom-left): two light bars along the left and right
/// edges.
///
/// Endpoints are inset by `half_width` along the bar axis so the rasterized
/// extent (including the rounded caps) matches the requested corners.
pub(crate) fn draw_armor_from_corners(
    img: &mut RgbImage,
    corners: &[[f64; 2]; 4],
    half_width: f64,
    color: Color,
) {
    let inset = |top: [f64; 2], bottom: [f64; 2]| {
        let dx = bottom[0] - top[0];
        let dy = bottom[1] - top[1];
        let len = (dx * dx + dy * dy).sqrt().max(1e-9);
        let (ux, uy) = (dx / len, dy / len);
        (
            [top[0] + ux * half_width, top[1] + uy * half_width],
            [bottom[0] - ux * half_width, bottom[1] - uy * half_width],
        )
    };

    let (lt, lb) = inset(corners[0], corners[3]);
    draw_bar(img, lt, lb, half_width, color);
    let (rt, rb) = inset(corners[1], corners[2]);
    draw_bar(img, rt, rb, half_width, color);
}
