//! Binary-mask preparation, external contour extraction, and minimum-area
//! rotated rectangle fitting.
//!
//! Contours come from `imageproc`; the rotated rectangle is computed with
//! rotating calipers over the convex hull in `f64` so that light-bar tilt
//! is not quantized to integer hull corners.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;

/// Global binary threshold: pixels strictly above `threshold` become 255.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut mask = GrayImage::new(w, h);
    for (dst, src) in mask.iter_mut().zip(gray.iter()) {
        *dst = if *src > threshold { 255 } else { 0 };
    }
    mask
}

/// Extract top-level outer-border contours of a binary mask.
pub fn external_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}

/// Fit a minimum-area rotated rectangle around a point set.
///
/// Returns the four corners in winding order, or `None` when the point set
/// cannot support a rectangle fit.
pub fn min_area_rect(points: &[Point<i32>]) -> Option<[[f64; 2]; 4]> {
    if points.is_empty() {
        return None;
    }
    let hull = convex_hull(points);
    match hull.len() {
        0 => None,
        1 => {
            let p = [hull[0].x as f64, hull[0].y as f64];
            Some([p, p, p, p])
        }
        2 => {
            // Degenerate (collinear) contour: zero-width rectangle along the
            // segment.
            let a = [hull[0].x as f64, hull[0].y as f64];
            let b = [hull[1].x as f64, hull[1].y as f64];
            Some([a, b, b, a])
        }
        _ => calipers(&hull),
    }
}

/// Rotating calipers: the minimum-area enclosing rectangle has one side
/// collinear with a hull edge.
fn calipers(hull: &[Point<i32>]) -> Option<[[f64; 2]; 4]> {
    let pts: Vec<[f64; 2]> = hull.iter().map(|p| [p.x as f64, p.y as f64]).collect();

    let mut best_area = f64::INFINITY;
    let mut best: Option<[[f64; 2]; 4]> = None;

    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        let ex = b[0] - a[0];
        let ey = b[1] - a[1];
        let len = (ex * ex + ey * ey).sqrt();
        if len < 1e-12 {
            continue;
        }
        let ux = ex / len;
        let uy = ey / len;
        // Perpendicular axis
        let vx = -uy;
        let vy = ux;

        let mut s_min = f64::INFINITY;
        let mut s_max = f64::NEG_INFINITY;
        let mut t_min = f64::INFINITY;
        let mut t_max = f64::NEG_INFINITY;
        for p in &pts {
            let s = p[0] * ux + p[1] * uy;
            let t = p[0] * vx + p[1] * vy;
            s_min = s_min.min(s);
            s_max = s_max.max(s);
            t_min = t_min.min(t);
            t_max = t_max.max(t);
        }

        let area = (s_max - s_min) * (t_max - t_min);
        if area < best_area {
            best_area = area;
            let corner = |s: f64, t: f64| [ux * s + vx * t, uy * s + vy * t];
            best = Some([
                corner(s_min, t_min),
                corner(s_max, t_min),
                corner(s_max, t_max),
                corner(s_min, t_max),
            ]);
        }
    }

    best
}
