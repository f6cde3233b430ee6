//! Ballistic pitch compensation under gravity and linear air resistance.

use nalgebra::Vector3;

const MAX_ITERS: usize = 20;
/// Stop once the residual height error is below this (meters).
const HEIGHT_EPS: f64 = 0.001;

/// Iterative trajectory compensator.
///
/// The horizontal motion follows the linear-drag model
/// `t = (e^{k·d} − 1) / (k·v₀·cosθ)`; the vertical drop over that flight
/// time is `v₀·sinθ·t − g·t²/2`. The launch angle is refined by feeding
/// the height error back into the aim height until it converges.
#[derive(Debug, Clone)]
pub struct TrajectoryCompensator {
    bullet_speed: f64,
    gravity: f64,
    resistance: f64,
}

impl TrajectoryCompensator {
    pub fn new(bullet_speed: f64, gravity: f64, resistance: f64) -> Self {
        Self {
            bullet_speed,
            gravity,
            resistance,
        }
    }

    /// Compensated pitch (radians, positive up) for an aim point in the
    /// camera frame (x right, y down, z forward).
    pub fn pitch_for(&self, aim: &Vector3<f64>) -> f64 {
        let d = (aim.x * aim.x + aim.z * aim.z).sqrt();
        let h = -aim.y;
        self.solve_pitch(d, h)
    }

    /// Launch angle hitting height `h` at horizontal distance `d`.
    pub fn solve_pitch(&self, d: f64, h: f64) -> f64 {
        if d < 1e-6 {
            return h.atan2(d);
        }

        let mut aim_h = h;
        let mut pitch = h.atan2(d);
        for _ in 0..MAX_ITERS {
            pitch = aim_h.atan2(d);
            let t = self.flight_time(d, pitch);
            if !t.is_finite() {
                break;
            }
            let drop_h = self.bullet_speed * pitch.sin() * t - 0.5 * self.gravity * t * t;
            let dh = h - drop_h;
            if !dh.is_finite() {
                break;
            }
            aim_h += dh;
            if dh.abs() < HEIGHT_EPS {
                break;
            }
        }
        pitch
    }

    /// Horizontal flight time to distance `d` at launch angle `pitch`.
    fn flight_time(&self, d: f64, pitch: f64) -> f64 {
        let vx = self.bullet_speed * pitch.cos();
        if vx.abs() < 1e-9 {
            return f64::INFINITY;
        }
        if self.resistance.abs() < 1e-9 {
            d / vx
        } else {
            ((self.resistance * d).exp() - 1.0) / (self.resistance * vx)
        }
    }
}
