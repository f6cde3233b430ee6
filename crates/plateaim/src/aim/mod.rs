//! Aim-point selection and gimbal command synthesis.
//!
//! Converts the tracker's rotating-target estimate into a yaw/pitch
//! command: picks which plate to engage (anti-gyro face selection when the
//! target spins fast), compensates pitch for ballistics, and applies the
//! static range calibration table.

mod manual;
mod trajectory;

pub use manual::{ManualCompensator, RangeOffset};
pub use trajectory::TrajectoryCompensator;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::angles::wrap_to_pi;
use crate::tracker::{StateVector, TrackerState};

/// Gimbal actuation command. Angles are radians.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GimbalCommand {
    pub yaw: f64,
    pub pitch: f64,
    pub fire: bool,
}

/// Aim solver tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AimConfig {
    /// Muzzle speed (m/s).
    pub bullet_speed: f64,
    /// Gravitational acceleration (m/s²).
    pub gravity: f64,
    /// Linear air-resistance coefficient (1/m).
    pub resistance: f64,
    /// |v_yaw| above which anti-gyro face selection engages (rad/s).
    pub max_tracking_v_yaw: f64,
    /// Side-on face angle threshold (degrees); consumed by external
    /// collaborators beyond the gating here.
    pub side_angle: f64,
    /// Incoming-face angle threshold (rad); external concern.
    pub coming_angle: f64,
    /// Leaving-face angle threshold (rad); external concern.
    pub leaving_angle: f64,
    /// Range calibration table.
    pub manual_offsets: Vec<RangeOffset>,
}

impl Default for AimConfig {
    fn default() -> Self {
        Self {
            bullet_speed: 30.0,
            gravity: 9.82,
            resistance: 0.092,
            max_tracking_v_yaw: 60.0,
            side_angle: 15.0,
            coming_angle: 1.222,
            leaving_angle: 0.524,
            manual_offsets: Vec::new(),
        }
    }
}

/// Enumerate all plate positions around the rotation circle.
///
/// Plate `i` sits at `yaw + i·2π/n` (wrapped to (-π, π]); face heights
/// alternate by `±d_zc` for even/odd index.
pub fn face_candidates(state: &StateVector, armors_num: u32) -> Vec<(f64, Vector3<f64>)> {
    let (xc, yc, zc) = (state[0], state[2], state[4]);
    let (yaw, r, d_zc) = (state[6], state[8], state[9]);

    let n = armors_num.max(1);
    let step = 2.0 * std::f64::consts::PI / n as f64;

    (0..n)
        .map(|i| {
            let armor_yaw = wrap_to_pi(yaw + i as f64 * step);
            let dz = if i % 2 == 0 { d_zc } else { -d_zc };
            let position = Vector3::new(
                xc - r * armor_yaw.cos(),
                yc - r * armor_yaw.sin(),
                zc + dz,
            );
            (armor_yaw, position)
        })
        .collect()
}

/// Converts target estimates into gimbal commands.
pub struct AimSolver {
    config: AimConfig,
    trajectory: TrajectoryCompensator,
    manual: ManualCompensator,
}

impl AimSolver {
    pub fn new(config: AimConfig) -> Self {
        let trajectory =
            TrajectoryCompensator::new(config.bullet_speed, config.gravity, config.resistance);
        let manual = ManualCompensator::new(config.manual_offsets.clone());
        Self {
            config,
            trajectory,
            manual,
        }
    }

    pub fn config(&self) -> &AimConfig {
        &self.config
    }

    /// Produce the gimbal command for the current target estimate.
    ///
    /// Only meaningful while the tracker reports a usable estimate
    /// (TRACKING or TEMP_LOST); `fire` is asserted in TRACKING alone so a
    /// coasting prediction never triggers a shot.
    pub fn solve(
        &self,
        state: &StateVector,
        armors_num: u32,
        tracker_state: TrackerState,
    ) -> GimbalCommand {
        let aim = self.aim_point(state, armors_num);

        let pitch = self.trajectory.pitch_for(&aim);
        let yaw = aim.x.atan2(aim.z);

        let (pitch_offset, yaw_offset) = self.manual.offsets_for(aim.norm());

        GimbalCommand {
            yaw: yaw + yaw_offset,
            pitch: pitch + pitch_offset,
            fire: tracker_state == TrackerState::Tracking,
        }
    }

    /// 3D point to engage, in the camera frame.
    pub fn aim_point(&self, state: &StateVector, armors_num: u32) -> Vector3<f64> {
        if self.is_small_gyro(state[7]) {
            return self.select_best_armor(state, armors_num);
        }

        // Slow/stationary: aim straight at the face implied by the state,
        // the same formula as the EKF observation model.
        let (xc, yc, zc) = (state[0], state[2], state[4]);
        let (yaw, r, d_zc) = (state[6], state[8], state[9]);
        Vector3::new(xc - r * yaw.cos(), yc - r * yaw.sin(), zc + d_zc)
    }

    /// Fast rotation: aiming at a predicted face beats chasing the visible
    /// one.
    fn is_small_gyro(&self, v_yaw: f64) -> bool {
        v_yaw.abs() > self.config.max_tracking_v_yaw
    }

    /// Pick whichever plate is most square-on to the camera: smallest
    /// boresight angle, not smallest range.
    fn select_best_armor(&self, state: &StateVector, armors_num: u32) -> Vector3<f64> {
        let mut best = Vector3::new(state[0], state[2], state[4]);
        let mut best_angle = f64::INFINITY;

        for (_, position) in face_candidates(state, armors_num) {
            let boresight = position.x.atan2(position.z).abs();
            if boresight < best_angle {
                best_angle = boresight;
                best = position;
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn state_with(xc: f64, zc: f64, yaw: f64, v_yaw: f64, r: f64, d_zc: f64) -> StateVector {
        let mut x = StateVector::zeros();
        x[0] = xc;
        x[4] = zc;
        x[6] = yaw;
        x[7] = v_yaw;
        x[8] = r;
        x[9] = d_zc;
        x
    }

    #[test]
    fn four_armor_candidates_cover_the_circle() {
        let state = state_with(0.0, 3.0, 0.0, 0.0, 0.2, 0.0);
        let candidates = face_candidates(&state, 4);
        let mut angles: Vec<f64> = candidates.iter().map(|(a, _)| *a).collect();
        angles.sort_by(f64::total_cmp);

        let expected = [-FRAC_PI_2, 0.0, FRAC_PI_2, PI];
        for (a, e) in angles.iter().zip(expected) {
            assert_relative_eq!(*a, e, epsilon = 1e-12);
        }
    }

    #[test]
    fn candidate_heights_alternate_by_dzc() {
        let state = state_with(0.0, 3.0, 0.0, 0.0, 0.2, 0.05);
        let candidates = face_candidates(&state, 4);
        assert_relative_eq!(candidates[0].1.y, 0.05);
        assert_relative_eq!(candidates[1].1.y, -0.05);
        assert_relative_eq!(candidates[2].1.y, 0.05);
        assert_relative_eq!(candidates[3].1.y, -0.05);
    }

    #[test]
    fn small_gyro_picks_the_square_on_face() {
        let solver = AimSolver::new(AimConfig {
            max_tracking_v_yaw: 6.0,
            ..AimConfig::default()
        });
        // Spinning fast; the i=0 face (yaw 0) sits at x = -0.2, while the
        // i=1/i=3 faces are dead ahead (x = 0).
        let state = state_with(0.0, 3.0, 0.0, 12.0, 0.2, 0.0);
        let aim = solver.aim_point(&state, 4);
        assert_relative_eq!(aim.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(aim.z, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn slow_target_aims_at_observed_face() {
        let solver = AimSolver::new(AimConfig::default());
        let state = state_with(0.4, 3.0, 0.3, 0.5, 0.25, 0.02);
        let aim = solver.aim_point(&state, 4);
        assert_relative_eq!(aim.x, 0.4 - 0.25 * 0.3f64.cos(), epsilon = 1e-12);
        assert_relative_eq!(aim.y, -0.25 * 0.3f64.sin(), epsilon = 1e-12);
        assert_relative_eq!(aim.z, 3.02, epsilon = 1e-12);
    }

    #[test]
    fn fire_only_while_tracking() {
        let solver = AimSolver::new(AimConfig::default());
        let state = state_with(0.0, 3.0, 0.0, 0.0, 0.2, 0.0);

        assert!(solver.solve(&state, 4, TrackerState::Tracking).fire);
        assert!(!solver.solve(&state, 4, TrackerState::TempLost).fire);
    }

    #[test]
    fn command_yaw_points_at_aim_point() {
        let solver = AimSolver::new(AimConfig::default());
        let state = state_with(0.5, 3.0, 0.0, 0.0, 0.2, 0.0);

        let aim = solver.aim_point(&state, 4);
        let cmd = solver.solve(&state, 4, TrackerState::Tracking);
        assert_relative_eq!(cmd.yaw, aim.x.atan2(aim.z), epsilon = 1e-12);
        assert!(cmd.pitch > 0.0, "drop compensation lifts the barrel");
    }

    #[test]
    fn manual_offsets_shift_the_command() {
        let config = AimConfig {
            manual_offsets: vec![RangeOffset {
                min_distance: 0.0,
                max_distance: 10.0,
                pitch_offset: 0.03,
                yaw_offset: -0.01,
            }],
            ..AimConfig::default()
        };
        let with = AimSolver::new(config);
        let without = AimSolver::new(AimConfig::default());

        let state = state_with(0.0, 3.0, 0.0, 0.0, 0.2, 0.0);
        let a = with.solve(&state, 4, TrackerState::Tracking);
        let b = without.solve(&state, 4, TrackerState::Tracking);
        assert_relative_eq!(a.pitch - b.pitch, 0.03, epsilon = 1e-12);
        assert_relative_eq!(a.yaw - b.yaw, -0.01, epsilon = 1e-12);
    }
}
