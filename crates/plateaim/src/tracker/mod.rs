//! Temporal fusion of per-frame armor detections into one persistent
//! rotating-target estimate.
//!
//! A four-state lifecycle gates the filter: LOST (no target), DETECTING
//! (candidate seen, building confidence), TRACKING (confirmed lock),
//! TEMP_LOST (lock coasting on prediction). The underlying estimator is a
//! 10-state EKF over the rotation center of a rigid multi-plate target;
//! the observed plate is the point on the rotation circle currently facing
//! the camera.

mod ekf;

pub use ekf::ExtendedKalmanFilter;

use nalgebra::{SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::angles::{angle_distance, wrap_to_pi};
use crate::detector::{Armor, ArmorPose};

/// EKF state layout: `[xc, v_xc, yc, v_yc, zc, v_zc, yaw, v_yaw, r, d_zc]`.
pub const STATE_DIM: usize = 10;
/// Observation layout: `[x_armor, y_armor, z_armor, yaw_armor]`.
pub const OBS_DIM: usize = 4;

pub type StateVector = SVector<f64, STATE_DIM>;
pub type Observation = SVector<f64, OBS_DIM>;

/// Rotation-radius seed used when (re-)initializing on a fresh target.
const INITIAL_RADIUS: f64 = 0.2;

/// Tracker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    Lost,
    Detecting,
    Tracking,
    TempLost,
}

impl TrackerState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Lost => "LOST",
            Self::Detecting => "DETECTING",
            Self::Tracking => "TRACKING",
            Self::TempLost => "TEMP_LOST",
        }
    }

    /// True while the estimate is usable downstream (TRACKING or
    /// TEMP_LOST).
    pub fn is_tracking(self) -> bool {
        matches!(self, Self::Tracking | Self::TempLost)
    }
}

/// State machine and association gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum position distance (m) for associating a detection with the
    /// predicted plate.
    pub max_match_distance: f64,
    /// Maximum wrapped yaw difference (rad) for association.
    pub max_match_yaw_diff: f64,
    /// Consecutive matched frames required to confirm DETECTING → TRACKING.
    pub tracking_threshold: u32,
    /// Seconds of unmatched frames tolerated before dropping to LOST.
    pub lost_time_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_match_distance: 0.5,
            max_match_yaw_diff: 0.67,
            tracking_threshold: 3,
            lost_time_threshold: 3.05,
        }
    }
}

/// EKF noise variances, grouped by state component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EkfConfig {
    /// Process variance for xc / v_xc.
    pub sigma2_q_x: f64,
    /// Process variance for yc / v_yc.
    pub sigma2_q_y: f64,
    /// Process variance for zc / v_zc (also d_zc).
    pub sigma2_q_z: f64,
    /// Process variance for yaw / v_yaw.
    pub sigma2_q_yaw: f64,
    /// Process variance for the rotation radius.
    pub sigma2_q_r: f64,
    /// Observation variance, armor x.
    pub r_x: f64,
    /// Observation variance, armor y.
    pub r_y: f64,
    /// Observation variance, armor z.
    pub r_z: f64,
    /// Observation variance, armor yaw.
    pub r_yaw: f64,
}

impl Default for EkfConfig {
    fn default() -> Self {
        Self {
            sigma2_q_x: 0.008,
            sigma2_q_y: 0.008,
            sigma2_q_z: 0.008,
            sigma2_q_yaw: 1.30,
            sigma2_q_r: 98.0,
            r_x: 0.0005,
            r_y: 0.0005,
            r_z: 0.0005,
            r_yaw: 0.005,
        }
    }
}

/// Per-frame target record emitted to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub tracking: bool,
    pub id: String,
    pub armors_num: u32,
    /// Rotation-center position (m).
    pub position: Vector3<f64>,
    /// Rotation-center velocity (m/s).
    pub velocity: Vector3<f64>,
    /// Yaw of the currently observed face (rad).
    pub yaw: f64,
    /// Angular rate (rad/s).
    pub v_yaw: f64,
    /// Rotation radius of the observed face (m).
    pub radius_1: f64,
    /// Reserved second radius; never populated by this tracker.
    pub radius_2: f64,
    /// Height offset of the alternate face set (m).
    pub d_zc: f64,
}

impl Target {
    fn not_tracking() -> Self {
        Self {
            tracking: false,
            id: String::new(),
            armors_num: 0,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            yaw: 0.0,
            v_yaw: 0.0,
            radius_1: 0.0,
            radius_2: 0.0,
            d_zc: 0.0,
        }
    }
}

/// Constant-velocity + constant-angular-rate process model. r and d_zc are
/// stationary between updates.
fn predict_model(x: &StateVector, dt: f64) -> StateVector {
    let mut x1 = *x;
    x1[0] += x[1] * dt;
    x1[2] += x[3] * dt;
    x1[4] += x[5] * dt;
    x1[6] += x[7] * dt;
    x1
}

/// Observation model: the observed plate is the point on the rotation
/// circle currently facing outward.
fn measure_model(x: &StateVector) -> Observation {
    Observation::new(
        x[0] - x[6].cos() * x[8],
        x[2] - x[6].sin() * x[8],
        x[4] + x[9],
        x[6],
    )
}

fn normalize_residual(mut residual: Observation) -> Observation {
    residual[3] = wrap_to_pi(residual[3]);
    residual
}

/// One tracker per tracked physical target; owns the EKF exclusively.
pub struct Tracker {
    config: TrackerConfig,
    ekf: ExtendedKalmanFilter<STATE_DIM, OBS_DIM>,
    state: TrackerState,
    tracked_id: String,
    target_armors_num: u32,
    detect_count: u32,
    lost_count: u32,
    lost_time: f64,
}

impl Tracker {
    pub fn new(config: TrackerConfig, ekf_config: &EkfConfig) -> Self {
        let mut ekf = ExtendedKalmanFilter::new(
            Box::new(predict_model),
            Box::new(measure_model),
            Box::new(normalize_residual),
        );

        let mut q = SMatrix::<f64, STATE_DIM, STATE_DIM>::identity();
        q[(0, 0)] = ekf_config.sigma2_q_x;
        q[(1, 1)] = ekf_config.sigma2_q_x;
        q[(2, 2)] = ekf_config.sigma2_q_y;
        q[(3, 3)] = ekf_config.sigma2_q_y;
        q[(4, 4)] = ekf_config.sigma2_q_z;
        q[(5, 5)] = ekf_config.sigma2_q_z;
        q[(6, 6)] = ekf_config.sigma2_q_yaw;
        q[(7, 7)] = ekf_config.sigma2_q_yaw;
        q[(8, 8)] = ekf_config.sigma2_q_r;
        q[(9, 9)] = ekf_config.sigma2_q_z;

        let mut r = SMatrix::<f64, OBS_DIM, OBS_DIM>::identity();
        r[(0, 0)] = ekf_config.r_x;
        r[(1, 1)] = ekf_config.r_y;
        r[(2, 2)] = ekf_config.r_z;
        r[(3, 3)] = ekf_config.r_yaw;

        ekf.set_noise(q, r);

        Self {
            config,
            ekf,
            state: TrackerState::Lost,
            tracked_id: String::new(),
            target_armors_num: 4,
            detect_count: 0,
            lost_count: 0,
            lost_time: 0.0,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn tracked_id(&self) -> &str {
        &self.tracked_id
    }

    /// Number of plates mounted on the tracked target. A domain fact keyed
    /// by the classification id, not inferred from data.
    pub fn target_armors_num(&self) -> u32 {
        self.target_armors_num
    }

    /// Current EKF state vector.
    pub fn state_vector(&self) -> StateVector {
        self.ekf.state()
    }

    /// Fuse one frame of posed detections. Armors without a recovered pose
    /// contribute nothing.
    pub fn update(&mut self, armors: &[Armor], dt: f64) {
        // Predict runs before the state switch, in the coasting states only.
        if matches!(self.state, TrackerState::Tracking | TrackerState::TempLost) {
            self.ekf.predict(dt);
        }

        let posed: Vec<(&Armor, &ArmorPose)> = armors
            .iter()
            .filter_map(|a| a.pose.as_ref().map(|p| (a, p)))
            .collect();
        let detected = !posed.is_empty();
        let previous = self.state;

        match self.state {
            TrackerState::Lost => {
                if detected {
                    let (armor, pose) = posed[0];
                    self.init_ekf(pose);
                    self.tracked_id = armor.number.clone();
                    self.state = TrackerState::Detecting;
                    self.detect_count = 1;
                }
            }

            TrackerState::Detecting => {
                if detected {
                    if let Some(idx) = self.match_armor(&posed) {
                        self.ekf.update(&observation_of(posed[idx].1));
                        self.detect_count += 1;
                        if self.detect_count >= self.config.tracking_threshold {
                            self.state = TrackerState::Tracking;
                        }
                    } else {
                        // Unmatched: treat as a new target.
                        let (armor, pose) = posed[0];
                        self.init_ekf(pose);
                        self.tracked_id = armor.number.clone();
                        self.detect_count = 1;
                    }
                } else {
                    self.state = TrackerState::Lost;
                    self.detect_count = 0;
                }
            }

            TrackerState::Tracking => {
                let matched = detected.then(|| self.match_armor(&posed)).flatten();
                if let Some(idx) = matched {
                    self.ekf.update(&observation_of(posed[idx].1));
                    self.lost_count = 0;
                    self.lost_time = 0.0;
                } else {
                    self.lost_count += 1;
                    self.lost_time += dt;
                    self.state = if self.lost_time > self.config.lost_time_threshold {
                        TrackerState::Lost
                    } else {
                        TrackerState::TempLost
                    };
                }
            }

            TrackerState::TempLost => {
                if detected {
                    if let Some(idx) = self.match_armor(&posed) {
                        self.ekf.update(&observation_of(posed[idx].1));
                        self.state = TrackerState::Tracking;
                        self.lost_count = 0;
                        self.lost_time = 0.0;
                    }
                    // Detected but unmatched: the lost clock deliberately
                    // does not advance on this path.
                } else {
                    self.lost_time += dt;
                    if self.lost_time > self.config.lost_time_threshold {
                        self.state = TrackerState::Lost;
                    }
                }
            }
        }

        if self.state != previous {
            tracing::debug!(
                "tracker {} -> {} (id={})",
                previous.label(),
                self.state.label(),
                self.tracked_id
            );
        }

        self.target_armors_num = armors_num_for_id(&self.tracked_id);
    }

    /// Build the per-frame target record.
    pub fn target(&self) -> Target {
        if !self.state.is_tracking() {
            return Target::not_tracking();
        }

        let x = self.ekf.state();
        Target {
            tracking: true,
            id: self.tracked_id.clone(),
            armors_num: self.target_armors_num,
            position: Vector3::new(x[0], x[2], x[4]),
            velocity: Vector3::new(x[1], x[3], x[5]),
            yaw: x[6],
            v_yaw: x[7],
            radius_1: x[8],
            radius_2: 0.0,
            d_zc: x[9],
        }
    }

    fn init_ekf(&mut self, pose: &ArmorPose) {
        let mut x0 = StateVector::zeros();
        x0[0] = pose.position.x;
        x0[2] = pose.position.y;
        x0[4] = pose.position.z;
        x0[6] = pose.yaw;
        x0[8] = INITIAL_RADIUS;
        self.ekf.init(x0);
    }

    /// Associate the predicted plate observation with the closest
    /// detection inside the distance and yaw gates.
    fn match_armor(&self, posed: &[(&Armor, &ArmorPose)]) -> Option<usize> {
        let predicted = self.ekf.predicted_observation();

        let mut best: Option<(usize, f64)> = None;
        for (i, (_, pose)) in posed.iter().enumerate() {
            let dx = pose.position.x - predicted[0];
            let dy = pose.position.y - predicted[1];
            let dz = pose.position.z - predicted[2];
            let dist = (dx * dx + dy * dy + dz * dz).sqrt();
            let yaw_diff = angle_distance(pose.yaw, predicted[3]);

            if dist < self.config.max_match_distance
                && yaw_diff < self.config.max_match_yaw_diff
                && best.map_or(true, |(_, d)| dist < d)
            {
                best = Some((i, dist));
            }
        }

        best.map(|(i, _)| i)
    }
}

fn observation_of(pose: &ArmorPose) -> Observation {
    Observation::new(pose.position.x, pose.position.y, pose.position.z, pose.yaw)
}

fn armors_num_for_id(id: &str) -> u32 {
    match id {
        "1" | "hero" => 2,
        "sentry" | "outpost" => 3,
        _ => 4,
    }
}
