//! Extended Kalman filter with numerically differentiated Jacobians.
//!
//! The filter is parameterized over state/observation dimensionality and
//! takes its process and measurement models as closures; Jacobians are
//! obtained by forward finite differences rather than closed-form
//! derivatives, which keeps the filter engine decoupled from the specific
//! motion/observation model.

use nalgebra::{SMatrix, SVector};

/// Perturbation step for finite-difference Jacobians.
const JACOBIAN_EPS: f64 = 1e-5;

/// State transition model: `x' = f(x, dt)`.
pub type ProcessModel<const NX: usize> =
    Box<dyn Fn(&SVector<f64, NX>, f64) -> SVector<f64, NX> + Send>;

/// Observation model: `z = h(x)`.
pub type MeasurementModel<const NX: usize, const NZ: usize> =
    Box<dyn Fn(&SVector<f64, NX>) -> SVector<f64, NZ> + Send>;

/// Innovation post-processing, e.g. wrapping angular residual components
/// into (-π, π]. Unwrapped angle residuals silently corrupt the filter.
pub type ResidualNormalizer<const NZ: usize> =
    Box<dyn Fn(SVector<f64, NZ>) -> SVector<f64, NZ> + Send>;

/// Extended Kalman filter over an `NX`-dimensional state and
/// `NZ`-dimensional observation.
pub struct ExtendedKalmanFilter<const NX: usize, const NZ: usize> {
    f: ProcessModel<NX>,
    h: MeasurementModel<NX, NZ>,
    normalize_residual: ResidualNormalizer<NZ>,
    x: SVector<f64, NX>,
    p: SMatrix<f64, NX, NX>,
    q: SMatrix<f64, NX, NX>,
    r: SMatrix<f64, NZ, NZ>,
    initialized: bool,
}

impl<const NX: usize, const NZ: usize> ExtendedKalmanFilter<NX, NZ> {
    pub fn new(
        f: ProcessModel<NX>,
        h: MeasurementModel<NX, NZ>,
        normalize_residual: ResidualNormalizer<NZ>,
    ) -> Self {
        Self {
            f,
            h,
            normalize_residual,
            x: SVector::zeros(),
            p: SMatrix::identity(),
            q: SMatrix::identity(),
            r: SMatrix::identity(),
            initialized: false,
        }
    }

    /// Set process and observation noise covariances.
    pub fn set_noise(&mut self, q: SMatrix<f64, NX, NX>, r: SMatrix<f64, NZ, NZ>) {
        self.q = q;
        self.r = r;
    }

    /// (Re-)initialize the state estimate. Covariance resets to 0.1·I.
    pub fn init(&mut self, x0: SVector<f64, NX>) {
        self.x = x0;
        self.p = SMatrix::identity() * 0.1;
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Current state estimate.
    pub fn state(&self) -> SVector<f64, NX> {
        self.x
    }

    /// Predicted observation for the current state estimate.
    pub fn predicted_observation(&self) -> SVector<f64, NZ> {
        (self.h)(&self.x)
    }

    /// Propagate the state and covariance forward by `dt`.
    ///
    /// A no-op returning the current (zero) state before initialization.
    pub fn predict(&mut self, dt: f64) -> SVector<f64, NX> {
        if !self.initialized {
            return self.x;
        }

        let f_jac = self.process_jacobian(dt);
        self.x = (self.f)(&self.x, dt);
        self.p = f_jac * self.p * f_jac.transpose() + self.q;
        self.x
    }

    /// Fuse an observation into the state estimate.
    ///
    /// Covariance is updated in Joseph form for numerical stability
    /// against indefiniteness.
    pub fn update(&mut self, z: &SVector<f64, NZ>) -> SVector<f64, NX> {
        if !self.initialized {
            return self.x;
        }

        let h_jac = self.measurement_jacobian();
        let innovation = (self.normalize_residual)(z - (self.h)(&self.x));

        let s = h_jac * self.p * h_jac.transpose() + self.r;
        let Some(s_inv) = s.try_inverse() else {
            tracing::warn!("singular innovation covariance, skipping update");
            return self.x;
        };
        let k = self.p * h_jac.transpose() * s_inv;

        self.x += k * innovation;

        let ikh = SMatrix::<f64, NX, NX>::identity() - k * h_jac;
        self.p = ikh * self.p * ikh.transpose() + k * self.r * k.transpose();
        self.x
    }

    /// Forward-difference Jacobian of the process model at the current
    /// state.
    fn process_jacobian(&self, dt: f64) -> SMatrix<f64, NX, NX> {
        let f0 = (self.f)(&self.x, dt);
        let mut jac = SMatrix::<f64, NX, NX>::zeros();
        for i in 0..NX {
            let mut perturbed = self.x;
            perturbed[i] += JACOBIAN_EPS;
            let fi = (self.f)(&perturbed, dt);
            jac.set_column(i, &((fi - f0) / JACOBIAN_EPS));
        }
        jac
    }

    /// Forward-difference Jacobian of the observation model at the current
    /// state.
    fn measurement_jacobian(&self) -> SMatrix<f64, NZ, NX> {
        let h0 = (self.h)(&self.x);
        let mut jac = SMatrix::<f64, NZ, NX>::zeros();
        for i in 0..NX {
            let mut perturbed = self.x;
            perturbed[i] += JACOBIAN_EPS;
            let hi = (self.h)(&perturbed);
            jac.set_column(i, &((hi - h0) / JACOBIAN_EPS));
        }
        jac
    }
}
