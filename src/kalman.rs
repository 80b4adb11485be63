// src/kalman.rs - Constant-velocity wrist filters and the per-run filter bank
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use std::collections::HashMap;

use crate::pose::Point2D;

/// Default initial and process variances (pixels², pixels²/s²).
pub const INITIAL_POSITION_VARIANCE: f64 = 25.0;
pub const INITIAL_VELOCITY_VARIANCE: f64 = 400.0;
pub const PROCESS_POSITION_VARIANCE: f64 = 9.0;
pub const PROCESS_VELOCITY_VARIANCE: f64 = 49.0;

/// 2D position + velocity filter. State: [x, y, vx, vy].
#[derive(Debug, Clone)]
pub struct ConstantVelocityKalman2D {
    state: Vector4<f64>,
    covariance: Matrix4<f64>,
    process_noise: Matrix4<f64>,
    dt: f64,
}

impl ConstantVelocityKalman2D {
    pub fn new(initial: Point2D, dt: f64) -> Self {
        Self::with_variances(
            initial,
            dt,
            INITIAL_POSITION_VARIANCE,
            INITIAL_VELOCITY_VARIANCE,
            PROCESS_POSITION_VARIANCE,
            PROCESS_VELOCITY_VARIANCE,
        )
    }

    pub fn with_variances(
        initial: Point2D,
        dt: f64,
        position_variance: f64,
        velocity_variance: f64,
        process_position: f64,
        process_velocity: f64,
    ) -> Self {
        Self {
            state: Vector4::new(initial.x, initial.y, 0.0, 0.0),
            covariance: Matrix4::from_diagonal(&Vector4::new(
                position_variance,
                position_variance,
                velocity_variance,
                velocity_variance,
            )),
            process_noise: Matrix4::from_diagonal(&Vector4::new(
                process_position,
                process_position,
                process_velocity,
                process_velocity,
            )),
            dt,
        }
    }

    fn transition(&self) -> Matrix4<f64> {
        let mut f = Matrix4::identity();
        f[(0, 2)] = self.dt;
        f[(1, 3)] = self.dt;
        f
    }

    // H observes position only
    fn observation() -> Matrix2x4<f64> {
        Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0,
        )
    }

    /// Advances the state by one sampling interval.
    pub fn predict(&mut self) {
        let f = self.transition();
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise;
    }

    /// Standard Kalman correction with a caller-supplied isotropic measurement variance.
    /// A singular innovation covariance leaves the filter untouched.
    pub fn update(&mut self, measurement: Point2D, measurement_variance: f64) {
        let h = Self::observation();
        let z = Vector2::new(measurement.x, measurement.y);

        let innovation = z - h * self.state;
        let s = h * self.covariance * h.transpose() + Matrix2::identity() * measurement_variance;
        let Some(s_inv) = s.try_inverse() else {
            return;
        };

        let k = self.covariance * h.transpose() * s_inv;
        self.state += k * innovation;
        self.covariance = (Matrix4::identity() - k * h) * self.covariance;
    }

    pub fn current_position(&self) -> Point2D {
        Point2D::new(self.state[0], self.state[1])
    }

    pub fn velocity(&self) -> Point2D {
        Point2D::new(self.state[2], self.state[3])
    }

    /// Variance of the x position estimate.
    pub fn position_variance(&self) -> f64 {
        self.covariance[(0, 0)]
    }
}

/// Lazily created Kalman filters, one per label, owned by a single analysis run.
#[derive(Debug, Clone)]
pub struct FilterBank {
    dt: f64,
    base_variance: f64,
    speed_scale: f64,
    filters: HashMap<String, ConstantVelocityKalman2D>,
}

impl FilterBank {
    pub fn new(dt: f64, base_variance: f64, speed_scale: f64) -> Self {
        Self {
            dt,
            base_variance,
            speed_scale,
            filters: HashMap::new(),
        }
    }

    /// Measurement variance inflated with speed: faster motion trusts the measurement less.
    pub fn measurement_variance(&self, speed_hint: f64) -> f64 {
        let scale = if self.speed_scale > 0.0 {
            (speed_hint / self.speed_scale).max(1.0)
        } else {
            1.0
        };
        self.base_variance * scale
    }

    /// Predicts the labelled filter and corrects it with `measurement` when present.
    /// Returns `None` until the label has seen its first measurement.
    pub fn update(
        &mut self,
        label: &str,
        measurement: Option<Point2D>,
        speed_hint: f64,
    ) -> Option<Point2D> {
        if !self.filters.contains_key(label) {
            let initial = measurement?;
            self.filters
                .insert(label.to_string(), ConstantVelocityKalman2D::new(initial, self.dt));
        }
        let variance = self.measurement_variance(speed_hint);
        let kf = self.filters.get_mut(label)?;
        kf.predict();
        if let Some(m) = measurement {
            kf.update(m, variance);
        }
        Some(kf.current_position())
    }

    /// Drops the labelled filter; the next measurement seeds a fresh one.
    pub fn reset(&mut self, label: &str) {
        self.filters.remove(label);
    }

    pub fn get(&self, label: &str) -> Option<&ConstantVelocityKalman2D> {
        self.filters.get(label)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
