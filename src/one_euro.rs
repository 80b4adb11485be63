//! One Euro filter: adaptive low-pass smoothing for keypoint jitter.
//!
//! Smooth when a joint is still, responsive when it moves fast. The cutoff
//! frequency rises with the filtered derivative of the input.

use std::f64::consts::PI;

/// Single-scalar One Euro filter sampled at a fixed interval.
#[derive(Debug, Clone)]
pub struct AdaptiveFilter1D {
    dt: f64,
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    last: f64,
    last_velocity: f64,
    initialized: bool,
}

impl AdaptiveFilter1D {
    pub fn new(dt: f64, min_cutoff: f64, beta: f64) -> Self {
        Self::with_derivative_cutoff(dt, min_cutoff, beta, 1.0)
    }

    pub fn with_derivative_cutoff(dt: f64, min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        Self {
            dt,
            min_cutoff,
            beta,
            d_cutoff,
            last: 0.0,
            last_velocity: 0.0,
            initialized: false,
        }
    }

    /// Smoothing factor for a first-order low-pass at `cutoff` Hz.
    fn smoothing(&self, cutoff: f64) -> f64 {
        let r = 2.0 * PI * cutoff * self.dt;
        r / (r + 1.0)
    }

    /// Filters one sample. The first sample is returned unchanged and
    /// becomes the initial state.
    pub fn filter(&mut self, x: f64) -> f64 {
        if !self.initialized || self.dt <= 0.0 {
            self.initialized = true;
            self.last = x;
            self.last_velocity = 0.0;
            return x;
        }

        let dx = (x - self.last) / self.dt;
        let velocity = lerp(self.last_velocity, dx, self.smoothing(self.d_cutoff));
        let cutoff = self.min_cutoff + self.beta * velocity.abs();
        let y = lerp(self.last, x, self.smoothing(cutoff));

        self.last = y;
        self.last_velocity = velocity;
        y
    }

    /// Drops the state; the next sample re-initializes the filter.
    pub fn reset(&mut self) {
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

// a + (b - a) * t keeps a constant input exact: b == a adds zero.
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Pair of filters for one 2D joint.
#[derive(Debug, Clone)]
pub struct AdaptiveFilter2D {
    pub x: AdaptiveFilter1D,
    pub y: AdaptiveFilter1D,
}

impl AdaptiveFilter2D {
    pub fn new(dt: f64, min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        Self {
            x: AdaptiveFilter1D::with_derivative_cutoff(dt, min_cutoff, beta, d_cutoff),
            y: AdaptiveFilter1D::with_derivative_cutoff(dt, min_cutoff, beta, d_cutoff),
        }
    }

    pub fn filter(&mut self, x: f64, y: f64) -> (f64, f64) {
        (self.x.filter(x), self.y.filter(y))
    }

    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_passes_through() {
        let mut f = AdaptiveFilter1D::new(1.0 / 20.0, 0.7, 0.02);
        assert_eq!(f.filter(42.5), 42.5);
    }

    #[test]
    fn constant_input_is_returned_exactly() {
        let mut f = AdaptiveFilter1D::new(1.0 / 60.0, 0.7, 0.02);
        f.filter(13.25);
        for _ in 0..50 {
            assert_eq!(f.filter(13.25), 13.25);
        }
    }

    #[test]
    fn step_response_lags_then_converges() {
        let mut f = AdaptiveFilter1D::new(1.0 / 30.0, 0.7, 0.02);
        f.filter(0.0);
        let first = f.filter(10.0);
        assert!(first > 0.0 && first < 10.0, "got {first}");
        let mut last = first;
        for _ in 0..300 {
            last = f.filter(10.0);
        }
        assert!((last - 10.0).abs() < 1e-3, "got {last}");
    }

    #[test]
    fn faster_motion_raises_cutoff() {
        // Same step size, larger beta => less lag.
        let mut slow = AdaptiveFilter1D::new(1.0 / 30.0, 0.7, 0.0);
        let mut fast = AdaptiveFilter1D::new(1.0 / 30.0, 0.7, 0.5);
        slow.filter(0.0);
        fast.filter(0.0);
        assert!(fast.filter(20.0) > slow.filter(20.0));
    }

    #[test]
    fn reset_reinitializes() {
        let mut f = AdaptiveFilter1D::new(1.0 / 30.0, 0.7, 0.02);
        f.filter(0.0);
        f.filter(5.0);
        f.reset();
        assert!(!f.is_initialized());
        assert_eq!(f.filter(100.0), 100.0);
    }
}
