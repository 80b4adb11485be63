// src/line_orientation.rs - Dominant edge orientation inside an image region
//
// Strong Sobel edges are subsampled on a grid and their coordinate
// covariance is decomposed; the major axis is the line orientation and the
// eigenvalue anisotropy is the confidence.
use image::{DynamicImage, GenericImageView, GrayImage};
use imageproc::gradients::sobel_gradients;
use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::wrap_orientation;
use crate::pose::Region;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineDetectorConfig {
    /// Edge pixels need at least this fraction of the strongest gradient.
    pub edge_threshold: f64,
    pub min_points: usize,
    pub max_points: usize,
    /// Radians; beyond this the detected angle is pulled toward the prior.
    pub prior_max_deviation: f64,
    pub low_confidence: f64,
    /// Fraction of the deviation removed when pulling toward the prior.
    pub prior_blend: f64,
    /// Minimum confidence reported after a prior-assisted estimate.
    pub confidence_floor: f64,
}

impl Default for LineDetectorConfig {
    fn default() -> Self {
        Self {
            edge_threshold: 0.5,
            min_points: 50,
            max_points: 3000,
            prior_max_deviation: 0.5,
            low_confidence: 0.35,
            prior_blend: 0.5,
            confidence_floor: 0.3,
        }
    }
}

/// Undirected line orientation in image coordinates (y down), in (-pi/2, pi/2].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineOrientation {
    pub angle: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LineOrientationDetector {
    config: LineDetectorConfig,
}

impl LineOrientationDetector {
    pub fn new(config: LineDetectorConfig) -> Self {
        Self { config }
    }

    /// Estimates the dominant orientation in `region` (whole image when `None`).
    /// `prior` is an undirected angle that biases weak or divergent estimates.
    /// Returns `None` when the region is empty or has too few edge pixels.
    pub fn detect(
        &self,
        image: &DynamicImage,
        region: Option<Region>,
        prior: Option<f64>,
    ) -> Option<LineOrientation> {
        let (width, height) = image.dimensions();
        let region = region.unwrap_or_else(|| Region::new(0.0, 0.0, width as f64, height as f64));
        let (x, y, w, h) = region.clamp_to(width, height, 1.0)?.pixel_bounds();
        let w = w.min(width.saturating_sub(x));
        let h = h.min(height.saturating_sub(y));
        if w < 3 || h < 3 {
            return None;
        }

        let gray = image.crop_imm(x, y, w, h).to_luma8();
        let points = self.edge_points(&gray);
        if points.len() < self.config.min_points {
            debug!(points = points.len(), "Too few edge pixels for a line estimate");
            return None;
        }

        let estimate = principal_axis(&points);
        Some(match prior {
            Some(prior) => self.apply_prior(estimate, prior),
            None => estimate,
        })
    }

    fn edge_points(&self, gray: &GrayImage) -> Vec<(f64, f64)> {
        let gradients = sobel_gradients(gray);
        let strongest = gradients.pixels().map(|p| p[0]).max().unwrap_or(0);
        if strongest == 0 {
            return Vec::new();
        }
        let threshold = self.config.edge_threshold * f64::from(strongest);
        let (w, h) = gradients.dimensions();
        let step = (w.min(h) / 80).max(1) as usize;

        let mut points = Vec::with_capacity(1024);
        'rows: for py in (0..h).step_by(step) {
            for px in (0..w).step_by(step) {
                if f64::from(gradients.get_pixel(px, py)[0]) > threshold {
                    points.push((f64::from(px), f64::from(py)));
                    if points.len() >= self.config.max_points {
                        break 'rows;
                    }
                }
            }
        }
        points
    }

    fn apply_prior(&self, estimate: LineOrientation, prior: f64) -> LineOrientation {
        let prior = wrap_orientation(prior);
        let deviation = wrap_orientation(estimate.angle - prior);
        if estimate.confidence >= self.config.low_confidence
            && deviation.abs() <= self.config.prior_max_deviation
        {
            return estimate;
        }
        LineOrientation {
            angle: wrap_orientation(prior + deviation * (1.0 - self.config.prior_blend)),
            confidence: estimate.confidence.max(self.config.confidence_floor),
        }
    }
}

fn principal_axis(points: &[(f64, f64)]) -> LineOrientation {
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    let (mx, my) = (sx / n, sy / n);

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        let (dx, dy) = (x - mx, y - my);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    let cov = Matrix2::new(sxx / n, sxy / n, sxy / n, syy / n);

    let eigen = cov.symmetric_eigen();
    let (major, minor) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    let l1 = eigen.eigenvalues[major].max(0.0);
    let l2 = eigen.eigenvalues[minor].max(0.0);
    let axis = eigen.eigenvectors.column(major);
    let confidence = if l1 + l2 > 0.0 {
        ((l1 - l2) / (l1 + l2)).clamp(0.0, 1.0)
    } else {
        0.0
    };

    LineOrientation {
        angle: wrap_orientation(axis[1].atan2(axis[0])),
        confidence,
    }
}
