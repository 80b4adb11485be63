// src/ball.rs - Single-frame locator for a bright round object (the ball)
use image::{imageops, DynamicImage, GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::debug;

use crate::pose::Point2D;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BallDetectorConfig {
    pub grid_step: u32,
    pub angular_samples: usize,
    pub radius_step: u32,
    /// Contrast boost and unsharp mask before scoring.
    pub enhance: bool,
    pub contrast_percent: f32,
    pub sharpen_sigma: f32,
    pub sharpen_amount: f32,
}

impl Default for BallDetectorConfig {
    fn default() -> Self {
        Self {
            grid_step: 6,
            angular_samples: 24,
            radius_step: 2,
            enhance: true,
            contrast_percent: 10.0,
            sharpen_sigma: 1.6,
            sharpen_amount: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BallDetection {
    pub center: Point2D,
    pub radius: f64,
    /// Mean luminance on the winning circle, in [0, 1].
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CircularObjectDetector {
    config: BallDetectorConfig,
}

struct Candidate {
    cx: u32,
    cy: u32,
    radius: u32,
    score: f64,
    samples: usize,
}

impl CircularObjectDetector {
    pub fn new(config: BallDetectorConfig) -> Self {
        Self { config }
    }

    /// Best-scoring circle whose center lies at or below `floor` (pixels from the top).
    pub fn detect(&self, image: &DynamicImage, floor: Option<f64>) -> Option<BallDetection> {
        let gray = self.prepare(image);
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let short_side = width.min(height);
        let min_r = (short_side / 80).max(6);
        let max_r = (short_side / 30).max(10);
        let y_start = floor.map_or(0, |y| y.max(0.0).ceil() as u32);
        let grid = self.config.grid_step.max(1) as usize;
        let radius_step = self.config.radius_step.max(1) as usize;

        let mut best: Option<Candidate> = None;
        for cy in (y_start..height).step_by(grid) {
            for cx in (0..width).step_by(grid) {
                for r in (min_r..=max_r).step_by(radius_step) {
                    let (score, samples) = self.ring_score(&gray, cx, cy, r);
                    if best.as_ref().map_or(true, |b| score > b.score) {
                        best = Some(Candidate {
                            cx,
                            cy,
                            radius: r,
                            score,
                            samples,
                        });
                    }
                }
            }
        }

        let best = best?;
        let confidence = if best.samples > 0 {
            (best.score / (best.samples as f64 * 255.0)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        debug!(x = best.cx, y = best.cy, r = best.radius, confidence, "Ball candidate");
        Some(BallDetection {
            center: Point2D::new(f64::from(best.cx), f64::from(best.cy)),
            radius: f64::from(best.radius),
            confidence,
        })
    }

    fn prepare(&self, image: &DynamicImage) -> GrayImage {
        let gray = image.to_luma8();
        if !self.config.enhance {
            return gray;
        }
        let boosted = imageops::contrast(&gray, self.config.contrast_percent);
        unsharp(&boosted, self.config.sharpen_sigma, self.config.sharpen_amount)
    }

    // Summed luminance of the in-bounds samples on one circle.
    fn ring_score(&self, gray: &GrayImage, cx: u32, cy: u32, r: u32) -> (f64, usize) {
        let (width, height) = gray.dimensions();
        let n = self.config.angular_samples.max(1);
        let mut score = 0.0;
        let mut samples = 0;
        for k in 0..n {
            let theta = k as f64 * TAU / n as f64;
            let px = i64::from(cx) + (f64::from(r) * theta.cos()) as i64;
            let py = i64::from(cy) + (f64::from(r) * theta.sin()) as i64;
            if px < 0 || py < 0 || px >= i64::from(width) || py >= i64::from(height) {
                continue;
            }
            score += f64::from(gray.get_pixel(px as u32, py as u32)[0]);
            samples += 1;
        }
        (score, samples)
    }
}

fn unsharp(image: &GrayImage, sigma: f32, amount: f32) -> GrayImage {
    if sigma <= 0.0 || amount <= 0.0 {
        return image.clone();
    }
    let blurred = gaussian_blur_f32(image, sigma);
    let mut out = GrayImage::new(image.width(), image.height());
    for (x, y, p) in out.enumerate_pixels_mut() {
        let original = f32::from(image.get_pixel(x, y)[0]);
        let blur = f32::from(blurred.get_pixel(x, y)[0]);
        *p = Luma([(original + amount * (original - blur)).clamp(0.0, 255.0) as u8]);
    }
    out
}
