// src/stabilize.rs - Final speed-gated One Euro pass over the skeleton
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::one_euro::AdaptiveFilter2D;
use crate::pose::{joint, FrameSequence, Joints, Point2D, JOINT_COUNT};

/// How the wrists are treated by the final smoothing pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WristSmoothing {
    /// Wrists keep the output of the earlier stages.
    Excluded,
    /// Wrists get their own filter parameters.
    Tuned { min_cutoff: f64, beta: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizeConfig {
    pub min_cutoff: f64, // Hz
    pub beta: f64,
    pub d_cutoff: f64, // Hz
    /// Per-frame displacement (pixels) above which a sample is not smoothed.
    pub speed_bypass: f64,
    pub wrists: WristSmoothing,
}

impl Default for StabilizeConfig {
    fn default() -> Self {
        Self {
            min_cutoff: 0.7,
            beta: 0.02,
            d_cutoff: 1.0,
            speed_bypass: 45.0,
            wrists: WristSmoothing::Excluded,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StabilizationStage {
    config: StabilizeConfig,
}

impl StabilizationStage {
    pub fn new(config: StabilizeConfig) -> Self {
        Self { config }
    }

    /// Returns the smoothed sequence and the number of samples that went
    /// through a filter (frame 0 primes the filters and is not counted).
    pub fn apply(&self, input: &FrameSequence) -> (FrameSequence, usize) {
        let dt = input.dt();
        if input.len() < 2 || dt <= 0.0 {
            return (input.clone(), 0);
        }

        let mut filters: Vec<Option<AdaptiveFilter2D>> =
            (0..JOINT_COUNT).map(|idx| self.filter_for(idx, dt)).collect();

        for (idx, filter) in filters.iter_mut().enumerate() {
            if let (Some(f), Some(p)) = (filter.as_mut(), input.joint(0, idx)) {
                f.filter(p.x, p.y);
            }
        }

        let mut out: Vec<Joints> = Vec::with_capacity(input.len());
        out.push(input.frames[0].joints);
        let mut smoothed = 0;

        for i in 1..input.len() {
            let mut joints = input.frames[i].joints;
            for (idx, filter) in filters.iter_mut().enumerate() {
                let Some(f) = filter.as_mut() else { continue };
                let (Some(cur), Some(prev)) = (input.joint(i, idx), input.joint(i - 1, idx)) else {
                    continue;
                };
                if cur.distance(prev) > self.config.speed_bypass {
                    // Fast, intentional motion: keep it and restart from here.
                    f.reset();
                    f.filter(cur.x, cur.y);
                    continue;
                }
                let (x, y) = f.filter(cur.x, cur.y);
                joints.set(idx, Some(Point2D::new(x, y)));
                smoothed += 1;
            }
            out.push(joints);
        }

        info!(smoothed, "Stabilization complete");
        (input.with_joints(out), smoothed)
    }

    fn filter_for(&self, idx: usize, dt: f64) -> Option<AdaptiveFilter2D> {
        let c = &self.config;
        if idx == joint::LEFT_WRIST || idx == joint::RIGHT_WRIST {
            match c.wrists {
                WristSmoothing::Excluded => None,
                WristSmoothing::Tuned { min_cutoff, beta } => {
                    Some(AdaptiveFilter2D::new(dt, min_cutoff, beta, c.d_cutoff))
                }
            }
        } else {
            Some(AdaptiveFilter2D::new(dt, c.min_cutoff, c.beta, c.d_cutoff))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Frame;
    use image::DynamicImage;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn track(index: usize, points: &[Point2D]) -> FrameSequence {
        let image = Arc::new(DynamicImage::new_rgb8(1, 1));
        let frames = points
            .iter()
            .map(|&p| {
                Frame::new(
                    image.clone(),
                    Joints::from_pairs([
                        (index, p),
                        (joint::LEFT_WRIST, p),
                        (joint::NOSE, Point2D::new(5.0, 5.0)),
                    ]),
                )
            })
            .collect();
        FrameSequence::new(frames, 30.0)
    }

    #[test]
    fn joint_at_rest_is_unchanged() {
        let seq = track(joint::LEFT_KNEE, &[Point2D::new(10.0, 20.0); 12]);
        let (out, _) = StabilizationStage::default().apply(&seq);
        assert_eq!(out.joint_maps(), seq.joint_maps());
    }

    #[test]
    fn jitter_is_reduced() {
        let mut rng = StdRng::seed_from_u64(11);
        let truth = Point2D::new(300.0, 400.0);
        let points: Vec<Point2D> = (0..120)
            .map(|_| truth + Point2D::new(rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0)))
            .collect();
        let seq = track(joint::LEFT_HIP, &points);
        let (out, smoothed) = StabilizationStage::default().apply(&seq);
        assert!(smoothed > 0);
        let err = |s: &FrameSequence| -> f64 {
            (20..s.len())
                .map(|i| s.joint(i, joint::LEFT_HIP).unwrap().distance(truth).powi(2))
                .sum()
        };
        assert!(err(&out) < err(&seq) * 0.5, "{} vs {}", err(&out), err(&seq));
    }

    #[test]
    fn fast_steps_pass_through() {
        let points = [
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.0),
            Point2D::new(80.0, 0.0),
            Point2D::new(160.0, 0.0),
        ];
        let seq = track(joint::RIGHT_ANKLE, &points);
        let (out, _) = StabilizationStage::default().apply(&seq);
        assert_eq!(out.joint(2, joint::RIGHT_ANKLE), Some(points[2]));
        assert_eq!(out.joint(3, joint::RIGHT_ANKLE), Some(points[3]));
        assert_ne!(out.joint(1, joint::RIGHT_ANKLE), Some(points[1]));
    }

    #[test]
    fn wrists_excluded_by_default() {
        let points = [Point2D::new(0.0, 0.0), Point2D::new(4.0, 0.0), Point2D::new(8.0, 0.0)];
        let seq = track(joint::LEFT_KNEE, &points);
        let (out, _) = StabilizationStage::default().apply(&seq);
        assert_eq!(out.joint(2, joint::LEFT_WRIST), Some(points[2]));
        assert_ne!(out.joint(2, joint::LEFT_KNEE), Some(points[2]));

        let tuned = StabilizeConfig {
            wrists: WristSmoothing::Tuned { min_cutoff: 1.0, beta: 0.0 },
            ..StabilizeConfig::default()
        };
        let (out, _) = StabilizationStage::new(tuned).apply(&seq);
        assert_ne!(out.joint(2, joint::LEFT_WRIST), Some(points[2]));
    }
}
