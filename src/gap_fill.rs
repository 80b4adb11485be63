// src/gap_fill.rs - Short-run linear interpolation of missing wrist samples
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pose::{FrameSequence, Joints, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GapFillConfig {
    /// Longest run of missing frames that gets interpolated.
    pub max_gap: usize,
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self { max_gap: 3 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GapFiller {
    config: GapFillConfig,
}

impl GapFiller {
    pub fn new(config: GapFillConfig) -> Self {
        Self { config }
    }

    /// Fills interior wrist gaps no longer than `max_gap`. Returns the new
    /// sequence and the number of samples written.
    pub fn apply(&self, input: &FrameSequence) -> (FrameSequence, usize) {
        let mut joints: Vec<Joints> = input.joint_maps();
        let mut filled = 0;
        for side in Side::BOTH {
            filled += self.fill_joint(&mut joints, side.wrist());
        }
        (input.with_joints(joints), filled)
    }

    fn fill_joint(&self, joints: &mut [Joints], index: usize) -> usize {
        let mut filled = 0;
        let mut last_present: Option<usize> = None;

        for i in 0..joints.len() {
            let Some(end) = joints[i].get(index) else {
                continue;
            };
            if let Some(start_idx) = last_present {
                let gap = i - start_idx - 1;
                if gap > 0 && gap <= self.config.max_gap {
                    if let Some(start) = joints[start_idx].get(index) {
                        let span = (gap + 1) as f64;
                        for k in 1..=gap {
                            let t = k as f64 / span;
                            let p = start + (end - start) * t;
                            joints[start_idx + k].set(index, Some(p));
                        }
                        filled += gap;
                        debug!(joint = index, from = start_idx, to = i, "Interpolated wrist gap");
                    }
                }
            }
            last_present = Some(i);
        }
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{joint, Frame, Point2D};
    use image::DynamicImage;
    use std::sync::Arc;

    fn wrist_track(samples: &[Option<(f64, f64)>]) -> FrameSequence {
        let image = Arc::new(DynamicImage::new_rgb8(1, 1));
        let frames = samples
            .iter()
            .map(|s| {
                let mut j = Joints::new();
                j.set(joint::LEFT_WRIST, s.map(|(x, y)| Point2D::new(x, y)));
                j.set(joint::LEFT_ELBOW, None);
                Frame::new(image.clone(), j)
            })
            .collect();
        FrameSequence::new(frames, 30.0)
    }

    #[test]
    fn midpoint_of_three_frame_gap_is_exact() {
        let input = wrist_track(&[Some((0.0, 0.0)), None, None, None, Some((10.0, 20.0))]);
        let (out, filled) = GapFiller::default().apply(&input);
        assert_eq!(filled, 3);
        assert_eq!(out.joint(2, joint::LEFT_WRIST), Some(Point2D::new(5.0, 10.0)));
        assert_eq!(out.joint(1, joint::LEFT_WRIST), Some(Point2D::new(2.5, 5.0)));
        assert_eq!(out.joint(3, joint::LEFT_WRIST), Some(Point2D::new(7.5, 15.0)));
    }

    #[test]
    fn long_gap_left_alone() {
        let input = wrist_track(&[Some((0.0, 0.0)), None, None, None, None, Some((10.0, 0.0))]);
        let (out, filled) = GapFiller::default().apply(&input);
        assert_eq!(filled, 0);
        assert!((1..5).all(|i| out.joint(i, joint::LEFT_WRIST).is_none()));
    }

    #[test]
    fn boundary_runs_left_alone() {
        let input = wrist_track(&[None, Some((1.0, 1.0)), None, Some((3.0, 3.0)), None]);
        let (out, filled) = GapFiller::default().apply(&input);
        assert_eq!(filled, 1);
        assert_eq!(out.joint(0, joint::LEFT_WRIST), None);
        assert_eq!(out.joint(2, joint::LEFT_WRIST), Some(Point2D::new(2.0, 2.0)));
        assert_eq!(out.joint(4, joint::LEFT_WRIST), None);
    }

    #[test]
    fn other_joints_untouched() {
        let input = wrist_track(&[Some((0.0, 0.0)), None, Some((2.0, 0.0))]);
        let (out, _) = GapFiller::default().apply(&input);
        assert_eq!(out.joint(1, joint::RIGHT_WRIST), None);
        assert_eq!(out.joint(1, joint::LEFT_ELBOW), None);
    }
}
