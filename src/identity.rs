// src/identity.rs - Left/right wrist identity guard
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pose::{joint, FrameSequence, Joints, Point2D};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Extra cost a swap must save before it is taken (pixels).
    pub swap_margin: f64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { swap_margin: 2.0 }
    }
}

/// Swaps the wrists on frames where the swapped assignment is clearly
/// closer to the previous (already corrected) frame.
#[derive(Debug, Clone, Default)]
pub struct IdentityCorrector {
    config: IdentityConfig,
}

impl IdentityCorrector {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    /// Returns the corrected sequence and the number of swapped frames.
    pub fn apply(&self, input: &FrameSequence) -> (FrameSequence, usize) {
        let mut swaps = 0;
        let mut out: Vec<Joints> = Vec::with_capacity(input.len());

        for (i, frame) in input.frames.iter().enumerate() {
            let mut joints = frame.joints;
            if let Some(prev) = out.last() {
                if self.should_swap(prev, &joints) {
                    joints.swap(joint::LEFT_WRIST, joint::RIGHT_WRIST);
                    swaps += 1;
                    debug!(frame = i, "Swapped left/right wrists");
                }
            }
            out.push(joints);
        }

        (input.with_joints(out), swaps)
    }

    fn should_swap(&self, prev: &Joints, cur: &Joints) -> bool {
        let pair = |j: &Joints| -> Option<(Point2D, Point2D)> {
            Some((j.get(joint::LEFT_WRIST)?, j.get(joint::RIGHT_WRIST)?))
        };
        let (Some((pl, pr)), Some((cl, cr))) = (pair(prev), pair(cur)) else {
            return false;
        };
        let keep = cl.distance(pl) + cr.distance(pr);
        let swapped = cl.distance(pr) + cr.distance(pl);
        swapped + self.config.swap_margin < keep
    }
}
