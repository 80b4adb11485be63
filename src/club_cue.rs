// src/club_cue.rs - Nudges wrists along the club shaft around impact
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::line_orientation::{LineDetectorConfig, LineOrientationDetector};
use crate::pose::{FrameSequence, Joints, Point2D, Region, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClubCueConfig {
    /// Frames examined on each side of the impact frame.
    pub window: usize,
    pub roi_radius: f64,
    pub min_confidence: f64,
    /// Distance both wrists are moved along the shaft (pixels).
    pub nudge: f64,
    pub line: LineDetectorConfig,
}

impl Default for ClubCueConfig {
    fn default() -> Self {
        Self {
            window: 2,
            roi_radius: 120.0,
            min_confidence: 0.25,
            nudge: 4.0,
            line: LineDetectorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClubCueReport {
    /// Frame with the largest single-frame wrist displacement.
    pub impact_frame: Option<usize>,
    pub nudged_frames: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ClubCueStage {
    config: ClubCueConfig,
    detector: LineOrientationDetector,
}

impl ClubCueStage {
    pub fn new(config: ClubCueConfig) -> Self {
        let detector = LineOrientationDetector::new(config.line.clone());
        Self { config, detector }
    }

    pub fn apply(&self, input: &FrameSequence) -> (FrameSequence, ClubCueReport) {
        let mut report = ClubCueReport {
            impact_frame: impact_frame(input),
            ..ClubCueReport::default()
        };
        let Some(impact) = report.impact_frame else {
            return (input.clone(), report);
        };

        let mut joints: Vec<Joints> = input.joint_maps();
        let start = impact.saturating_sub(self.config.window);
        let end = (impact + self.config.window).min(input.len().saturating_sub(1));

        for i in start..=end {
            let frame = &mut joints[i];
            let wrists = (frame.get(Side::Left.wrist()), frame.get(Side::Right.wrist()));
            let (Some(lw), Some(rw)) = wrists else {
                continue;
            };
            let forearm = forearm_direction(frame);
            let prior = forearm.map(|d| d.y.atan2(d.x));
            let roi = Region::centered(lw.midpoint(rw), self.config.roi_radius);

            let Some(line) = self.detector.detect(input.frames[i].image(), Some(roi), prior) else {
                continue;
            };
            if line.confidence <= self.config.min_confidence {
                debug!(frame = i, confidence = line.confidence, "Club line too weak");
                continue;
            }

            let mut dir = Point2D::new(line.angle.cos(), line.angle.sin());
            // Orient the undirected shaft line the way the forearms point.
            if forearm.is_some_and(|f| f.dot(dir) < 0.0) {
                dir = dir * -1.0;
            }
            let pull = dir * self.config.nudge;
            frame.set(Side::Left.wrist(), Some(lw + pull));
            frame.set(Side::Right.wrist(), Some(rw + pull));
            report.nudged_frames.push(i);
        }

        info!(impact, nudged = report.nudged_frames.len(), "Club cue complete");
        (input.with_joints(joints), report)
    }
}

/// Frame index of the largest single-frame displacement of either wrist.
pub fn impact_frame(seq: &FrameSequence) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for side in Side::BOTH {
        for (i, step) in seq.step_lengths(side.wrist()).into_iter().enumerate() {
            let Some(step) = step else { continue };
            if best.map_or(true, |(_, s)| step > s) {
                best = Some((i, step));
            }
        }
    }
    best.map(|(i, _)| i)
}

// Sum of the unit elbow->wrist vectors of both arms.
fn forearm_direction(joints: &Joints) -> Option<Point2D> {
    let sum = Side::BOTH
        .iter()
        .filter_map(|side| {
            crate::geometry::unit(joints.get(side.elbow())?, joints.get(side.wrist())?)
        })
        .fold(Point2D::default(), |acc, u| acc + u);
    (sum.norm() > crate::geometry::MIN_LENGTH).then_some(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_orientation::tests::line_image;
    use crate::pose::{joint, Frame};
    use approx::assert_abs_diff_eq;
    use image::DynamicImage;
    use std::f64::consts::FRAC_PI_4;
    use std::sync::Arc;

    fn arms(lw: Point2D, rw: Point2D) -> Joints {
        Joints::from_pairs([
            (joint::LEFT_WRIST, lw),
            (joint::RIGHT_WRIST, rw),
            (joint::LEFT_ELBOW, lw + Point2D::new(-30.0, -30.0)),
            (joint::RIGHT_ELBOW, rw + Point2D::new(-30.0, -30.0)),
        ])
    }

    #[test]
    fn impact_tracks_right_wrist_too() {
        let image = Arc::new(DynamicImage::new_rgb8(8, 8));
        let lefts = [0.0, 5.0, 10.0, 15.0, 20.0];
        let rights = [0.0, 5.0, 10.0, 60.0, 65.0];
        let frames = lefts
            .iter()
            .zip(rights)
            .map(|(&l, r)| {
                Frame::new(image.clone(), arms(Point2D::new(l, 0.0), Point2D::new(r, 50.0)))
            })
            .collect();
        assert_eq!(impact_frame(&FrameSequence::new(frames, 20.0)), Some(3));
    }

    #[test]
    fn impact_needs_two_samples() {
        let image = Arc::new(DynamicImage::new_rgb8(8, 8));
        let seq = FrameSequence::new(vec![Frame::new(image, Joints::new())], 20.0);
        assert_eq!(impact_frame(&seq), None);
        let (out, report) = ClubCueStage::default().apply(&seq);
        assert!(report.nudged_frames.is_empty());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn wrists_nudged_along_shaft_near_impact() {
        let shaft = Arc::new(line_image(400, 200.0, 200.0, FRAC_PI_4, 4.0));
        let blank = Arc::new(DynamicImage::new_rgb8(400, 400));
        // Wrists descend slowly, then jump at frame 4.
        let ys = [100.0, 104.0, 108.0, 112.0, 170.0, 174.0, 178.0, 182.0];
        let frames: Vec<Frame> = ys
            .iter()
            .enumerate()
            .map(|(i, &y)| {
                let image = if (2..=6).contains(&i) { shaft.clone() } else { blank.clone() };
                Frame::new(image, arms(Point2D::new(y - 10.0, y), Point2D::new(y + 10.0, y)))
            })
            .collect();
        let seq = FrameSequence::new(frames, 20.0);

        let (out, report) = ClubCueStage::default().apply(&seq);
        assert_eq!(report.impact_frame, Some(4));
        assert_eq!(report.nudged_frames, vec![2, 3, 4, 5, 6]);

        let step = 4.0 * FRAC_PI_4.cos();
        let before = seq.joint(4, joint::LEFT_WRIST).unwrap();
        let after = out.joint(4, joint::LEFT_WRIST).unwrap();
        // Forearms point down-right, so the nudge does too.
        assert_abs_diff_eq!(after.x - before.x, step, epsilon = 0.2);
        assert_abs_diff_eq!(after.y - before.y, step, epsilon = 0.2);
        assert_eq!(out.joint(1, joint::LEFT_WRIST), seq.joint(1, joint::LEFT_WRIST));
        assert_eq!(out.joint(7, joint::RIGHT_WRIST), seq.joint(7, joint::RIGHT_WRIST));
    }
}
