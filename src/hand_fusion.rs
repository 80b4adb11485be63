// src/hand_fusion.rs - Wrist refinement from the auxiliary hand-landmark detector
//
// Slow wrists are re-anchored on the palm center reported by the hand model,
// under forearm-length and wrist-separation safeguards. Fast wrists pass
// through: the narrow region query is unreliable once the hand blurs.
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::detector::HandEstimator;
use crate::geometry::{self, MIN_LENGTH};
use crate::kalman::FilterBank;
use crate::pose::{joint, FrameSequence, Joints, Point2D, Region, Side};

/// Regions thinner than this after clamping are not worth a detector call.
const MIN_ROI_SIDE: f64 = 4.0;

/// A wrist counts as moved by fusion beyond this distance (pixels).
const FUSED_MOVE_THRESHOLD: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Anchor correction (anchor minus wrist) averaged per wrist and
    /// applied on top of the moving wrist.
    Ema,
    /// Kalman-corrected anchor written straight into the wrist.
    Kalman,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub mode: FusionMode,
    pub speed_bypass: f64,         // px/s, at or above this the wrist is left alone
    pub roi_radius: f64,           // half-size of the detector query square
    pub accept_radius: f64,        // anchor must be strictly closer than this to the wrist
    pub min_direction_cosine: f64, // elbow->wrist vs elbow->anchor
    pub inward_slack: f64,
    pub other_elbow_slack: f64,
    pub other_wrist_slack: f64,
    pub forearm_min_ratio: f64,
    pub forearm_max_ratio: f64,
    pub blend_min_ratio: f64,
    pub blend_max_ratio: f64,
    pub alpha_slow: f64,
    pub alpha_moderate: f64,
    pub slow_speed: f64, // px/s boundary between the two alphas
    pub max_step: f64,   // per-axis blend step limit
    pub gain_floor: f64, // lowest averaging gain once a slow stretch runs long
    pub top_closeness: f64,
    pub address_closeness: f64,
    pub collapse_ratio: f64,
    pub expand_ratio: f64,
    pub base_variance: f64,
    pub variance_speed_scale: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            mode: FusionMode::Ema,
            speed_bypass: 130.0,
            roi_radius: 72.0,
            accept_radius: 40.0,
            min_direction_cosine: 0.6,
            inward_slack: 4.0,
            other_elbow_slack: 8.0,
            other_wrist_slack: 6.0,
            forearm_min_ratio: 0.8,
            forearm_max_ratio: 1.25,
            blend_min_ratio: 0.95,
            blend_max_ratio: 1.08,
            alpha_slow: 0.35,
            alpha_moderate: 0.15,
            slow_speed: 70.0,
            max_step: 8.0,
            gain_floor: 0.05,
            top_closeness: 0.4,
            address_closeness: 0.5,
            collapse_ratio: 0.95,
            expand_ratio: 0.98,
            base_variance: 9.0,
            variance_speed_scale: 80.0,
        }
    }
}

impl FusionConfig {
    /// Tighter constants used with [`FusionMode::Kalman`].
    pub fn kalman_variant() -> Self {
        Self {
            mode: FusionMode::Kalman,
            speed_bypass: 120.0,
            roi_radius: 64.0,
            accept_radius: 44.0,
            base_variance: 14.0,
            variance_speed_scale: 70.0,
            ..Self::default()
        }
    }
}

/// What happened to one wrist on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WristOutcome {
    Bypassed,
    MissingJoints,
    AmbiguousPose,
    NoDetections,
    AllRejected,
    Fused,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FusionReport {
    /// False when no hand model was available and the stage passed through.
    pub model_available: bool,
    /// `[left, right]` outcome per frame.
    pub outcomes: Vec<[WristOutcome; 2]>,
    /// Frames where the crossing/collapse guard replaced the fused wrists.
    pub guard_frames: Vec<usize>,
    /// Frames where either wrist moved by more than 0.75 px.
    pub fused_frames: usize,
}

impl FusionReport {
    pub fn count(&self, outcome: WristOutcome) -> usize {
        self.outcomes
            .iter()
            .flat_map(|pair| pair.iter())
            .filter(|&&o| o == outcome)
            .count()
    }
}

// Sequence-wide reference lengths, computed once on the stage input.
struct Medians {
    forearm: [f64; 2],
    separation: f64,
}

impl Medians {
    fn compute(seq: &FrameSequence) -> Self {
        let forearm = Side::BOTH.map(|side| {
            let lengths: Vec<f64> = seq
                .frames
                .iter()
                .filter_map(|f| {
                    Some(f.joints.get(side.wrist())?.distance(f.joints.get(side.elbow())?))
                })
                .collect();
            geometry::median(&lengths)
        });
        let separations: Vec<f64> = seq
            .frames
            .iter()
            .filter_map(|f| {
                Some(f.joints.get(joint::LEFT_WRIST)?.distance(f.joints.get(joint::RIGHT_WRIST)?))
            })
            .collect();
        Self {
            forearm,
            separation: geometry::median(&separations).max(1.0),
        }
    }

    fn forearm(&self, side: Side) -> f64 {
        self.forearm[side_slot(side)]
    }
}

// Running average of the anchor-minus-wrist correction for one wrist.
// Restarted from zero whenever the wrist was not fused on the previous frame.
#[derive(Debug, Clone, Copy, Default)]
struct CorrectionAverage {
    offset: Point2D,
    samples: u32,
}

fn side_slot(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

pub struct HandFusionStage<'a> {
    config: FusionConfig,
    estimator: Option<&'a dyn HandEstimator>,
}

impl<'a> HandFusionStage<'a> {
    pub fn new(config: FusionConfig, estimator: Option<&'a dyn HandEstimator>) -> Self {
        Self { config, estimator }
    }

    pub fn apply(&self, input: &FrameSequence) -> (FrameSequence, FusionReport) {
        let mut report = FusionReport {
            model_available: self.estimator.is_some(),
            ..FusionReport::default()
        };
        let Some(estimator) = self.estimator else {
            debug!("No hand model, wrist fusion skipped");
            return (input.clone(), report);
        };
        let dt = input.dt();
        if dt <= 0.0 || input.is_empty() {
            return (input.clone(), report);
        }

        let medians = Medians::compute(input);
        let speeds: [Vec<f64>; 2] = Side::BOTH.map(|side| {
            input
                .step_lengths(side.wrist())
                .into_iter()
                .map(|step| step.map_or(0.0, |s| s / dt))
                .collect()
        });

        let mut bank =
            FilterBank::new(dt, self.config.base_variance, self.config.variance_speed_scale);
        let mut corrections = [CorrectionAverage::default(); 2];
        let mut fused_last_frame = [false; 2];
        let mut out: Vec<Joints> = Vec::with_capacity(input.len());

        for (i, frame) in input.frames.iter().enumerate() {
            let speed = [speeds[0][i], speeds[1][i]];
            let active = speed.map(|s| s < self.config.speed_bypass);
            let mut outcomes = [WristOutcome::Bypassed; 2];

            if !active[0] && !active[1] {
                for side in Side::BOTH {
                    bank.update(side.wrist_label(), None, speed[side_slot(side)]);
                }
                fused_last_frame = [false; 2];
                report.outcomes.push(outcomes);
                out.push(frame.joints);
                continue;
            }

            // Single-frame forearm spikes are snapped back to the median first.
            let mut base = frame.joints;
            for side in Side::BOTH {
                if active[side_slot(side)] {
                    self.snap_forearm(&mut base, side, medians.forearm(side));
                }
            }

            let ambiguous = self.ambiguous_pose(&base, medians.separation);
            let mut joints = base;
            let mut touched = active;

            for side in Side::BOTH {
                let slot = side_slot(side);
                let anchor = if !active[slot] {
                    Err(WristOutcome::Bypassed)
                } else if ambiguous {
                    Err(WristOutcome::AmbiguousPose)
                } else {
                    self.select_anchor(&base, side, frame.image(), estimator)
                };

                let measurement = anchor.ok();
                if measurement.is_some() && !fused_last_frame[slot] {
                    // State from before a gap describes where the wrist was, not where it is.
                    bank.reset(side.wrist_label());
                    corrections[slot] = CorrectionAverage::default();
                }
                let filtered = bank.update(side.wrist_label(), measurement, speed[slot]);

                match (anchor, base.get(side.wrist()), base.get(side.elbow())) {
                    (Ok(anchor), Some(wrist), Some(elbow)) => {
                        let average = &corrections[slot];
                        let fused = match self.config.mode {
                            FusionMode::Ema => {
                                self.blend_correction(average, wrist, anchor, speed[slot])
                            }
                            FusionMode::Kalman => filtered.unwrap_or(anchor),
                        };
                        let fused = self.clamp_after_blend(elbow, fused, medians.forearm(side));
                        corrections[slot] = CorrectionAverage {
                            offset: fused - wrist,
                            samples: corrections[slot].samples.saturating_add(1),
                        };
                        joints.set(side.wrist(), Some(fused));
                        outcomes[slot] = WristOutcome::Fused;
                    }
                    (Ok(_), _, _) => outcomes[slot] = WristOutcome::MissingJoints,
                    (Err(outcome), _, _) => outcomes[slot] = outcome,
                }
            }

            if outcomes.contains(&WristOutcome::Fused)
                && self.guard(&mut joints, &base, medians.separation)
            {
                debug!(frame = i, "Wrist crossing/collapse guard fired");
                report.guard_frames.push(i);
                touched = [true, true];
            }

            for side in Side::BOTH {
                if touched[side_slot(side)] {
                    self.bound_forearm(&mut joints, side, medians.forearm(side));
                }
            }

            fused_last_frame = outcomes.map(|o| o == WristOutcome::Fused);
            report.outcomes.push(outcomes);
            out.push(joints);
        }

        let output = input.with_joints(out);
        report.fused_frames = count_moved_frames(input, &output);
        info!(
            fused_frames = report.fused_frames,
            fused = report.count(WristOutcome::Fused),
            rejected = report.count(WristOutcome::AllRejected),
            guarded = report.guard_frames.len(),
            "Hand fusion complete"
        );
        (output, report)
    }

    fn snap_forearm(&self, joints: &mut Joints, side: Side, median: f64) {
        let (Some(elbow), Some(wrist)) = (joints.get(side.elbow()), joints.get(side.wrist())) else {
            return;
        };
        if median <= 0.0 {
            return;
        }
        let len = wrist.distance(elbow);
        let (low, high) = (
            self.config.forearm_min_ratio * median,
            self.config.forearm_max_ratio * median,
        );
        if len > 0.0 && (len < low || len > high) {
            joints.set(side.wrist(), Some(geometry::place_at_length(elbow, wrist, median)));
        }
    }

    // Clamps to the nearest edge of the pre-clamp range; used after the guard moved a wrist.
    fn bound_forearm(&self, joints: &mut Joints, side: Side, median: f64) {
        let (Some(elbow), Some(wrist)) = (joints.get(side.elbow()), joints.get(side.wrist())) else {
            return;
        };
        if median <= 0.0 {
            return;
        }
        let len = wrist.distance(elbow);
        let bounded = len.clamp(
            self.config.forearm_min_ratio * median,
            self.config.forearm_max_ratio * median,
        );
        if (bounded - len).abs() > f64::EPSILON * median {
            joints.set(side.wrist(), Some(geometry::place_at_length(elbow, wrist, bounded)));
        }
    }

    // Near address (low, very close) and near the top (high, close) the
    // hand model tends to lock both wrists onto the same hand.
    fn ambiguous_pose(&self, joints: &Joints, separation_median: f64) -> bool {
        let (Some(lw), Some(rw), Some(ls), Some(rs)) = (
            joints.get(joint::LEFT_WRIST),
            joints.get(joint::RIGHT_WRIST),
            joints.get(joint::LEFT_SHOULDER),
            joints.get(joint::RIGHT_SHOULDER),
        ) else {
            return false;
        };
        let shoulder_y = ls.y.min(rs.y);
        let separation = lw.distance(rw);
        let low = lw.y > shoulder_y && rw.y > shoulder_y;
        let high = lw.y < shoulder_y && rw.y < shoulder_y;
        (low && separation < self.config.address_closeness * separation_median)
            || (high && separation < self.config.top_closeness * separation_median)
    }

    fn select_anchor(
        &self,
        joints: &Joints,
        side: Side,
        image: &DynamicImage,
        estimator: &dyn HandEstimator,
    ) -> Result<Point2D, WristOutcome> {
        let (Some(wrist), Some(elbow)) = (joints.get(side.wrist()), joints.get(side.elbow())) else {
            return Err(WristOutcome::MissingJoints);
        };
        let (width, height) = image.dimensions();
        let region = Region::centered(wrist, self.config.roi_radius);
        let Some(roi) = region.clamp_to(width, height, MIN_ROI_SIDE) else {
            return Err(WristOutcome::NoDetections);
        };
        let hands = estimator.estimate(image, roi);
        if hands.is_empty() {
            return Err(WristOutcome::NoDetections);
        }

        let other_elbow = joints.get(side.other().elbow());
        let other_wrist = joints.get(side.other().wrist());
        let forearm = wrist - elbow;
        let forearm_len = forearm.norm().max(MIN_LENGTH);

        hands
            .iter()
            .map(|h| h.palm_anchor())
            .filter(|&a| {
                let d = a.distance(wrist);
                if d >= self.config.accept_radius {
                    return false;
                }
                let to_anchor = a - elbow;
                if geometry::cosine(forearm, to_anchor) < self.config.min_direction_cosine {
                    debug!(?side, "Anchor rejected: off the forearm direction");
                    return false;
                }
                // Never pull the wrist in toward the elbow.
                let own_elbow_dist = to_anchor.norm().max(MIN_LENGTH);
                if own_elbow_dist + self.config.inward_slack < forearm_len {
                    debug!(?side, "Anchor rejected: inward of the wrist");
                    return false;
                }
                if let Some(oe) = other_elbow {
                    if a.distance(oe) + self.config.other_elbow_slack < own_elbow_dist {
                        debug!(?side, "Anchor rejected: belongs to the other arm");
                        return false;
                    }
                }
                if let Some(ow) = other_wrist {
                    if a.distance(ow) + self.config.other_wrist_slack < d {
                        debug!(?side, "Anchor rejected: closer to the other wrist");
                        return false;
                    }
                }
                true
            })
            .min_by(|a, b| a.distance(wrist).total_cmp(&b.distance(wrist)))
            .ok_or(WristOutcome::AllRejected)
    }

    // The average runs on the correction, not the position, so a wrist that
    // keeps moving is not dragged back toward where it used to be. The gain
    // starts at alpha and shrinks like a running mean down to `gain_floor`.
    fn blend_correction(
        &self,
        average: &CorrectionAverage,
        wrist: Point2D,
        anchor: Point2D,
        speed: f64,
    ) -> Point2D {
        let alpha = if speed < self.config.slow_speed {
            self.config.alpha_slow
        } else {
            self.config.alpha_moderate
        };
        let floor = self.config.gain_floor.min(alpha);
        let gain = (alpha / (1.0 + average.samples as f64 * alpha)).max(floor);
        let offset = average.offset + (anchor - wrist - average.offset) * gain;
        let step = self.config.max_step;
        wrist + Point2D::new(offset.x.clamp(-step, step), offset.y.clamp(-step, step))
    }

    fn clamp_after_blend(&self, elbow: Point2D, wrist: Point2D, median: f64) -> Point2D {
        if median <= 0.0 {
            return wrist;
        }
        let len = wrist.distance(elbow).max(MIN_LENGTH);
        let target = len.clamp(
            self.config.blend_min_ratio * median,
            self.config.blend_max_ratio * median,
        );
        geometry::place_at_length(elbow, wrist, target)
    }

    /// Replaces crossed or collapsed wrists with the pre-fusion pair pushed
    /// apart around its midpoint. Returns true when it fired.
    fn guard(&self, joints: &mut Joints, base: &Joints, separation_median: f64) -> bool {
        let (Some(le), Some(re), Some(lw), Some(rw)) = (
            joints.get(joint::LEFT_ELBOW),
            joints.get(joint::RIGHT_ELBOW),
            joints.get(joint::LEFT_WRIST),
            joints.get(joint::RIGHT_WRIST),
        ) else {
            return false;
        };
        let crossed = geometry::segments_intersect(le, lw, re, rw);
        if !crossed && lw.distance(rw) >= self.config.collapse_ratio * separation_median {
            return false;
        }
        let (Some(bl), Some(br)) = (base.get(joint::LEFT_WRIST), base.get(joint::RIGHT_WRIST))
        else {
            return false;
        };

        let mid = bl.midpoint(br);
        let dir = geometry::unit(bl, br)
            .or_else(|| geometry::unit(le, re))
            .unwrap_or(Point2D::new(1.0, 0.0));
        let half = bl.distance(br).max(self.config.expand_ratio * separation_median) * 0.5;
        joints.set(joint::LEFT_WRIST, Some(mid - dir * half));
        joints.set(joint::RIGHT_WRIST, Some(mid + dir * half));
        true
    }
}

fn count_moved_frames(before: &FrameSequence, after: &FrameSequence) -> usize {
    before
        .frames
        .iter()
        .zip(&after.frames)
        .filter(|(a, b)| {
            Side::BOTH.iter().any(|side| {
                match (a.joints.get(side.wrist()), b.joints.get(side.wrist())) {
                    (Some(p), Some(q)) => p.distance(q) > FUSED_MOVE_THRESHOLD,
                    _ => false,
                }
            })
        })
        .count()
}
