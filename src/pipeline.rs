// src/pipeline.rs - Runs the correction stages in order over one swing
use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::club_cue::{ClubCueReport, ClubCueStage};
use crate::config::PipelineConfig;
use crate::detector::{HandEstimator, HandModelGate};
use crate::gap_fill::GapFiller;
use crate::hand_fusion::{FusionReport, HandFusionStage, WristOutcome};
use crate::identity::IdentityCorrector;
use crate::pose::FrameSequence;
use crate::stabilize::StabilizationStage;

/// Wall-clock time spent in each stage, milliseconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub identity_ms: f64,
    pub gap_fill_ms: f64,
    pub fusion_ms: f64,
    pub club_cue_ms: f64,
    pub stabilize_ms: f64,
    pub total_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FusionSummary {
    pub model_available: bool,
    pub fused_frames: usize,
    pub fused_wrists: usize,
    pub rejected_wrists: usize,
    pub ambiguous_wrists: usize,
    pub guard_frames: usize,
}

impl From<&FusionReport> for FusionSummary {
    fn from(r: &FusionReport) -> Self {
        Self {
            model_available: r.model_available,
            fused_frames: r.fused_frames,
            fused_wrists: r.count(WristOutcome::Fused),
            rejected_wrists: r.count(WristOutcome::AllRejected),
            ambiguous_wrists: r.count(WristOutcome::AmbiguousPose),
            guard_frames: r.guard_frames.len(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub frames: usize,
    pub fps: f64,
    pub identity_swaps: usize,
    pub interpolated_samples: usize,
    pub fusion: FusionSummary,
    pub club_cue: ClubCueReport,
    pub smoothed_samples: usize,
    pub timings: StageTimings,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub sequence: FrameSequence,
    pub report: PipelineReport,
    /// Per-frame wrist outcomes from the fusion stage.
    pub fusion: FusionReport,
}

pub struct SwingPipeline {
    config: PipelineConfig,
}

impl SwingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage. With `hand == None` the fusion stage passes through
    /// for the whole sequence.
    pub fn run(&self, input: &FrameSequence, hand: Option<&dyn HandEstimator>) -> PipelineOutput {
        let started = Instant::now();
        let mut timings = StageTimings::default();

        let t = Instant::now();
        let (seq, identity_swaps) =
            IdentityCorrector::new(self.config.identity.clone()).apply(input);
        timings.identity_ms = elapsed_ms(t);

        let t = Instant::now();
        let (seq, interpolated_samples) = GapFiller::new(self.config.gap_fill.clone()).apply(&seq);
        timings.gap_fill_ms = elapsed_ms(t);

        let t = Instant::now();
        let (seq, fusion) = HandFusionStage::new(self.config.fusion.clone(), hand).apply(&seq);
        timings.fusion_ms = elapsed_ms(t);

        let t = Instant::now();
        let (seq, club_cue) = ClubCueStage::new(self.config.club_cue.clone()).apply(&seq);
        timings.club_cue_ms = elapsed_ms(t);

        let t = Instant::now();
        let (seq, smoothed_samples) =
            StabilizationStage::new(self.config.stabilize.clone()).apply(&seq);
        timings.stabilize_ms = elapsed_ms(t);
        timings.total_ms = elapsed_ms(started);

        let report = PipelineReport {
            frames: seq.len(),
            fps: seq.fps,
            identity_swaps,
            interpolated_samples,
            fusion: FusionSummary::from(&fusion),
            club_cue,
            smoothed_samples,
            timings,
        };
        info!(
            frames = report.frames,
            swaps = report.identity_swaps,
            filled = report.interpolated_samples,
            fused_frames = report.fusion.fused_frames,
            total_ms = report.timings.total_ms,
            "Swing pipeline finished"
        );

        PipelineOutput {
            sequence: seq,
            report,
            fusion,
        }
    }

    /// Resolves the hand model gate first, then runs. Fusion is applied to
    /// every eligible frame or, when the model failed to load, to none.
    pub async fn run_gated<F, Fut>(
        &self,
        input: &FrameSequence,
        gate: &HandModelGate,
        loader: F,
    ) -> PipelineOutput
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn HandEstimator>>>,
    {
        let estimator = gate.prepare(loader).await;
        if estimator.is_none() {
            warn!("Running without hand fusion");
        }
        self.run(input, estimator.as_deref())
    }
}

impl Default for SwingPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{joint, Frame, HandDetection, Joints, Point2D, Region};
    use image::DynamicImage;

    fn still_arms(frames: usize) -> FrameSequence {
        let image = Arc::new(DynamicImage::new_rgb8(300, 300));
        let joints = Joints::from_pairs([
            (joint::LEFT_WRIST, Point2D::new(100.0, 150.0)),
            (joint::RIGHT_WRIST, Point2D::new(160.0, 150.0)),
            (joint::LEFT_ELBOW, Point2D::new(100.0, 250.0)),
            (joint::RIGHT_ELBOW, Point2D::new(160.0, 250.0)),
            (joint::NOSE, Point2D::new(130.0, 40.0)),
        ]);
        FrameSequence::new((0..frames).map(|_| Frame::new(image.clone(), joints)).collect(), 20.0)
    }

    #[test]
    fn output_has_input_shape() {
        let seq = still_arms(6);
        let out = SwingPipeline::default().run(&seq, None);
        assert_eq!(out.sequence.len(), 6);
        assert_eq!(out.report.frames, 6);
        assert!(!out.report.fusion.model_available);
        // Nothing moves and nothing is detected: the skeleton is unchanged.
        assert_eq!(out.sequence.joint_maps(), seq.joint_maps());
        assert!(Arc::ptr_eq(&out.sequence.frames[3].shared_image(), &seq.frames[3].shared_image()));
    }

    #[test]
    fn empty_sequence_is_fine() {
        let seq = FrameSequence::new(Vec::new(), 20.0);
        let out = SwingPipeline::default().run(&seq, None);
        assert!(out.sequence.is_empty());
        assert_eq!(out.report.club_cue.impact_frame, None);
    }

    #[tokio::test]
    async fn failed_model_load_degrades_to_passthrough() {
        let seq = still_arms(4);
        let gate = HandModelGate::new();
        let out = SwingPipeline::default()
            .run_gated(&seq, &gate, || async { Err(anyhow::anyhow!("no model")) })
            .await;
        assert!(!out.report.fusion.model_available);
        assert_eq!(out.report.fusion.fused_wrists, 0);
        assert_eq!(out.sequence.joint_maps(), seq.joint_maps());
    }

    #[tokio::test]
    async fn ready_gate_fuses() {
        let seq = still_arms(4);
        let hand: Arc<dyn HandEstimator> = Arc::new(|_: &DynamicImage, r: Region| {
            let c = Point2D::new(r.x + r.width / 2.0, r.y + r.height / 2.0);
            let palm = c + Point2D::new(0.0, -6.0);
            vec![HandDetection::new([palm; 21], crate::pose::HandSide::Unknown)]
        });
        let gate = HandModelGate::ready(hand);
        let out = SwingPipeline::default()
            .run_gated(&seq, &gate, || async { Err(anyhow::anyhow!("loader must not run")) })
            .await;
        assert!(out.report.fusion.model_available);
        assert!(out.report.fusion.fused_wrists > 0);
    }
}
