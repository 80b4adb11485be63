// src/lib.rs - Keypoint stabilization and hand-landmark fusion for golf swing video
//
// Stage order: identity guard -> wrist gap fill -> hand fusion -> club cue -> low-lag smoothing.
// Each stage consumes a whole FrameSequence and returns a new one of equal length.

pub mod ball;
pub mod club_cue;
pub mod config;
pub mod data;
pub mod detector;
pub mod error;
pub mod gap_fill;
pub mod geometry;
pub mod hand_fusion;
pub mod identity;
pub mod kalman;
pub mod line_orientation;
pub mod one_euro;
pub mod pipeline;
pub mod pose;
pub mod stabilize;
pub mod video;

pub use ball::{BallDetection, CircularObjectDetector};
pub use club_cue::{ClubCueReport, ClubCueStage};
pub use config::PipelineConfig;
pub use data::{RecordedSwing, TrajectoryExporter};
pub use detector::{HandEstimator, HandModelGate, PoseEstimator};
pub use error::{ConfigError, DataError};
pub use gap_fill::GapFiller;
pub use hand_fusion::{FusionReport, HandFusionStage, WristOutcome};
pub use identity::IdentityCorrector;
pub use kalman::{ConstantVelocityKalman2D, FilterBank};
pub use line_orientation::{LineOrientation, LineOrientationDetector};
pub use one_euro::AdaptiveFilter1D;
pub use pipeline::{PipelineOutput, PipelineReport, SwingPipeline};
pub use pose::{Frame, FrameSequence, HandDetection, HandSide, Joints, Point2D, Region, Side};
pub use stabilize::StabilizationStage;
