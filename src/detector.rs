// src/detector.rs - Upstream pose and hand estimators as injected capabilities
use anyhow::Result;
use image::DynamicImage;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::pose::{Frame, FrameSequence, HandDetection, Joints, Region};

/// Full-body pose model: one joint mapping per image, pixel coordinates,
/// undetected joints absent.
pub trait PoseEstimator {
    fn estimate(&self, image: &DynamicImage) -> Joints;
}

/// Auxiliary hand-landmark model queried over a region of interest.
///
/// Callers clamp `region` to the image bounds before invoking. Results are in
/// full-image pixel coordinates. Implementations backed by a non-reentrant
/// model should serialize calls internally; the pipeline issues them from a
/// single thread.
pub trait HandEstimator: Send + Sync {
    fn estimate(&self, image: &DynamicImage, region: Region) -> Vec<HandDetection>;
}

impl<F> PoseEstimator for F
where
    F: Fn(&DynamicImage) -> Joints,
{
    fn estimate(&self, image: &DynamicImage) -> Joints {
        self(image)
    }
}

impl<F> HandEstimator for F
where
    F: Fn(&DynamicImage, Region) -> Vec<HandDetection> + Send + Sync,
{
    fn estimate(&self, image: &DynamicImage, region: Region) -> Vec<HandDetection> {
        self(image, region)
    }
}

/// Runs the pose model over decoded frames and assembles the sequence.
/// Images are moved behind `Arc` once and shared by every later stage.
pub fn build_sequence<P>(images: Vec<DynamicImage>, pose: &P, fps: f64) -> FrameSequence
where
    P: PoseEstimator + ?Sized,
{
    let frames = images
        .into_iter()
        .map(|image| {
            let joints = pose.estimate(&image);
            Frame::new(Arc::new(image), joints)
        })
        .collect();
    FrameSequence::new(frames, fps)
}

/// One-time asynchronous readiness gate for the hand model.
///
/// The loader runs at most once; concurrent `prepare` calls await the same
/// load. A failed load resolves the gate to "unavailable" and fusion is then
/// skipped for the whole run.
#[derive(Default)]
pub struct HandModelGate {
    cell: OnceCell<Option<Arc<dyn HandEstimator>>>,
}

impl HandModelGate {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Gate already resolved to a loaded model.
    pub fn ready(estimator: Arc<dyn HandEstimator>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Some(estimator))),
        }
    }

    /// Gate already resolved to "no model".
    pub fn unavailable() -> Self {
        Self {
            cell: OnceCell::new_with(Some(None)),
        }
    }

    pub async fn prepare<F, Fut>(&self, loader: F) -> Option<Arc<dyn HandEstimator>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn HandEstimator>>>,
    {
        self.cell
            .get_or_init(|| async move {
                match loader().await {
                    Ok(estimator) => {
                        info!("Hand landmark model ready");
                        Some(estimator)
                    }
                    Err(e) => {
                        warn!("Hand landmark model unavailable, fusion disabled: {:#}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Resolved model, `None` while unresolved or when loading failed.
    pub fn get(&self) -> Option<Arc<dyn HandEstimator>> {
        self.cell.get().cloned().flatten()
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{joint, Point2D};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn no_hands() -> Arc<dyn HandEstimator> {
        Arc::new(|_: &DynamicImage, _: Region| Vec::<HandDetection>::new())
    }

    #[test]
    fn build_sequence_runs_pose_per_frame() {
        let pose = |image: &DynamicImage| {
            Joints::from_pairs([(joint::NOSE, Point2D::new(image.width() as f64, 0.0))])
        };
        let images = vec![DynamicImage::new_rgb8(4, 4), DynamicImage::new_rgb8(8, 4)];
        let seq = build_sequence(images, &pose, 30.0);
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.joint(1, joint::NOSE), Some(Point2D::new(8.0, 0.0)));
    }

    #[tokio::test]
    async fn gate_loads_once() {
        let gate = HandModelGate::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let got = gate
                .prepare(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(no_hands())
                })
                .await;
            assert!(got.is_some());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(gate.get().is_some());
    }

    #[tokio::test]
    async fn failed_load_resolves_unavailable() {
        let gate = HandModelGate::new();
        assert!(!gate.is_resolved());
        let got = gate
            .prepare(|| async { Err(anyhow::anyhow!("model file missing")) })
            .await;
        assert!(got.is_none());
        assert!(gate.is_resolved());
        assert!(gate.get().is_none());
    }

    #[test]
    fn prebuilt_gates() {
        assert!(HandModelGate::ready(no_hands()).get().is_some());
        assert!(HandModelGate::unavailable().get().is_none());
        assert!(HandModelGate::unavailable().is_resolved());
    }
}
