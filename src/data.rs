// src/data.rs - Recorded keypoint input and corrected-trajectory export
use anyhow::{Context, Result};
use chrono::Local;
use csv::Writer;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::DataError;
use crate::pose::{joint_name, Frame, FrameSequence, Joints, Point2D, JOINT_COUNT};

/// Upstream pose output for one swing, as written by the capture tool:
/// `{"fps": 30, "frames": [{"image": "f_0001.png", "joints": {"15": [x, y]}}]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedSwing {
    #[serde(default)]
    pub fps: Option<f64>,
    pub frames: Vec<RecordedFrame>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub joints: BTreeMap<String, [f64; 2]>,
}

impl RecordedFrame {
    /// Parses the joint map. Unknown indices are an error; non-finite
    /// coordinates are treated as undetected.
    pub fn to_joints(&self) -> Result<Joints, DataError> {
        let mut joints = Joints::new();
        for (key, [x, y]) in &self.joints {
            let index: usize = key
                .trim()
                .parse()
                .map_err(|_| DataError::invalid(format!("joint key `{key}` is not an index")))?;
            if index >= JOINT_COUNT {
                return Err(DataError::invalid(format!(
                    "joint index {index} is outside 0..{JOINT_COUNT}"
                )));
            }
            let p = Point2D::new(*x, *y);
            if p.is_finite() {
                joints.set(index, Some(p));
            } else {
                debug!(joint = index, "Dropping non-finite keypoint");
            }
        }
        Ok(joints)
    }
}

impl RecordedSwing {
    pub fn from_json_file(path: &Path) -> Result<Self, DataError> {
        let contents = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| DataError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Assembles the frame sequence. `fps_override` wins over the recorded rate;
    /// one of the two must be a positive finite number.
    pub fn into_sequence<F>(
        self,
        fps_override: Option<f64>,
        mut image_for: F,
    ) -> Result<FrameSequence, DataError>
    where
        F: FnMut(Option<&Path>) -> Arc<DynamicImage>,
    {
        let fps = fps_override
            .or(self.fps)
            .ok_or_else(|| DataError::invalid("no frame rate recorded or given"))?;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(DataError::invalid(format!("frame rate must be positive, got {fps}")));
        }
        let frames = self
            .frames
            .iter()
            .map(|f| Ok(Frame::new(image_for(f.image.as_deref()), f.to_joints()?)))
            .collect::<Result<Vec<_>, DataError>>()?;
        Ok(FrameSequence::new(frames, fps))
    }
}

#[derive(Debug, Serialize)]
struct TrajectoryRecord {
    frame: usize,
    timestamp: f64,
    joint: usize,
    name: &'static str,
    x: f64,
    y: f64,
}

/// Writes one row per present joint per frame. Returns the number of rows.
pub fn write_trajectory_csv<W: Write>(seq: &FrameSequence, out: W) -> Result<usize, DataError> {
    let mut writer = Writer::from_writer(out);
    let dt = seq.dt();
    let mut rows = 0;
    for (i, frame) in seq.frames.iter().enumerate() {
        for (index, point) in frame.joints.iter() {
            let Some(p) = point else { continue };
            writer.serialize(TrajectoryRecord {
                frame: i,
                timestamp: i as f64 * dt,
                joint: index,
                name: joint_name(index).unwrap_or("unknown"),
                x: p.x,
                y: p.y,
            })?;
            rows += 1;
        }
    }
    writer.flush().map_err(|e| DataError::Csv(e.into()))?;
    Ok(rows)
}

pub struct TrajectoryExporter {
    output_dir: PathBuf,
    session_name: String,
}

impl TrajectoryExporter {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Self {
        let session_name = session_name
            .unwrap_or_else(|| format!("swing_{}", Local::now().format("%Y%m%d_%H%M%S")));
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_name,
        }
    }

    pub fn csv_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.csv", self.session_name))
    }

    pub fn export_csv(&self, seq: &FrameSequence) -> Result<PathBuf> {
        let csv_path = self.csv_path();
        if let Some(parent) = csv_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create output directory {}", parent.display()))?;
        }
        let file = File::create(&csv_path)
            .with_context(|| format!("Cannot create {}", csv_path.display()))?;
        let rows = write_trajectory_csv(seq, file)?;
        info!("Wrote {} trajectory rows to {}", rows, csv_path.display());
        Ok(csv_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::joint;

    fn blank(_: Option<&Path>) -> Arc<DynamicImage> {
        Arc::new(DynamicImage::new_rgb8(2, 2))
    }

    #[test]
    fn parses_recorded_swing() {
        let json = r#"{
            "fps": 20,
            "frames": [
                { "image": "f1.png", "joints": { "15": [10.0, 20.0], "16": [30.0, 40.0] } },
                { "joints": { "0": [1.0, 2.0] } },
                {}
            ]
        }"#;
        let swing: RecordedSwing = serde_json::from_str(json).unwrap();
        let seq = swing.into_sequence(None, blank).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.fps, 20.0);
        assert_eq!(seq.joint(0, joint::RIGHT_WRIST), Some(Point2D::new(30.0, 40.0)));
        assert_eq!(seq.joint(1, joint::NOSE), Some(Point2D::new(1.0, 2.0)));
        assert_eq!(seq.frames[2].joints.present_count(), 0);
    }

    #[test]
    fn fps_override_and_missing_rate() {
        let swing = RecordedSwing {
            fps: None,
            frames: vec![RecordedFrame::default()],
        };
        assert!(swing.clone().into_sequence(None, blank).is_err());
        assert_eq!(swing.into_sequence(Some(60.0), blank).unwrap().fps, 60.0);
    }

    #[test]
    fn bad_joint_keys_rejected() {
        let mut frame = RecordedFrame::default();
        frame.joints.insert("wrist".into(), [0.0, 0.0]);
        assert!(matches!(frame.to_joints(), Err(DataError::Invalid(_))));

        let mut frame = RecordedFrame::default();
        frame.joints.insert("40".into(), [0.0, 0.0]);
        assert!(frame.to_joints().is_err());
    }

    #[test]
    fn non_finite_points_are_absent() {
        let mut frame = RecordedFrame::default();
        frame.joints.insert("15".into(), [f64::NAN, 1.0]);
        assert_eq!(frame.to_joints().unwrap().get(joint::LEFT_WRIST), None);
    }

    #[test]
    fn csv_has_one_row_per_present_joint() {
        let image = Arc::new(DynamicImage::new_rgb8(2, 2));
        let frames = vec![
            Frame::new(
                image.clone(),
                Joints::from_pairs([
                    (joint::LEFT_WRIST, Point2D::new(1.5, 2.5)),
                    (joint::NOSE, Point2D::new(0.0, 0.0)),
                ]),
            ),
            Frame::new(image, Joints::from_pairs([(joint::LEFT_WRIST, Point2D::new(3.0, 4.0))])),
        ];
        let seq = FrameSequence::new(frames, 10.0);
        let mut buf = Vec::new();
        let rows = write_trajectory_csv(&seq, &mut buf).unwrap();
        assert_eq!(rows, 3);
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "frame,timestamp,joint,name,x,y");
        assert_eq!(lines[1], "0,0.0,0,nose,0.0,0.0");
        assert_eq!(lines[3], "1,0.1,15,left_wrist,3.0,4.0");
    }

    #[test]
    fn exporter_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = TrajectoryExporter::new(dir.path(), Some("take1".into()));
        let seq = FrameSequence::new(Vec::new(), 30.0);
        let path = exporter.export_csv(&seq).unwrap();
        assert_eq!(path, dir.path().join("take1.csv"));
        assert!(path.exists());

        let default_name = TrajectoryExporter::new(dir.path(), None).csv_path();
        let file_name = default_name.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("swing_") && file_name.ends_with(".csv"));
    }
}
