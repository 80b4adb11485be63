// src/pose.rs - Skeleton data model shared by every stage
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};
use std::sync::Arc;

/// Number of joints in the full-body topology.
pub const JOINT_COUNT: usize = 33;

/// Full-body joint indices (BlazePose topology). Only the joints the
/// stages reason about are named; the rest pass through by index.
pub mod joint {
    pub const NOSE: usize = 0;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
    pub const LEFT_KNEE: usize = 25;
    pub const RIGHT_KNEE: usize = 26;
    pub const LEFT_ANKLE: usize = 27;
    pub const RIGHT_ANKLE: usize = 28;
}

const JOINT_NAMES: [&str; JOINT_COUNT] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

/// Human-readable joint name, `None` outside the topology.
pub fn joint_name(index: usize) -> Option<&'static str> {
    JOINT_NAMES.get(index).copied()
}

/// A position in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn dot(&self, other: Point2D) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn midpoint(&self, other: Point2D) -> Point2D {
        Point2D::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point2D {
    type Output = Point2D;
    fn add(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2D {
    type Output = Point2D;
    fn sub(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point2D {
    type Output = Point2D;
    fn mul(self, rhs: f64) -> Point2D {
        Point2D::new(self.x * rhs, self.y * rhs)
    }
}

/// Body side of a tracked arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn wrist(self) -> usize {
        match self {
            Side::Left => joint::LEFT_WRIST,
            Side::Right => joint::RIGHT_WRIST,
        }
    }

    pub fn elbow(self) -> usize {
        match self {
            Side::Left => joint::LEFT_ELBOW,
            Side::Right => joint::RIGHT_ELBOW,
        }
    }

    pub fn shoulder(self) -> usize {
        match self {
            Side::Left => joint::LEFT_SHOULDER,
            Side::Right => joint::RIGHT_SHOULDER,
        }
    }

    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Label used to key per-wrist filter state.
    pub fn wrist_label(self) -> &'static str {
        match self {
            Side::Left => "leftWrist",
            Side::Right => "rightWrist",
        }
    }
}

/// Per-frame joint mapping. Absent joints are `None`, never a sentinel coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joints([Option<Point2D>; JOINT_COUNT]);

impl Default for Joints {
    fn default() -> Self {
        Self::new()
    }
}

impl Joints {
    pub fn new() -> Self {
        Self([None; JOINT_COUNT])
    }

    /// Builds a mapping from `(index, point)` pairs; indices outside the topology are dropped.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, Point2D)>) -> Self {
        let mut joints = Self::new();
        for (index, point) in pairs {
            joints.set(index, Some(point));
        }
        joints
    }

    pub fn get(&self, index: usize) -> Option<Point2D> {
        self.0.get(index).copied().flatten()
    }

    pub fn set(&mut self, index: usize, point: Option<Point2D>) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = point;
        }
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        if a < JOINT_COUNT && b < JOINT_COUNT {
            self.0.swap(a, b);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<Point2D>)> + '_ {
        self.0.iter().copied().enumerate()
    }

    pub fn present_count(&self) -> usize {
        self.0.iter().filter(|p| p.is_some()).count()
    }
}

/// One video sample: a shared, read-only image plus its joint mapping.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<DynamicImage>,
    pub joints: Joints,
}

impl Frame {
    pub fn new(image: Arc<DynamicImage>, joints: Joints) -> Self {
        Self { image, joints }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn shared_image(&self) -> Arc<DynamicImage> {
        Arc::clone(&self.image)
    }

    /// Same image, different joints. The image buffer is shared, not copied.
    pub fn with_joints(&self, joints: Joints) -> Frame {
        Frame {
            image: Arc::clone(&self.image),
            joints,
        }
    }
}

/// Ordered frames sampled at a fixed rate.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    pub frames: Vec<Frame>,
    pub fps: f64,
}

impl FrameSequence {
    pub fn new(frames: Vec<Frame>, fps: f64) -> Self {
        Self { frames, fps }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sampling interval in seconds; zero when the rate is unusable.
    pub fn dt(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            1.0 / self.fps
        } else {
            0.0
        }
    }

    pub fn joint(&self, frame: usize, index: usize) -> Option<Point2D> {
        self.frames.get(frame).and_then(|f| f.joints.get(index))
    }

    /// Builds a sequence with the same images and rate but new joint mappings.
    pub fn with_joints(&self, joints: Vec<Joints>) -> FrameSequence {
        let frames = self
            .frames
            .iter()
            .zip(joints)
            .map(|(frame, joints)| frame.with_joints(joints))
            .collect();
        FrameSequence {
            frames,
            fps: self.fps,
        }
    }

    pub fn joint_maps(&self) -> Vec<Joints> {
        self.frames.iter().map(|f| f.joints).collect()
    }

    /// Per-frame displacement of one joint from the previous frame, in pixels.
    /// Entry 0 and entries with a missing endpoint are `None`.
    pub fn step_lengths(&self, index: usize) -> Vec<Option<f64>> {
        let mut steps = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            let step = if i == 0 {
                None
            } else {
                match (self.joint(i - 1, index), self.joint(i, index)) {
                    (Some(p), Some(c)) => Some(c.distance(p)),
                    _ => None,
                }
            };
            steps.push(step);
        }
        steps
    }
}

/// Side label reported by the hand detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandSide {
    Left,
    Right,
    Unknown,
}

/// Hand landmark indices (21-point topology).
pub mod hand {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const INDEX_MCP: usize = 5;
    pub const MIDDLE_MCP: usize = 9;
    pub const RING_MCP: usize = 13;
    pub const PINKY_MCP: usize = 17;
    pub const LANDMARK_COUNT: usize = 21;

    /// Wrist plus the four knuckle bases; their mean approximates the palm center.
    pub const PALM: [usize; 5] = [WRIST, INDEX_MCP, MIDDLE_MCP, RING_MCP, PINKY_MCP];
}

/// One auxiliary detector result, in full-image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct HandDetection {
    pub landmarks: [Point2D; hand::LANDMARK_COUNT],
    pub side: HandSide,
}

impl HandDetection {
    pub fn new(landmarks: [Point2D; hand::LANDMARK_COUNT], side: HandSide) -> Self {
        Self { landmarks, side }
    }

    /// Returns `None` unless exactly 21 landmarks are given.
    pub fn from_slice(points: &[Point2D], side: HandSide) -> Option<Self> {
        let landmarks: [Point2D; hand::LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self { landmarks, side })
    }

    /// Mean of the palm landmarks.
    pub fn palm_anchor(&self) -> Point2D {
        let sum = hand::PALM
            .iter()
            .fold(Point2D::default(), |acc, &i| acc + self.landmarks[i]);
        sum * (1.0 / hand::PALM.len() as f64)
    }
}

/// Axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square of half-size `radius` centered on `center`.
    pub fn centered(center: Point2D, radius: f64) -> Self {
        Self::new(center.x - radius, center.y - radius, radius * 2.0, radius * 2.0)
    }

    /// Intersection with the image rectangle; `None` if it is `min_side` pixels or thinner.
    pub fn clamp_to(&self, image_width: u32, image_height: u32, min_side: f64) -> Option<Region> {
        let x0 = self.x.max(0.0);
        let y0 = self.y.max(0.0);
        let x1 = (self.x + self.width).min(image_width as f64);
        let y1 = (self.y + self.height).min(image_height as f64);
        if !(x1 - x0 > min_side && y1 - y0 > min_side) {
            return None;
        }
        Some(Region::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Integer pixel bounds `(x, y, w, h)` for cropping.
    pub fn pixel_bounds(&self) -> (u32, u32, u32, u32) {
        let x = self.x.floor().max(0.0) as u32;
        let y = self.y.floor().max(0.0) as u32;
        let w = (self.x + self.width).ceil().max(0.0) as u32;
        let h = (self.y + self.height).ceil().max(0.0) as u32;
        (x, y, w.saturating_sub(x), h.saturating_sub(y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joints_out_of_range_is_absent() {
        let mut joints = Joints::new();
        joints.set(40, Some(Point2D::new(1.0, 1.0)));
        assert_eq!(joints.present_count(), 0);
        assert_eq!(joints.get(40), None);
    }

    #[test]
    fn swap_exchanges_wrists() {
        let mut joints = Joints::from_pairs([
            (joint::LEFT_WRIST, Point2D::new(1.0, 2.0)),
            (joint::RIGHT_WRIST, Point2D::new(3.0, 4.0)),
        ]);
        joints.swap(joint::LEFT_WRIST, joint::RIGHT_WRIST);
        assert_eq!(joints.get(joint::LEFT_WRIST), Some(Point2D::new(3.0, 4.0)));
        assert_eq!(joints.get(joint::RIGHT_WRIST), Some(Point2D::new(1.0, 2.0)));
    }

    #[test]
    fn palm_anchor_averages_five_landmarks() {
        let mut points = [Point2D::new(100.0, 100.0); hand::LANDMARK_COUNT];
        points[hand::WRIST] = Point2D::new(0.0, 0.0);
        points[hand::INDEX_MCP] = Point2D::new(10.0, 0.0);
        points[hand::MIDDLE_MCP] = Point2D::new(20.0, 0.0);
        points[hand::RING_MCP] = Point2D::new(30.0, 0.0);
        points[hand::PINKY_MCP] = Point2D::new(40.0, 10.0);
        let detection = HandDetection::new(points, HandSide::Unknown);
        assert_eq!(detection.palm_anchor(), Point2D::new(20.0, 2.0));
    }

    #[test]
    fn from_slice_requires_full_hand() {
        let points = vec![Point2D::default(); 18];
        assert!(HandDetection::from_slice(&points, HandSide::Left).is_none());
    }

    #[test]
    fn region_clamps_to_image() {
        let roi = Region::centered(Point2D::new(5.0, 5.0), 10.0);
        let clamped = roi.clamp_to(100, 100, 4.0).unwrap();
        assert_eq!(clamped, Region::new(0.0, 0.0, 15.0, 15.0));
        assert!(Region::new(98.0, 0.0, 10.0, 10.0).clamp_to(100, 100, 4.0).is_none());
    }

    #[test]
    fn step_lengths_skip_missing_samples() {
        let image = Arc::new(DynamicImage::new_rgb8(1, 1));
        let frames = vec![
            Frame::new(image.clone(), Joints::from_pairs([(0, Point2D::new(0.0, 0.0))])),
            Frame::new(image.clone(), Joints::from_pairs([(0, Point2D::new(3.0, 4.0))])),
            Frame::new(image, Joints::new()),
        ];
        let seq = FrameSequence::new(frames, 30.0);
        assert_eq!(seq.step_lengths(0), vec![None, Some(5.0), None]);
    }
}
