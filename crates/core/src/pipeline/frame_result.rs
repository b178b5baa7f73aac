use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::estimation::domain::gaze_stage::GazeVector;
use crate::estimation::domain::head_pose_stage::PoseEstimate;
use crate::inference::domain::stage::StageKind;
use crate::shared::frame::Frame;
use crate::shared::region::{FrameSpace, Region};

/// Inference time spent in each stage for one frame, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageTimings {
    ms: [f64; 4],
}

impl StageTimings {
    pub fn set(&mut self, kind: StageKind, ms: f64) {
        self.ms[slot(kind)] = ms;
    }

    pub fn get(&self, kind: StageKind) -> f64 {
        self.ms[slot(kind)]
    }

    pub fn total(&self) -> f64 {
        self.ms.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StageKind, f64)> + '_ {
        StageKind::ALL.iter().map(move |&kind| (kind, self.get(kind)))
    }
}

fn slot(kind: StageKind) -> usize {
    match kind {
        StageKind::FaceDetection => 0,
        StageKind::HeadPose => 1,
        StageKind::Landmarks => 2,
        StageKind::Gaze => 3,
    }
}

/// Everything the pipeline learned about one frame. All geometry is in
/// full-frame coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameResult {
    pub frame_index: usize,
    pub face_box: Region<FrameSpace>,
    pub face_confidence: f32,
    pub pose: PoseEstimate,
    pub landmarks: LandmarkSet<FrameSpace>,
    /// Left, right.
    pub eye_regions: [Region<FrameSpace>; 2],
    pub gaze: GazeVector,
    pub timings: StageTimings,
}

/// Receives the result of every fully processed frame, together with the
/// frame it was computed from.
pub trait FrameResultSink: Send {
    fn consume(&mut self, frame: &Frame, result: &FrameResult) -> Result<(), Box<dyn std::error::Error>>;
}
