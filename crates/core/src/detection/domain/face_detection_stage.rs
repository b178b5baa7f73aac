use std::str::FromStr;

use crate::inference::domain::inference_session::{InferenceError, InferenceSession, NamedTensors};
use crate::inference::domain::stage::{first_input, Stage, StageError, StageKind, StageRunner, Timed};
use crate::inference::domain::tensor_codec::{self, InputLayout};
use crate::shared::frame::Frame;
use crate::shared::region::{FrameSpace, Region};

/// Values per detection row: `[image_id, label, confidence, xmin, ymin, xmax, ymax]`.
pub const DETECTION_ROW_LEN: usize = 7;

/// Fallback input size when the model declares a dynamic shape.
const DEFAULT_INPUT_WIDTH: u32 = 672;
const DEFAULT_INPUT_HEIGHT: u32 = 384;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub region: Region<FrameSpace>,
    pub confidence: f32,
}

/// Detections that passed the confidence filter, in model output order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn select(&self, policy: SelectionPolicy) -> Option<&Detection> {
        match policy {
            SelectionPolicy::First => self.detections.first(),
            SelectionPolicy::Last => self.detections.last(),
            // max_by keeps the last of equal maxima; prefer the earliest
            SelectionPolicy::HighestConfidence => {
                self.detections.iter().rev().max_by(|a, b| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            }
        }
    }
}

/// Which detection is carried downstream when several pass the threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    #[default]
    HighestConfidence,
    First,
    /// Last surviving row in output order.
    Last,
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "highest" | "highest-confidence" => Ok(SelectionPolicy::HighestConfidence),
            "first" => Ok(SelectionPolicy::First),
            "last" => Ok(SelectionPolicy::Last),
            other => Err(format!(
                "selection policy must be one of: highest, first, last, got '{other}'"
            )),
        }
    }
}

/// Decodes flat detection rows into frame-space regions.
///
/// Keeps rows with `confidence > threshold`, denormalizes by the frame size,
/// truncates to whole pixels and clamps to the frame. Rows that collapse to
/// zero area after clamping are dropped. A row with a negative image id
/// terminates the list.
pub fn decode_detections(values: &[f32], threshold: f32, width: u32, height: u32) -> DetectionResult {
    let fw = width as f32;
    let fh = height as f32;
    let mut detections = Vec::new();

    for row in values.chunks_exact(DETECTION_ROW_LEN) {
        if row[0] < 0.0 {
            break;
        }
        let confidence = row[2];
        if !(confidence > threshold) {
            continue;
        }

        let xmin = (row[3] * fw) as i32;
        let ymin = (row[4] * fh) as i32;
        let xmax = (row[5] * fw) as i32;
        let ymax = (row[6] * fh) as i32;

        match Region::clamped(xmin, ymin, xmax, ymax, width, height) {
            Ok(region) => detections.push(Detection { region, confidence }),
            Err(e) => log::debug!("Dropping detection with confidence {confidence:.3}: {e}"),
        }
    }

    DetectionResult::new(detections)
}

pub struct FaceQuery<'a> {
    pub frame: &'a Frame,
    pub threshold: f32,
}

/// The face carried forward for one frame.
#[derive(Clone, Debug)]
pub struct FaceDetection {
    pub face_box: Region<FrameSpace>,
    pub confidence: f32,
    /// Pixels under `face_box`, copied out of the frame.
    pub crop: Frame,
    pub candidates: DetectionResult,
}

/// Finds faces in a full frame with an SSD-style detector.
pub struct FaceDetectionStage {
    input_name: String,
    output_name: Option<String>,
    layout: InputLayout,
    policy: SelectionPolicy,
}

impl FaceDetectionStage {
    pub fn new(input_name: impl Into<String>, layout: InputLayout) -> Self {
        Self {
            input_name: input_name.into(),
            output_name: None,
            layout,
            policy: SelectionPolicy::default(),
        }
    }

    /// Configures input name and size from the session's first input.
    pub fn for_session(session: &dyn InferenceSession) -> Result<Self, InferenceError> {
        let (name, shape) = first_input(session)?;
        let layout = shape
            .as_deref()
            .and_then(InputLayout::from_shape)
            .unwrap_or_else(|| InputLayout::new(DEFAULT_INPUT_WIDTH, DEFAULT_INPUT_HEIGHT));
        Ok(Self::new(name, layout))
    }

    /// Reads detections from this output instead of the first one.
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn layout(&self) -> &InputLayout {
        &self.layout
    }
}

impl Stage for FaceDetectionStage {
    type Input<'a> = FaceQuery<'a>;
    type Output = FaceDetection;

    const KIND: StageKind = StageKind::FaceDetection;

    fn encode(&self, input: &FaceQuery<'_>) -> Result<NamedTensors, StageError> {
        let tensor = tensor_codec::encode(input.frame, &self.layout)?;
        Ok(NamedTensors::new().with(self.input_name.clone(), tensor.into_dyn()))
    }

    fn decode(
        &self,
        input: &FaceQuery<'_>,
        outputs: &NamedTensors,
    ) -> Result<FaceDetection, StageError> {
        let tensor = match &self.output_name {
            Some(name) => outputs.require(name)?,
            None => outputs.primary()?.1,
        };
        let values = tensor_codec::flatten(tensor);
        let candidates = decode_detections(
            &values,
            input.threshold,
            input.frame.width(),
            input.frame.height(),
        );

        let chosen = *candidates
            .select(self.policy)
            .ok_or(StageError::NoFaceDetected {
                threshold: input.threshold,
            })?;
        let crop = input.frame.crop(&chosen.region)?;

        Ok(FaceDetection {
            face_box: chosen.region,
            confidence: chosen.confidence,
            crop,
            candidates,
        })
    }
}

pub type FaceDetector = StageRunner<FaceDetectionStage>;

impl StageRunner<FaceDetectionStage> {
    pub fn detect(&mut self, frame: &Frame, threshold: f32) -> Result<Timed<FaceDetection>, StageError> {
        self.run(FaceQuery { frame, threshold })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::domain::inference_session::Tensor;
    use approx::assert_relative_eq;
    use ndarray::IxDyn;
    use rstest::rstest;

    fn row(conf: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> [f32; 7] {
        [0.0, 1.0, conf, x1, y1, x2, y2]
    }

    fn rows(rows: &[[f32; 7]]) -> Vec<f32> {
        rows.iter().flatten().copied().collect()
    }

    /// Returns the same detection rows for every call, shaped `[1, 1, N, 7]`.
    struct FixedRowsSession {
        values: Vec<f32>,
    }

    impl InferenceSession for FixedRowsSession {
        fn input_names(&self) -> Vec<String> {
            vec!["data".to_string()]
        }

        fn input_shape(&self, _name: &str) -> Option<Vec<i64>> {
            Some(vec![1, 3, 40, 60])
        }

        fn run(&mut self, inputs: NamedTensors) -> Result<NamedTensors, InferenceError> {
            assert_eq!(inputs.require("data")?.shape(), &[1, 3, 40, 60]);
            let n = self.values.len() / DETECTION_ROW_LEN;
            let tensor =
                Tensor::from_shape_vec(IxDyn(&[1, 1, n, DETECTION_ROW_LEN]), self.values.clone())
                    .unwrap();
            Ok(NamedTensors::new().with("detection_out", tensor))
        }
    }

    fn detector(values: Vec<f32>, policy: SelectionPolicy) -> FaceDetector {
        let session = FixedRowsSession { values };
        let stage = FaceDetectionStage::for_session(&session)
            .unwrap()
            .with_policy(policy);
        StageRunner::new(stage, Box::new(session))
    }

    fn sample_rows() -> Vec<f32> {
        rows(&[
            row(0.30, 0.0, 0.0, 0.1, 0.1),
            row(0.95, 0.25, 0.25, 0.75, 0.75),
            row(0.60, 0.5, 0.1, 0.7, 0.4),
            row(0.80, 0.1, 0.5, 0.3, 0.9),
        ])
    }

    // ── decode_detections ────────────────────────────────────────────

    #[test]
    fn test_decode_denormalizes_and_truncates() {
        let values = rows(&[row(0.9, 0.1, 0.2, 0.55, 0.77)]);
        let result = decode_detections(&values, 0.5, 401, 301);
        assert_eq!(result.len(), 1);
        // 0.1*401=40.1, 0.2*301=60.2, 0.55*401=220.55, 0.77*301=231.77
        assert_eq!(result.as_slice()[0].region.as_tuple(), (40, 60, 220, 231));
    }

    #[test]
    fn test_decode_threshold_is_strict() {
        let values = rows(&[row(0.5, 0.1, 0.1, 0.5, 0.5)]);
        assert!(decode_detections(&values, 0.5, 100, 100).is_empty());
        assert_eq!(decode_detections(&values, 0.49, 100, 100).len(), 1);
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.3)]
    #[case(0.5)]
    #[case(0.7)]
    #[case(0.9)]
    fn test_decode_only_returns_above_threshold(#[case] threshold: f32) {
        let result = decode_detections(&sample_rows(), threshold, 640, 480);
        assert!(result.as_slice().iter().all(|d| d.confidence > threshold));
    }

    #[test]
    fn test_decode_raising_threshold_never_grows_result() {
        let thresholds = [0.0, 0.2, 0.3, 0.5, 0.6, 0.8, 0.95, 1.0];
        let counts: Vec<usize> = thresholds
            .iter()
            .map(|&t| decode_detections(&sample_rows(), t, 640, 480).len())
            .collect();
        assert!(counts.windows(2).all(|w| w[1] <= w[0]), "{counts:?}");
    }

    #[test]
    fn test_decode_clamps_to_frame() {
        let values = rows(&[row(0.9, -0.1, -0.2, 1.3, 1.1)]);
        let result = decode_detections(&values, 0.5, 200, 100);
        assert_eq!(result.as_slice()[0].region.as_tuple(), (0, 0, 200, 100));
    }

    #[test]
    fn test_decode_drops_degenerate_boxes() {
        let values = rows(&[row(0.9, 0.5, 0.5, 0.5, 0.8), row(0.9, 0.1, 0.1, 0.2, 0.2)]);
        let result = decode_detections(&values, 0.5, 100, 100);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_decode_stops_at_end_marker() {
        let mut values = rows(&[row(0.9, 0.1, 0.1, 0.2, 0.2)]);
        values.extend_from_slice(&[-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        values.extend_from_slice(&row(0.9, 0.3, 0.3, 0.4, 0.4));
        assert_eq!(decode_detections(&values, 0.5, 100, 100).len(), 1);
    }

    // ── Selection policy ─────────────────────────────────────────────

    #[rstest]
    #[case::highest(SelectionPolicy::HighestConfidence, 0.95)]
    #[case::first(SelectionPolicy::First, 0.95)]
    #[case::last(SelectionPolicy::Last, 0.80)]
    fn test_select_policy(#[case] policy: SelectionPolicy, #[case] expected: f32) {
        let result = decode_detections(&sample_rows(), 0.5, 640, 480);
        assert_relative_eq!(result.select(policy).unwrap().confidence, expected);
    }

    #[test]
    fn test_highest_confidence_prefers_earliest_tie() {
        let values = rows(&[row(0.9, 0.0, 0.0, 0.2, 0.2), row(0.9, 0.5, 0.5, 0.9, 0.9)]);
        let result = decode_detections(&values, 0.5, 100, 100);
        let chosen = result.select(SelectionPolicy::HighestConfidence).unwrap();
        assert_eq!(chosen.region.xmin(), 0);
    }

    #[rstest]
    #[case("highest", SelectionPolicy::HighestConfidence)]
    #[case("FIRST", SelectionPolicy::First)]
    #[case("last", SelectionPolicy::Last)]
    fn test_policy_from_str(#[case] text: &str, #[case] expected: SelectionPolicy) {
        assert_eq!(text.parse::<SelectionPolicy>().unwrap(), expected);
    }

    #[test]
    fn test_policy_from_str_rejects_unknown() {
        assert!("largest".parse::<SelectionPolicy>().is_err());
    }

    // ── Stage ────────────────────────────────────────────────────────

    #[test]
    fn test_detect_returns_box_and_matching_crop() {
        let mut detector = detector(sample_rows(), SelectionPolicy::HighestConfidence);
        let frame = Frame::filled(640, 480, [90, 90, 90], 3);
        let timed = detector.detect(&frame, 0.5).unwrap();
        let face = timed.value;
        assert_eq!(face.face_box.as_tuple(), (160, 120, 480, 360));
        assert_eq!(face.crop.width(), face.face_box.width());
        assert_eq!(face.crop.height(), face.face_box.height());
        assert_eq!(face.crop.index(), 3);
        assert_eq!(face.candidates.len(), 3);
    }

    #[test]
    fn test_detect_without_survivors_is_no_face() {
        let mut detector = detector(sample_rows(), SelectionPolicy::HighestConfidence);
        let frame = Frame::filled(640, 480, [0, 0, 0], 0);
        let err = detector.detect(&frame, 0.99).unwrap_err();
        assert!(matches!(err, StageError::NoFaceDetected { .. }));
    }

    #[test]
    fn test_detect_is_idempotent() {
        let mut detector = detector(sample_rows(), SelectionPolicy::Last);
        let frame = Frame::filled(640, 480, [10, 20, 30], 0);
        let a = detector.detect(&frame, 0.5).unwrap().value;
        let b = detector.detect(&frame, 0.5).unwrap().value;
        assert_eq!(a.face_box, b.face_box);
        assert_eq!(a.candidates, b.candidates);
        assert_eq!(a.crop.data(), b.crop.data());
    }

    #[test]
    fn test_named_output_missing_is_error() {
        let session = FixedRowsSession {
            values: sample_rows(),
        };
        let stage = FaceDetectionStage::for_session(&session)
            .unwrap()
            .with_output_name("boxes");
        let mut detector = StageRunner::new(stage, Box::new(session));
        let frame = Frame::filled(640, 480, [0, 0, 0], 0);
        let err = detector.detect(&frame, 0.5).unwrap_err();
        assert!(matches!(
            err,
            StageError::Inference(InferenceError::MissingOutput(_))
        ));
    }

    #[test]
    fn test_for_session_reads_layout() {
        let session = FixedRowsSession { values: vec![] };
        let stage = FaceDetectionStage::for_session(&session).unwrap();
        assert_eq!((stage.layout().width, stage.layout().height), (60, 40));
        assert_eq!(stage.policy(), SelectionPolicy::HighestConfidence);
    }
}
