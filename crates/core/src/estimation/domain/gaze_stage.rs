use ndarray::Array2;
use serde::Serialize;

use crate::estimation::domain::head_pose_stage::PoseEstimate;
use crate::inference::domain::inference_session::NamedTensors;
use crate::inference::domain::stage::{Stage, StageError, StageKind, StageRunner, Timed};
use crate::inference::domain::tensor_codec::{self, InputLayout};
use crate::shared::constants::GAZE_EYE_INPUT_SIZE;
use crate::shared::frame::Frame;

pub const LEFT_EYE_INPUT: &str = "left_eye_image";
pub const RIGHT_EYE_INPUT: &str = "right_eye_image";
pub const HEAD_POSE_INPUT: &str = "head_pose_angles";

/// Direction of gaze in the camera's coordinate system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct GazeVector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl GazeVector {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

pub struct GazeQuery<'a> {
    pub left_eye: &'a Frame,
    pub right_eye: &'a Frame,
    pub pose: PoseEstimate,
}

/// Combines both eye crops and the head pose into a gaze vector.
///
/// Unlike the other stages the input names are fixed by the model family,
/// so the layout is not read from the session.
pub struct GazeStage {
    eye_layout: InputLayout,
    output_name: Option<String>,
}

impl GazeStage {
    pub fn new() -> Self {
        Self {
            eye_layout: InputLayout::new(GAZE_EYE_INPUT_SIZE, GAZE_EYE_INPUT_SIZE),
            output_name: None,
        }
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }
}

impl Default for GazeStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for GazeStage {
    type Input<'a> = GazeQuery<'a>;
    type Output = GazeVector;

    const KIND: StageKind = StageKind::Gaze;

    fn encode(&self, input: &GazeQuery<'_>) -> Result<NamedTensors, StageError> {
        let left = tensor_codec::encode(input.left_eye, &self.eye_layout)?;
        let right = tensor_codec::encode(input.right_eye, &self.eye_layout)?;
        let angles = Array2::from_shape_fn((1, 3), |(_, i)| input.pose.as_array()[i]);

        Ok(NamedTensors::new()
            .with(LEFT_EYE_INPUT, left.into_dyn())
            .with(RIGHT_EYE_INPUT, right.into_dyn())
            .with(HEAD_POSE_INPUT, angles.into_dyn()))
    }

    fn decode(&self, _input: &GazeQuery<'_>, outputs: &NamedTensors) -> Result<GazeVector, StageError> {
        let (name, tensor) = match &self.output_name {
            Some(name) => (name.as_str(), outputs.require(name)?),
            None => outputs.primary()?,
        };
        let v = tensor_codec::leading_values(name, tensor, 3)?;
        Ok(GazeVector::new(v[0], v[1], v[2]))
    }
}

pub type GazeEstimator = StageRunner<GazeStage>;

impl StageRunner<GazeStage> {
    pub fn estimate(
        &mut self,
        left_eye: &Frame,
        right_eye: &Frame,
        pose: PoseEstimate,
    ) -> Result<Timed<GazeVector>, StageError> {
        self.run(GazeQuery {
            left_eye,
            right_eye,
            pose,
        })
    }
}
