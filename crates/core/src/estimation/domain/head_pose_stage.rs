use serde::Serialize;

use crate::inference::domain::inference_session::{InferenceError, InferenceSession, NamedTensors};
use crate::inference::domain::stage::{
    first_input, Stage, StageError, StageKind, StageRunner, Timed,
};
use crate::inference::domain::tensor_codec::{self, InputLayout};
use crate::shared::frame::Frame;

pub const YAW_OUTPUT: &str = "angle_y_fc";
pub const PITCH_OUTPUT: &str = "angle_p_fc";
pub const ROLL_OUTPUT: &str = "angle_r_fc";

const DEFAULT_INPUT_SIZE: u32 = 60;

/// Head orientation in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PoseEstimate {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl PoseEstimate {
    pub fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self { yaw, pitch, roll }
    }

    /// `[yaw, pitch, roll]`, the layout the gaze model takes.
    pub fn as_array(&self) -> [f32; 3] {
        [self.yaw, self.pitch, self.roll]
    }
}

/// Estimates yaw, pitch and roll from a face crop.
pub struct HeadPoseStage {
    input_name: String,
    layout: InputLayout,
}

impl HeadPoseStage {
    pub fn new(input_name: impl Into<String>, layout: InputLayout) -> Self {
        Self {
            input_name: input_name.into(),
            layout,
        }
    }

    pub fn for_session(session: &dyn InferenceSession) -> Result<Self, InferenceError> {
        let (name, shape) = first_input(session)?;
        let layout = shape
            .as_deref()
            .and_then(InputLayout::from_shape)
            .unwrap_or_else(|| InputLayout::new(DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE));
        Ok(Self::new(name, layout))
    }
}

impl Stage for HeadPoseStage {
    type Input<'a> = &'a Frame;
    type Output = PoseEstimate;

    const KIND: StageKind = StageKind::HeadPose;

    fn encode(&self, face_crop: &&Frame) -> Result<NamedTensors, StageError> {
        let tensor = tensor_codec::encode(face_crop, &self.layout)?;
        Ok(NamedTensors::new().with(self.input_name.clone(), tensor.into_dyn()))
    }

    fn decode(&self, _face_crop: &&Frame, outputs: &NamedTensors) -> Result<PoseEstimate, StageError> {
        let angle = |name: &str| -> Result<f32, InferenceError> {
            tensor_codec::scalar(name, outputs.require(name)?)
        };
        Ok(PoseEstimate {
            yaw: angle(YAW_OUTPUT)?,
            pitch: angle(PITCH_OUTPUT)?,
            roll: angle(ROLL_OUTPUT)?,
        })
    }
}

pub type HeadPoseEstimator = StageRunner<HeadPoseStage>;

impl StageRunner<HeadPoseStage> {
    pub fn estimate(&mut self, face_crop: &Frame) -> Result<Timed<PoseEstimate>, StageError> {
        self.run(face_crop)
    }
}
