use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::inference::domain::inference_session::{InferenceError, InferenceSession, NamedTensors};
use crate::inference::domain::stage::{first_input, Stage, StageError, StageKind, StageRunner, Timed};
use crate::inference::domain::tensor_codec::{self, InputLayout};
use crate::shared::constants::EYE_HALF_WIDTH;
use crate::shared::frame::Frame;
use crate::shared::region::{CropSpace, Point, Region, RegionError};

const DEFAULT_INPUT_SIZE: u32 = 48;

/// Number of scalar outputs: five `x, y` pairs.
const LANDMARK_VALUES: usize = 10;

/// Normalized landmarks may sit this far outside the crop before the
/// output is treated as garbage.
const LANDMARK_MARGIN: f32 = 1.0;

/// Landmarks and eye crops located in one face crop. All coordinates
/// are relative to the face crop.
#[derive(Clone, Debug)]
pub struct LandmarkDetection {
    pub left_eye: Frame,
    pub right_eye: Frame,
    /// Left, right.
    pub eye_regions: [Region<CropSpace>; 2],
    pub landmarks: LandmarkSet<CropSpace>,
}

/// Converts normalized `x, y` pairs to crop pixels, truncating.
pub fn denormalize_landmarks(values: &[f32], width: u32, height: u32) -> LandmarkSet<CropSpace> {
    let mut coords = [0i32; LANDMARK_VALUES];
    for (i, (slot, v)) in coords.iter_mut().zip(values).enumerate() {
        let extent = if i % 2 == 0 { width } else { height };
        *slot = (v * extent as f32) as i32;
    }
    LandmarkSet::from_coords(coords)
}

/// Square region of `half_width` around `center`, clamped on both sides
/// to the crop so it can always be used to slice the crop.
pub fn eye_region(
    center: Point<CropSpace>,
    half_width: i32,
    crop_width: u32,
    crop_height: u32,
) -> Result<Region<CropSpace>, RegionError> {
    Region::clamped(
        center.x.saturating_sub(half_width),
        center.y.saturating_sub(half_width),
        center.x.saturating_add(half_width),
        center.y.saturating_add(half_width),
        crop_width,
        crop_height,
    )
}

/// Rejects non-finite values and values far outside `[0, 1]`.
fn check_normalized(name: &str, values: &[f32]) -> Result<(), InferenceError> {
    let range = -LANDMARK_MARGIN..=1.0 + LANDMARK_MARGIN;
    match values.iter().find(|v| !range.contains(*v)) {
        Some(&value) => Err(InferenceError::InvalidValue {
            name: name.to_string(),
            value,
        }),
        None => Ok(()),
    }
}

/// Regresses five facial landmarks in a face crop and cuts out both eyes.
pub struct LandmarkStage {
    input_name: String,
    output_name: Option<String>,
    layout: InputLayout,
    eye_half_width: i32,
}

impl LandmarkStage {
    pub fn new(input_name: impl Into<String>, layout: InputLayout) -> Self {
        Self {
            input_name: input_name.into(),
            output_name: None,
            layout,
            eye_half_width: EYE_HALF_WIDTH,
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

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn with_eye_half_width(mut self, half_width: i32) -> Self {
        self.eye_half_width = half_width;
        self
    }
}

impl Stage for LandmarkStage {
    type Input<'a> = &'a Frame;
    type Output = LandmarkDetection;

    const KIND: StageKind = StageKind::Landmarks;

    fn encode(&self, face_crop: &&Frame) -> Result<NamedTensors, StageError> {
        let tensor = tensor_codec::encode(face_crop, &self.layout)?;
        Ok(NamedTensors::new().with(self.input_name.clone(), tensor.into_dyn()))
    }

    fn decode(&self, face_crop: &&Frame, outputs: &NamedTensors) -> Result<LandmarkDetection, StageError> {
        let (name, tensor) = match &self.output_name {
            Some(name) => (name.as_str(), outputs.require(name)?),
            None => outputs.primary()?,
        };
        let values = tensor_codec::leading_values(name, tensor, LANDMARK_VALUES)?;
        check_normalized(name, &values)?;

        let (w, h) = (face_crop.width(), face_crop.height());
        let landmarks = denormalize_landmarks(&values, w, h);

        let left = eye_region(landmarks.left_eye(), self.eye_half_width, w, h)?;
        let right = eye_region(landmarks.right_eye(), self.eye_half_width, w, h)?;

        Ok(LandmarkDetection {
            left_eye: face_crop.crop(&left)?,
            right_eye: face_crop.crop(&right)?,
            eye_regions: [left, right],
            landmarks,
        })
    }
}

pub type LandmarkLocator = StageRunner<LandmarkStage>;

impl StageRunner<LandmarkStage> {
    pub fn locate(&mut self, face_crop: &Frame) -> Result<Timed<LandmarkDetection>, StageError> {
        self.run(face_crop)
    }
}
