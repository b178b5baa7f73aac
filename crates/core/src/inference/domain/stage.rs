use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::inference::domain::inference_session::{InferenceError, InferenceSession, NamedTensors};
use crate::shared::clock::{Clock, MonotonicClock};
use crate::shared::region::RegionError;

/// The four inference steps of the gaze pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    FaceDetection,
    HeadPose,
    Landmarks,
    Gaze,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::FaceDetection,
        StageKind::HeadPose,
        StageKind::Landmarks,
        StageKind::Gaze,
    ];

    /// Stable identifier used for timing keys and reports.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::FaceDetection => "face_detection",
            StageKind::HeadPose => "head_pose",
            StageKind::Landmarks => "landmarks",
            StageKind::Gaze => "gaze",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("empty region: {0}")]
    EmptyRegion(#[from] RegionError),
    #[error("no face detected above confidence {threshold}")]
    NoFaceDetected { threshold: f32 },
    #[error("inference failed: {0}")]
    Inference(InferenceError),
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
}

impl StageError {
    /// Expected during normal operation; says nothing about backend health.
    pub fn is_no_face(&self) -> bool {
        matches!(self, StageError::NoFaceDetected { .. })
    }

    /// Errors that point at the inference backend rather than the frame.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, StageError::Inference(_) | StageError::Timeout(_))
    }
}

impl From<InferenceError> for StageError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Timeout(limit) => StageError::Timeout(limit),
            other => StageError::Inference(other),
        }
    }
}

/// A stage's output together with the time spent in inference.
#[derive(Clone, Debug, PartialEq)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed_ms: f64,
}

/// Outcome of one stage call. `elapsed_ms` is set whenever the session was
/// invoked, including when the session or the decode step failed.
#[derive(Debug)]
pub struct Attempt<T> {
    pub result: Result<T, StageError>,
    pub elapsed_ms: Option<f64>,
}

impl<T> Attempt<T> {
    pub fn into_timed(self) -> Result<Timed<T>, StageError> {
        let elapsed_ms = self.elapsed_ms.unwrap_or(0.0);
        self.result.map(|value| Timed { value, elapsed_ms })
    }
}

/// Model-specific half of a pipeline stage: how to build the model's
/// inputs and how to read its outputs.
///
/// Implemented by the four stage types; [`StageRunner`] supplies the
/// shared run-and-measure behavior.
pub trait Stage: Send {
    type Input<'a>;
    type Output;

    const KIND: StageKind;

    fn encode(&self, input: &Self::Input<'_>) -> Result<NamedTensors, StageError>;

    fn decode(
        &self,
        input: &Self::Input<'_>,
        outputs: &NamedTensors,
    ) -> Result<Self::Output, StageError>;
}

/// Owns a stage's inference session and runs encode, infer, decode.
pub struct StageRunner<S: Stage> {
    stage: S,
    session: Box<dyn InferenceSession>,
    clock: Arc<dyn Clock>,
}

impl<S: Stage> StageRunner<S> {
    pub fn new(stage: S, session: Box<dyn InferenceSession>) -> Self {
        Self {
            stage,
            session,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub fn kind(&self) -> StageKind {
        S::KIND
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    /// Runs one inference. Only the session call is timed, matching the
    /// per-stage inference latency reported at stream end.
    pub fn run(&mut self, input: S::Input<'_>) -> Result<Timed<S::Output>, StageError> {
        self.attempt(input).into_timed()
    }

    /// Like [`run`](Self::run) but keeps the inference time of failed calls.
    pub fn attempt(&mut self, input: S::Input<'_>) -> Attempt<S::Output> {
        let inputs = match self.stage.encode(&input) {
            Ok(inputs) => inputs,
            Err(e) => {
                return Attempt {
                    result: Err(e),
                    elapsed_ms: None,
                }
            }
        };
        let start = self.clock.now();
        let outputs = self.session.run(inputs);
        let elapsed_ms = self.clock.elapsed_ms(start);
        log::trace!("{} inference took {elapsed_ms:.2}ms", S::KIND);

        let result = outputs
            .map_err(StageError::from)
            .and_then(|outputs| self.stage.decode(&input, &outputs));
        Attempt {
            result,
            elapsed_ms: Some(elapsed_ms),
        }
    }
}

/// Name and layout of a session's first declared input.
pub(crate) fn first_input(
    session: &dyn InferenceSession,
) -> Result<(String, Option<Vec<i64>>), InferenceError> {
    let name = session
        .input_names()
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::InputShape("<none>".to_string()))?;
    let shape = session.input_shape(&name);
    Ok((name, shape))
}
