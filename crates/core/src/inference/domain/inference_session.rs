use std::time::Duration;

use ndarray::ArrayD;
use thiserror::Error;

/// Dense f32 tensor exchanged with the inference runtime.
pub type Tensor = ArrayD<f32>;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference runtime error: {0}")]
    Runtime(String),
    #[error("model produced no outputs")]
    NoOutputs,
    #[error("model output '{0}' not found")]
    MissingOutput(String),
    #[error("model output '{name}' has {actual} values, expected at least {expected}")]
    TooFewValues {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("model output '{name}' holds {value}, outside the expected range")]
    InvalidValue { name: String, value: f32 },
    #[error("model input '{0}' has no static NCHW shape")]
    InputShape(String),
    #[error("inference did not finish within {0:?}")]
    Timeout(Duration),
    #[error("inference worker is gone")]
    Disconnected,
}

/// Ordered collection of named tensors, used for both model inputs and
/// model outputs. Order follows the model's declaration order.
#[derive(Clone, Debug, Default)]
pub struct NamedTensors {
    entries: Vec<(String, Tensor)>,
}

impl NamedTensors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.push(name, tensor);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.entries.push((name.into(), tensor));
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    /// Like [`get`](Self::get) but reports a missing output as an error.
    pub fn require(&self, name: &str) -> Result<&Tensor, InferenceError> {
        self.get(name)
            .ok_or_else(|| InferenceError::MissingOutput(name.to_string()))
    }

    /// The first tensor, for single-output models.
    pub fn primary(&self) -> Result<(&str, &Tensor), InferenceError> {
        self.entries
            .first()
            .map(|(n, t)| (n.as_str(), t))
            .ok_or(InferenceError::NoOutputs)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for NamedTensors {
    type Item = (String, Tensor);
    type IntoIter = std::vec::IntoIter<(String, Tensor)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A loaded model that maps named input tensors to named output tensors.
///
/// This is the only seam between the pipeline and the inference runtime.
/// Calls block until the result is available.
pub trait InferenceSession: Send {
    /// Input names in declaration order.
    fn input_names(&self) -> Vec<String>;

    /// Declared shape of a named input; dynamic axes are reported as `-1`.
    fn input_shape(&self, name: &str) -> Option<Vec<i64>>;

    fn run(&mut self, inputs: NamedTensors) -> Result<NamedTensors, InferenceError>;
}

impl<T: InferenceSession + ?Sized> InferenceSession for Box<T> {
    fn input_names(&self) -> Vec<String> {
        (**self).input_names()
    }

    fn input_shape(&self, name: &str) -> Option<Vec<i64>> {
        (**self).input_shape(name)
    }

    fn run(&mut self, inputs: NamedTensors) -> Result<NamedTensors, InferenceError> {
        (**self).run(inputs)
    }
}
