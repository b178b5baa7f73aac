//! ONNX Runtime backed [`InferenceSession`] via `ort`.
use std::path::Path;

use ort::session::Session;
use ort::value::{DynValue, ValueType};

use crate::inference::domain::inference_session::{InferenceError, InferenceSession, NamedTensors};
use crate::inference::infrastructure::execution_provider::{execution_providers, Device};

pub struct OnnxSession {
    session: Session,
    inputs: Vec<(String, Option<Vec<i64>>)>,
}

impl OnnxSession {
    /// Load an ONNX model onto `device`.
    ///
    /// Input names and declared shapes are read once here so stages can
    /// size their tensors without touching the runtime.
    pub fn load(model_path: &Path, device: Device) -> Result<Self, Box<dyn std::error::Error>> {
        let providers = execution_providers(device)?;
        let mut builder = Session::builder()?;
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers)?;
        }
        let session = builder.commit_from_file(model_path)?;

        let inputs = session
            .inputs()
            .iter()
            .map(|input| {
                let shape = if let ValueType::Tensor { ref shape, .. } = input.dtype() {
                    Some(shape.iter().copied().collect())
                } else {
                    None
                };
                (input.name().to_string(), shape)
            })
            .collect();

        log::debug!("Loaded {} on {device}", model_path.display());
        Ok(Self { session, inputs })
    }
}

impl InferenceSession for OnnxSession {
    fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|(name, _)| name.clone()).collect()
    }

    fn input_shape(&self, name: &str) -> Option<Vec<i64>> {
        self.inputs
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, shape)| shape.clone())
    }

    fn run(&mut self, inputs: NamedTensors) -> Result<NamedTensors, InferenceError> {
        let values = inputs
            .into_iter()
            .map(|(name, tensor)| {
                let value: DynValue = ort::value::Tensor::from_array(tensor)
                    .map_err(runtime)?
                    .into_dyn();
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, InferenceError>>()?;

        let outputs = self.session.run(values).map_err(runtime)?;
        if outputs.len() == 0 {
            return Err(InferenceError::NoOutputs);
        }

        let mut named = NamedTensors::new();
        for (name, value) in outputs.iter() {
            let array = value.try_extract_array::<f32>().map_err(runtime)?;
            named.push(name, array.to_owned().into_dyn());
        }
        Ok(named)
    }
}

fn runtime(err: impl std::fmt::Display) -> InferenceError {
    InferenceError::Runtime(err.to_string())
}
