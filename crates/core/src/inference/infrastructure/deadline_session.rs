use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::inference::domain::inference_session::{InferenceError, InferenceSession, NamedTensors};

type Response = (u64, Result<NamedTensors, InferenceError>);

/// Bounds every inference call by a deadline.
///
/// The wrapped session runs on its own worker thread. A call that misses
/// the deadline returns [`InferenceError::Timeout`]; the worker keeps going
/// and its late answer is discarded. Until that answer arrives the session
/// is busy and further calls time out immediately.
pub struct DeadlineSession {
    timeout: Duration,
    inputs: Vec<(String, Option<Vec<i64>>)>,
    requests: Option<Sender<(u64, NamedTensors)>>,
    responses: Receiver<Response>,
    next_seq: u64,
    in_flight: Option<u64>,
    worker: Option<JoinHandle<()>>,
}

impl DeadlineSession {
    pub fn new(inner: Box<dyn InferenceSession>, timeout: Duration) -> Self {
        let inputs = inner
            .input_names()
            .into_iter()
            .map(|name| {
                let shape = inner.input_shape(&name);
                (name, shape)
            })
            .collect();

        let (req_tx, req_rx) = bounded::<(u64, NamedTensors)>(1);
        let (resp_tx, resp_rx) = bounded::<Response>(1);
        let worker = std::thread::spawn(move || {
            let mut inner = inner;
            while let Ok((seq, inputs)) = req_rx.recv() {
                let result = inner.run(inputs);
                if resp_tx.send((seq, result)).is_err() {
                    break;
                }
            }
        });

        Self {
            timeout,
            inputs,
            requests: Some(req_tx),
            responses: resp_rx,
            next_seq: 0,
            in_flight: None,
            worker: Some(worker),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Collects a late answer if one has arrived. Returns `true` when the
    /// worker is free.
    fn drain_late_response(&mut self) -> Result<bool, InferenceError> {
        let Some(stale) = self.in_flight else {
            return Ok(true);
        };
        loop {
            match self.responses.try_recv() {
                Ok((seq, _)) if seq == stale => {
                    log::debug!("Discarded late inference result #{seq}");
                    self.in_flight = None;
                    return Ok(true);
                }
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return Ok(false),
                Err(TryRecvError::Disconnected) => return Err(InferenceError::Disconnected),
            }
        }
    }
}

impl InferenceSession for DeadlineSession {
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
        if !self.drain_late_response()? {
            return Err(InferenceError::Timeout(self.timeout));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let requests = self.requests.as_ref().ok_or(InferenceError::Disconnected)?;
        requests
            .send((seq, inputs))
            .map_err(|_| InferenceError::Disconnected)?;

        loop {
            match self.responses.recv_timeout(self.timeout) {
                Ok((got, result)) if got == seq => return result,
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    self.in_flight = Some(seq);
                    return Err(InferenceError::Timeout(self.timeout));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(InferenceError::Disconnected),
            }
        }
    }
}

impl Drop for DeadlineSession {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if self.in_flight.is_none() {
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
        }
    }
}
