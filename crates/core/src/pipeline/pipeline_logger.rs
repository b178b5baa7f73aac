use std::collections::{BTreeMap, HashMap};

use crate::inference::domain::stage::{StageError, StageKind};
use crate::pipeline::session_stats::SessionReport;

/// Receives pipeline events: progress, stage timings, skipped frames.
pub trait PipelineLogger: Send {
    /// Report how many frames have been read so far.
    fn progress(&mut self, frames: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A frame was skipped because `stage` failed.
    fn skipped(&mut self, frame_index: usize, stage: StageKind, error: &StageError);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit the end-of-stream summary. Default: no-op.
    fn summary(&self, _report: &SessionReport) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _frames: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn skipped(&mut self, _frame_index: usize, _stage: StageKind, _error: &StageError) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI-oriented logger: throttled progress, per-frame skip reasons, peak
/// stage latencies and the final report through the `log` facade.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    peak_ms: HashMap<String, f64>,
    skips: BTreeMap<StageKind, usize>,
    messages: Vec<String>,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            peak_ms: HashMap::new(),
            skips: BTreeMap::new(),
            messages: Vec::new(),
        }
    }

    /// Slowest single call recorded for `stage`.
    pub fn peak_for(&self, stage: &str) -> Option<f64> {
        self.peak_ms.get(stage).copied()
    }

    /// Frames skipped because of `stage`.
    pub fn skips_for(&self, stage: StageKind) -> usize {
        self.skips.get(&stage).copied().unwrap_or(0)
    }

    pub fn summary_string(&self, report: &SessionReport) -> String {
        let mut text = report.to_string();
        let mut stages: Vec<_> = self.peak_ms.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, peak) in stages {
            text.push_str(&format!("\n  {stage:14}: peak {peak:6.1}ms"));
        }
        for (stage, count) in &self.skips {
            text.push_str(&format!("\n  skipped at {stage}: {count}"));
        }
        text
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(crate::shared::constants::DEFAULT_PROGRESS_INTERVAL)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, frames: usize) {
        if frames % self.throttle_frames == 0 {
            log::info!("Processed {frames} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        let peak = self.peak_ms.entry(stage.to_string()).or_insert(0.0);
        if duration_ms > *peak {
            *peak = duration_ms;
        }
    }

    fn skipped(&mut self, frame_index: usize, stage: StageKind, error: &StageError) {
        *self.skips.entry(stage).or_default() += 1;
        if error.is_no_face() {
            log::info!("Frame {frame_index}: {error}, skipping");
        } else {
            log::warn!("Frame {frame_index}: {stage} failed: {error}");
        }
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self, report: &SessionReport) {
        log::info!("\n\n{}", self.summary_string(report));
    }
}
