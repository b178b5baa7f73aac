use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::inference::domain::stage::StageKind;

/// Accumulated latency of one kind of call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StageTiming {
    pub total_ms: f64,
    pub count: usize,
}

impl StageTiming {
    pub fn record(&mut self, ms: f64) {
        self.total_ms += ms;
        self.count += 1;
    }

    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

/// Counters and latency accumulators for one run of the pipeline.
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    frames: usize,
    frames_without_face: usize,
    failed_frames: usize,
    emitted: usize,
    pointer_moves: usize,
    stages: BTreeMap<StageKind, StageTiming>,
    frame_latency: StageTiming,
    model_load_ms: BTreeMap<StageKind, f64>,
    source_fps: Option<f64>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a frame and its end-to-end latency, whatever its outcome.
    pub fn record_frame(&mut self, latency_ms: f64) {
        self.frames += 1;
        self.frame_latency.record(latency_ms);
    }

    pub fn record_stage(&mut self, kind: StageKind, ms: f64) {
        self.stages.entry(kind).or_default().record(ms);
    }

    pub fn record_no_face(&mut self) {
        self.frames_without_face += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed_frames += 1;
    }

    pub fn record_emitted(&mut self) {
        self.emitted += 1;
    }

    pub fn record_pointer_move(&mut self) {
        self.pointer_moves += 1;
    }

    pub fn set_model_load_ms(&mut self, kind: StageKind, ms: f64) {
        self.model_load_ms.insert(kind, ms);
    }

    pub fn set_source_fps(&mut self, fps: Option<f64>) {
        self.source_fps = fps;
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn frames_without_face(&self) -> usize {
        self.frames_without_face
    }

    pub fn failed_frames(&self) -> usize {
        self.failed_frames
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn pointer_moves(&self) -> usize {
        self.pointer_moves
    }

    pub fn stage(&self, kind: StageKind) -> StageTiming {
        self.stages.get(&kind).copied().unwrap_or_default()
    }

    pub fn frame_latency(&self) -> StageTiming {
        self.frame_latency
    }

    pub fn report(&self) -> SessionReport {
        let stages = StageKind::ALL
            .iter()
            .map(|&kind| {
                let timing = self.stage(kind);
                StageReport {
                    stage: kind.name(),
                    calls: timing.count,
                    average_ms: timing.average_ms(),
                    total_ms: timing.total_ms,
                    model_load_ms: self.model_load_ms.get(&kind).copied(),
                }
            })
            .collect();

        let total_s = self.frame_latency.total_ms / 1000.0;
        SessionReport {
            frames: self.frames,
            frames_without_face: self.frames_without_face,
            failed_frames: self.failed_frames,
            emitted_results: self.emitted,
            pointer_moves: self.pointer_moves,
            average_frame_ms: self.frame_latency.average_ms(),
            throughput_fps: (total_s > 0.0).then(|| self.frames as f64 / total_s),
            source_fps: self.source_fps,
            stages,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub calls: usize,
    pub average_ms: f64,
    pub total_ms: f64,
    pub model_load_ms: Option<f64>,
}

/// End-of-stream summary, printable and serializable to JSON.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionReport {
    pub frames: usize,
    pub frames_without_face: usize,
    pub failed_frames: usize,
    pub emitted_results: usize,
    pub pointer_moves: usize,
    pub average_frame_ms: f64,
    /// Frames per second of processing time.
    pub throughput_fps: Option<f64>,
    pub source_fps: Option<f64>,
    pub stages: Vec<StageReport>,
}

impl SessionReport {
    pub fn stage(&self, kind: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == kind.name())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Session summary ({} frames, {} without face, {} failed, {} results):",
            self.frames, self.frames_without_face, self.failed_frames, self.emitted_results
        )?;
        for s in &self.stages {
            write!(
                f,
                "  {:14}: avg {:6.1}ms over {:5} calls",
                s.stage, s.average_ms, s.calls
            )?;
            if let Some(load) = s.model_load_ms {
                write!(f, "  (load {load:.0}ms)")?;
            }
            writeln!(f)?;
        }
        write!(f, "  Frame latency: avg {:.1}ms", self.average_frame_ms)?;
        if let Some(fps) = self.throughput_fps {
            write!(f, "\n  Throughput: {fps:.1} fps")?;
        }
        if let Some(fps) = self.source_fps {
            write!(f, "\n  Source: {fps:.1} fps")?;
        }
        write!(f, "\n  Pointer moves: {}", self.pointer_moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stage_average_is_total_over_calls() {
        let mut stats = SessionStats::new();
        stats.record_stage(StageKind::Gaze, 4.0);
        stats.record_stage(StageKind::Gaze, 6.0);
        stats.record_stage(StageKind::Gaze, 8.0);

        let gaze = stats.stage(StageKind::Gaze);
        assert_eq!(gaze.count, 3);
        assert_relative_eq!(gaze.average_ms(), 6.0);
        assert_eq!(stats.stage(StageKind::HeadPose).count, 0);
        assert_relative_eq!(stats.stage(StageKind::HeadPose).average_ms(), 0.0);
    }

    #[test]
    fn test_report_covers_every_stage_in_order() {
        let mut stats = SessionStats::new();
        stats.set_model_load_ms(StageKind::FaceDetection, 120.0);
        let report = stats.report();

        let names: Vec<_> = report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(names, vec!["face_detection", "head_pose", "landmarks", "gaze"]);
        assert_eq!(
            report.stage(StageKind::FaceDetection).unwrap().model_load_ms,
            Some(120.0)
        );
        assert_eq!(report.stage(StageKind::Gaze).unwrap().model_load_ms, None);
    }

    #[test]
    fn test_frame_counters_and_throughput() {
        let mut stats = SessionStats::new();
        for _ in 0..4 {
            stats.record_frame(25.0);
        }
        stats.record_no_face();
        stats.record_failure();
        stats.record_emitted();
        stats.record_emitted();

        let report = stats.report();
        assert_eq!(report.frames, 4);
        assert_eq!(report.frames_without_face, 1);
        assert_eq!(report.failed_frames, 1);
        assert_eq!(report.emitted_results, 2);
        assert_relative_eq!(report.average_frame_ms, 25.0);
        assert_relative_eq!(report.throughput_fps.unwrap(), 40.0);
    }

    #[test]
    fn test_empty_session_has_no_throughput() {
        let report = SessionStats::new().report();
        assert_eq!(report.frames, 0);
        assert!(report.throughput_fps.is_none());
        assert_relative_eq!(report.average_frame_ms, 0.0);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut stats = SessionStats::new();
        stats.record_frame(10.0);
        stats.record_stage(StageKind::HeadPose, 2.0);
        stats.set_source_fps(Some(30.0));

        let value: serde_json::Value = serde_json::from_str(&stats.report().to_json().unwrap()).unwrap();
        assert_eq!(value["frames"], 1);
        assert_eq!(value["source_fps"], 30.0);
        assert_eq!(value["stages"][1]["stage"], "head_pose");
        assert_eq!(value["stages"][1]["calls"], 1);
    }

    #[test]
    fn test_display_mentions_each_stage() {
        let mut stats = SessionStats::new();
        stats.record_frame(10.0);
        let text = stats.report().to_string();
        assert!(text.contains("Session summary (1 frames"));
        for kind in StageKind::ALL {
            assert!(text.contains(kind.name()));
        }
    }
}
