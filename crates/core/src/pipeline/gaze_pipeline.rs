use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::detection::domain::face_detection_stage::{FaceDetector, FaceQuery};
use crate::detection::domain::landmark_stage::{LandmarkDetection, LandmarkLocator};
use crate::estimation::domain::gaze_stage::{GazeEstimator, GazeQuery};
use crate::estimation::domain::head_pose_stage::{HeadPoseEstimator, PoseEstimate};
use crate::inference::domain::stage::{Attempt, StageError, StageKind};
use crate::pipeline::frame_result::{FrameResult, FrameResultSink, StageTimings};
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::session_stats::{SessionReport, SessionStats};
use crate::pointer::domain::pointer_controller::{PointerController, ThrottledPointer};
use crate::shared::clock::{Clock, MonotonicClock};
use crate::shared::constants::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_POINTER_INTERVAL,
};
use crate::shared::frame::Frame;
use crate::video::domain::video_source::VideoSource;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("confidence threshold must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f32),
    #[error("pointer interval must be at least 1")]
    ZeroPointerInterval,
    #[error("consecutive failure limit must be at least 1")]
    ZeroFailureLimit,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("video source failed: {0}")]
    Source(String),
    #[error("result sink failed: {0}")]
    Sink(String),
    #[error("stopping after {failures} consecutive failed frames, last: {last}")]
    TooManyFailures { failures: usize, last: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub confidence_threshold: f32,
    /// Move the pointer once per this many processed frames.
    pub pointer_interval: usize,
    /// Consecutive inference failures tolerated before the stream stops.
    pub max_consecutive_failures: usize,
    /// Run head pose and landmarks on scoped threads.
    pub parallel_pose_landmarks: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            pointer_interval: DEFAULT_POINTER_INTERVAL,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            parallel_pose_landmarks: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ConfidenceOutOfRange(self.confidence_threshold));
        }
        if self.pointer_interval == 0 {
            return Err(ConfigError::ZeroPointerInterval);
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::ZeroFailureLimit);
        }
        Ok(())
    }
}

/// The four stage runners the pipeline chains together.
pub struct PipelineStages {
    pub face: FaceDetector,
    pub head_pose: HeadPoseEstimator,
    pub landmarks: LandmarkLocator,
    pub gaze: GazeEstimator,
}

impl PipelineStages {
    fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.face.set_clock(clock.clone());
        self.head_pose.set_clock(clock.clone());
        self.landmarks.set_clock(clock.clone());
        self.gaze.set_clock(clock);
    }
}

/// What happened to one frame.
#[derive(Debug)]
pub enum FrameOutcome {
    Emitted(Box<FrameResult>),
    NoFace,
    Failed { stage: StageKind, error: StageError },
}

/// Runs face detection, head pose, landmarks and gaze on every frame of a
/// source, emits results, drives the pointer and keeps the statistics.
pub struct GazePipeline {
    stages: PipelineStages,
    config: PipelineConfig,
    pointer: Option<ThrottledPointer>,
    sinks: Vec<Box<dyn FrameResultSink>>,
    logger: Box<dyn PipelineLogger>,
    clock: Arc<dyn Clock>,
    cancelled: Arc<AtomicBool>,
    stats: SessionStats,
}

impl GazePipeline {
    pub fn new(stages: PipelineStages, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            stages,
            config,
            pointer: None,
            sinks: Vec::new(),
            logger: Box::new(NullPipelineLogger),
            clock: Arc::new(MonotonicClock::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            stats: SessionStats::new(),
        })
    }

    pub fn with_pointer(mut self, pointer: Box<dyn PointerController>) -> Self {
        self.pointer = Some(ThrottledPointer::new(pointer, self.config.pointer_interval));
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn FrameResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Replaces the clock used for frame latency and every stage's timing.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.stages.set_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Stops [`run`](Self::run) before the next frame once the flag is set.
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn with_model_load_time(mut self, kind: StageKind, ms: f64) -> Self {
        self.stats.set_model_load_ms(kind, ms);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Processes frames until the source is exhausted, a stop is requested
    /// or a fatal error occurs. The report is logged in every case.
    pub fn run(&mut self, source: &mut dyn VideoSource) -> Result<SessionReport, PipelineError> {
        self.stats.set_source_fps(source.fps());
        let mut consecutive_failures = 0usize;

        let outcome = loop {
            if self.cancelled.load(Ordering::Relaxed) {
                self.logger.info("Stop requested, ending stream");
                break Ok(());
            }
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => break Err(PipelineError::Source(e.to_string())),
            };

            match self.process_frame(&frame) {
                Ok(FrameOutcome::Emitted(_)) => consecutive_failures = 0,
                Ok(FrameOutcome::NoFace) => {}
                Ok(FrameOutcome::Failed { error, .. }) if error.is_backend_failure() => {
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        break Err(PipelineError::TooManyFailures {
                            failures: consecutive_failures,
                            last: error.to_string(),
                        });
                    }
                }
                Ok(FrameOutcome::Failed { .. }) => {}
                Err(e) => break Err(e),
            }
            self.logger.progress(self.stats.frames());
        };

        source.close();
        let report = self.stats.report();
        self.logger.summary(&report);
        match outcome {
            Ok(()) => Ok(report),
            Err(e) => {
                log::error!("{e}");
                Err(e)
            }
        }
    }

    /// Runs every stage on one frame and updates statistics, sinks and
    /// pointer. Stage failures are reported in the outcome; only sink
    /// failures are errors.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameOutcome, PipelineError> {
        let start = self.clock.now();
        let inferred = self.infer(frame);
        self.stats.record_frame(self.clock.elapsed_ms(start));

        let result = match inferred {
            Ok(result) => result,
            Err((stage, error)) => {
                self.logger.skipped(frame.index(), stage, &error);
                if error.is_no_face() {
                    self.stats.record_no_face();
                    return Ok(FrameOutcome::NoFace);
                }
                self.stats.record_failure();
                return Ok(FrameOutcome::Failed { stage, error });
            }
        };

        for sink in &mut self.sinks {
            sink.consume(frame, &result)
                .map_err(|e| PipelineError::Sink(e.to_string()))?;
        }
        self.stats.record_emitted();

        if let Some(pointer) = self.pointer.as_mut() {
            match pointer.on_gaze(&result.gaze) {
                Ok(true) => self.stats.record_pointer_move(),
                Ok(false) => {}
                Err(e) => log::warn!("Frame {}: pointer move failed: {e}", frame.index()),
            }
        }

        Ok(FrameOutcome::Emitted(Box::new(result)))
    }

    /// Runs the stages in order. Each stage's inference time is recorded
    /// as soon as it returns, whether or not it succeeded.
    fn infer(&mut self, frame: &Frame) -> Result<FrameResult, (StageKind, StageError)> {
        let mut timings = StageTimings::default();

        let face = self.stages.face.attempt(FaceQuery {
            frame,
            threshold: self.config.confidence_threshold,
        });
        let face = self.settle(&mut timings, StageKind::FaceDetection, face)?;

        let (pose, landmarks) = self.pose_and_landmarks(&mut timings, &face.crop)?;

        let gaze = self.stages.gaze.attempt(GazeQuery {
            left_eye: &landmarks.left_eye,
            right_eye: &landmarks.right_eye,
            pose,
        });
        let gaze = self.settle(&mut timings, StageKind::Gaze, gaze)?;

        let [left, right] = landmarks.eye_regions;
        Ok(FrameResult {
            frame_index: frame.index(),
            face_box: face.face_box,
            face_confidence: face.confidence,
            pose,
            landmarks: landmarks.landmarks.to_frame(&face.face_box),
            eye_regions: [left.to_frame(&face.face_box), right.to_frame(&face.face_box)],
            gaze,
            timings,
        })
    }

    fn pose_and_landmarks(
        &mut self,
        timings: &mut StageTimings,
        crop: &Frame,
    ) -> Result<(PoseEstimate, LandmarkDetection), (StageKind, StageError)> {
        if !self.config.parallel_pose_landmarks {
            let pose = self.stages.head_pose.attempt(crop);
            let pose = self.settle(timings, StageKind::HeadPose, pose)?;
            let landmarks = self.stages.landmarks.attempt(crop);
            let landmarks = self.settle(timings, StageKind::Landmarks, landmarks)?;
            return Ok((pose, landmarks));
        }

        let head_pose = &mut self.stages.head_pose;
        let locator = &mut self.stages.landmarks;
        let (pose, landmarks) = std::thread::scope(|s| {
            let handle = s.spawn(|| head_pose.attempt(crop));
            let landmarks = locator.attempt(crop);
            let pose = handle
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (pose, landmarks)
        });

        // both timings count before either error is reported
        let pose = self.settle(timings, StageKind::HeadPose, pose);
        let landmarks = self.settle(timings, StageKind::Landmarks, landmarks);
        Ok((pose?, landmarks?))
    }

    /// Records a stage's inference time, if the session ran, and tags its
    /// error with the stage.
    fn settle<T>(
        &mut self,
        timings: &mut StageTimings,
        kind: StageKind,
        attempt: Attempt<T>,
    ) -> Result<T, (StageKind, StageError)> {
        if let Some(ms) = attempt.elapsed_ms {
            timings.set(kind, ms);
            self.stats.record_stage(kind, ms);
            self.logger.timing(kind.name(), ms);
        }
        attempt.result.map_err(|e| (kind, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pointer_interval, 4);
        assert_eq!(config.max_consecutive_failures, 10);
        assert!((config.confidence_threshold - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let bad_conf = PipelineConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert_eq!(bad_conf.validate(), Err(ConfigError::ConfidenceOutOfRange(1.5)));

        let zero_interval = PipelineConfig {
            pointer_interval: 0,
            ..Default::default()
        };
        assert_eq!(zero_interval.validate(), Err(ConfigError::ZeroPointerInterval));

        let zero_limit = PipelineConfig {
            max_consecutive_failures: 0,
            ..Default::default()
        };
        assert_eq!(zero_limit.validate(), Err(ConfigError::ZeroFailureLimit));
    }

    #[test]
    fn test_nan_confidence_is_rejected() {
        let config = PipelineConfig {
            confidence_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ConfidenceOutOfRange(_))
        ));
    }
}
