use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use clap::Parser;

use gaze_pointer_core::detection::domain::face_detection_stage::{FaceDetectionStage, SelectionPolicy};
use gaze_pointer_core::detection::domain::landmark_stage::LandmarkStage;
use gaze_pointer_core::estimation::domain::gaze_stage::GazeStage;
use gaze_pointer_core::estimation::domain::head_pose_stage::HeadPoseStage;
use gaze_pointer_core::inference::domain::inference_session::InferenceSession;
use gaze_pointer_core::inference::domain::stage::{Stage, StageKind, StageRunner};
use gaze_pointer_core::inference::infrastructure::deadline_session::DeadlineSession;
use gaze_pointer_core::inference::infrastructure::execution_provider::Device;
use gaze_pointer_core::inference::infrastructure::model_resolver;
use gaze_pointer_core::inference::infrastructure::onnx_session::OnnxSession;
use gaze_pointer_core::pipeline::gaze_pipeline::{GazePipeline, PipelineConfig, PipelineStages};
use gaze_pointer_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use gaze_pointer_core::pointer::domain::pointer_controller::{PointerPrecision, ScaledPointer};
use gaze_pointer_core::pointer::infrastructure::log_pointer::LoggingPointerController;
use gaze_pointer_core::shared::constants::{CAMERA_INPUT, IMAGE_EXTENSIONS};
use gaze_pointer_core::video::domain::video_source::VideoSource;
use gaze_pointer_core::video::infrastructure::ffmpeg_source::FfmpegSource;
use gaze_pointer_core::video::infrastructure::image_file_source::ImageFileSource;
use gaze_pointer_core::visualization::domain::frame_annotator::FrameAnnotator;
use gaze_pointer_core::visualization::domain::overlay_flags::OverlayFlags;
use gaze_pointer_core::visualization::domain::overlay_text_sink::OverlayTextSink;
use gaze_pointer_core::visualization::infrastructure::annotated_frame_writer::AnnotatedFrameWriter;

/// Moves the pointer where you look, estimated from a camera or video.
#[derive(Parser)]
#[command(name = "gaze-pointer")]
struct Cli {
    /// Face detection model (.onnx path or cached file name).
    #[arg(long)]
    face_model: String,

    /// Head pose estimation model.
    #[arg(long)]
    head_pose_model: String,

    /// Facial landmarks model.
    #[arg(long)]
    landmarks_model: String,

    /// Gaze estimation model.
    #[arg(long)]
    gaze_model: String,

    /// Video file, image file, or "cam" for the default camera.
    #[arg(short, long, default_value = CAMERA_INPUT)]
    input: String,

    /// Inference device: CPU, AUTO, COREML or DIRECTML.
    #[arg(short, long, default_value = "CPU")]
    device: String,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    prob_threshold: f32,

    /// Intermediate results to show: any of F (face), H (head pose),
    /// L (landmarks), G (gaze), e.g. "FHLG".
    #[arg(long, default_value = "")]
    visualize: String,

    /// Write annotated frames as PNG images to this directory.
    #[arg(long)]
    annotate_dir: Option<PathBuf>,

    /// Move the pointer once every N processed frames.
    #[arg(long, default_value = "4")]
    pointer_interval: usize,

    /// Pointer precision: high, medium or low.
    #[arg(long, default_value = "medium")]
    precision: String,

    /// Which face to use when several are detected: highest, first or last.
    #[arg(long, default_value = "highest")]
    face_selection: String,

    /// Stop after this many consecutive failed frames.
    #[arg(long, default_value = "10")]
    max_failures: usize,

    /// Abort a single inference call after this many milliseconds.
    #[arg(long)]
    inference_timeout_ms: Option<u64>,

    /// Run head pose and landmarks concurrently.
    #[arg(long)]
    parallel: bool,

    /// Download missing models from this base URL into the cache.
    #[arg(long)]
    model_base_url: Option<String>,

    /// Write the session report as JSON to this file.
    #[arg(long)]
    report_json: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = validate(&cli)?;

    let config = PipelineConfig {
        confidence_threshold: cli.prob_threshold,
        pointer_interval: cli.pointer_interval,
        max_consecutive_failures: cli.max_failures,
        parallel_pose_landmarks: cli.parallel,
    };

    let timeout = cli.inference_timeout_ms.map(Duration::from_millis);
    let face = load_model(&cli, &cli.face_model, StageKind::FaceDetection, settings.device, timeout)?;
    let head_pose = load_model(&cli, &cli.head_pose_model, StageKind::HeadPose, settings.device, timeout)?;
    let landmarks = load_model(&cli, &cli.landmarks_model, StageKind::Landmarks, settings.device, timeout)?;
    let gaze = load_model(&cli, &cli.gaze_model, StageKind::Gaze, settings.device, timeout)?;

    let load_times = [
        (StageKind::FaceDetection, face.load_ms),
        (StageKind::HeadPose, head_pose.load_ms),
        (StageKind::Landmarks, landmarks.load_ms),
        (StageKind::Gaze, gaze.load_ms),
    ];

    let stages = PipelineStages {
        face: runner(
            FaceDetectionStage::for_session(face.session.as_ref())?.with_policy(settings.policy),
            face.session,
        ),
        head_pose: runner(HeadPoseStage::for_session(head_pose.session.as_ref())?, head_pose.session),
        landmarks: runner(LandmarkStage::for_session(landmarks.session.as_ref())?, landmarks.session),
        gaze: runner(GazeStage::new(), gaze.session),
    };

    let pointer = ScaledPointer::new(LoggingPointerController::new(), settings.precision);
    let mut pipeline = GazePipeline::new(stages, config)?
        .with_pointer(Box::new(pointer))
        .with_logger(Box::new(StdoutPipelineLogger::default()));
    for (kind, ms) in load_times {
        pipeline = pipeline.with_model_load_time(kind, ms);
    }
    if !settings.overlay.is_empty() {
        pipeline = pipeline.with_sink(Box::new(OverlayTextSink::new(settings.overlay)));
    }
    if let Some(dir) = &cli.annotate_dir {
        let annotator = FrameAnnotator::new(annotation_flags(settings.overlay));
        pipeline = pipeline.with_sink(Box::new(AnnotatedFrameWriter::new(dir, annotator)?));
        log::info!("Writing annotated frames to {}", dir.display());
    }

    let mut source = open_source(&cli.input)?;
    let report = pipeline.run(source.as_mut())?;

    if let Some(path) = &cli.report_json {
        fs::write(path, report.to_json()?)?;
        log::info!("Report written to {}", path.display());
    }
    Ok(())
}

/// Arguments that parse into typed values.
struct Settings {
    device: Device,
    precision: PointerPrecision,
    policy: SelectionPolicy,
    overlay: OverlayFlags,
}

fn validate(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    if !is_camera(&cli.input) && !Path::new(&cli.input).exists() {
        return Err(format!("Input file not found: {}", cli.input).into());
    }
    if !(0.0..=1.0).contains(&cli.prob_threshold) {
        return Err(format!(
            "Probability threshold must be between 0.0 and 1.0, got {}",
            cli.prob_threshold
        )
        .into());
    }
    if cli.pointer_interval == 0 {
        return Err("Pointer interval must be at least 1".into());
    }
    if cli.max_failures == 0 {
        return Err("Max failures must be at least 1".into());
    }
    if cli.inference_timeout_ms == Some(0) {
        return Err("Inference timeout must be at least 1ms".into());
    }

    Ok(Settings {
        device: cli.device.parse()?,
        precision: cli.precision.parse()?,
        policy: cli.face_selection.parse()?,
        overlay: OverlayFlags::parse(&cli.visualize)?,
    })
}

struct LoadedModel {
    session: Box<dyn InferenceSession>,
    load_ms: f64,
}

fn load_model(
    cli: &Cli,
    model: &str,
    kind: StageKind,
    device: Device,
    timeout: Option<Duration>,
) -> Result<LoadedModel, Box<dyn std::error::Error>> {
    log::info!("Resolving {kind} model: {model}");
    let path = model_resolver::resolve(
        model,
        cli.model_base_url.as_deref(),
        Some(Box::new(download_progress)),
    )?;

    let start = Instant::now();
    let onnx = OnnxSession::load(&path, device)?;
    let load_ms = start.elapsed().as_secs_f64() * 1000.0;
    log::info!("Loaded {} in {load_ms:.0}ms on {device}", path.display());

    let session: Box<dyn InferenceSession> = match timeout {
        Some(limit) => Box::new(DeadlineSession::new(Box::new(onnx), limit)),
        None => Box::new(onnx),
    };
    Ok(LoadedModel { session, load_ms })
}

fn runner<S: Stage>(stage: S, session: Box<dyn InferenceSession>) -> StageRunner<S> {
    StageRunner::new(stage, session)
}

/// Annotated frames always show something: without explicit flags,
/// draw every overlay.
fn annotation_flags(overlay: OverlayFlags) -> OverlayFlags {
    if overlay.draws_geometry() {
        overlay
    } else {
        OverlayFlags::all()
    }
}

fn is_camera(input: &str) -> bool {
    input.eq_ignore_ascii_case(CAMERA_INPUT)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn open_source(input: &str) -> Result<Box<dyn VideoSource>, Box<dyn std::error::Error>> {
    if is_camera(input) {
        return Ok(Box::new(FfmpegSource::open_camera()?));
    }
    let path = Path::new(input);
    if is_image(path) {
        Ok(Box::new(ImageFileSource::open(path)?))
    } else {
        Ok(Box::new(FfmpegSource::open(path)?))
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let base = [
            "gaze-pointer",
            "--face-model",
            "face.onnx",
            "--head-pose-model",
            "pose.onnx",
            "--landmarks-model",
            "lm.onnx",
            "--gaze-model",
            "gaze.onnx",
        ];
        Cli::parse_from(base.iter().chain(args))
    }

    #[test]
    fn test_defaults_validate() {
        let settings = validate(&cli(&[])).unwrap();
        assert_eq!(settings.device, Device::Cpu);
        assert_eq!(settings.precision, PointerPrecision::Medium);
        assert_eq!(settings.policy, SelectionPolicy::HighestConfidence);
        assert!(settings.overlay.is_empty());
    }

    #[test]
    fn test_rejects_unknown_device() {
        assert!(validate(&cli(&["--device", "TPU"])).is_err());
    }

    #[test]
    fn test_rejects_unknown_visualization_flag() {
        assert!(validate(&cli(&["--visualize", "FX"])).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        assert!(validate(&cli(&["--prob-threshold", "1.5"])).is_err());
    }

    #[test]
    fn test_rejects_zero_pointer_interval() {
        assert!(validate(&cli(&["--pointer-interval", "0"])).is_err());
    }

    #[test]
    fn test_rejects_missing_input_file() {
        assert!(validate(&cli(&["--input", "/no/such/video.mp4"])).is_err());
    }

    #[test]
    fn test_camera_input_is_case_insensitive() {
        assert!(is_camera("cam"));
        assert!(is_camera("CAM"));
        assert!(is_camera("Cam"));
        assert!(!is_camera("camera.mp4"));
        assert!(validate(&cli(&["--input", "CAM"])).is_ok());
    }

    #[test]
    fn test_is_image_by_extension() {
        assert!(is_image(Path::new("still.JPG")));
        assert!(is_image(Path::new("frame.png")));
        assert!(!is_image(Path::new("clip.mp4")));
        assert!(!is_image(Path::new("cam")));
    }

    #[test]
    fn test_annotation_falls_back_to_all_overlays() {
        assert_eq!(annotation_flags(OverlayFlags::default()), OverlayFlags::all());
        let face_only = OverlayFlags::parse("F").unwrap();
        assert_eq!(annotation_flags(face_only), face_only);
    }
}
