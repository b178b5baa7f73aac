/// Minimum face detection confidence kept by default.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Half the side length of the square eye crop, in face-crop pixels.
pub const EYE_HALF_WIDTH: i32 = 20;

/// Spatial size of each eye tensor fed to the gaze model.
pub const GAZE_EYE_INPUT_SIZE: u32 = 60;

/// Move the pointer once every this many processed frames.
pub const DEFAULT_POINTER_INTERVAL: usize = 4;

/// Consecutive failing frames tolerated before the stream is stopped.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 10;

/// Log progress every this many frames.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 30;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Input argument that selects the default camera instead of a file.
pub const CAMERA_INPUT: &str = "cam";
