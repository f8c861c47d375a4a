pub const FACE_MODEL_NAME: &str = "face_detection_short_range.onnx";
pub const FACE_MODEL_URL: &str = "http://localhost:8000/models/face_detection_short_range.onnx";

pub const AUTH_BASE_URL: &str = "http://localhost:8000/api/v1/auth";

/// Ideal capture resolution requested from the device.
pub const IDEAL_WIDTH: u32 = 640;
pub const IDEAL_HEIGHT: u32 = 480;

/// JPEG quality for snapshots sent to the auth service (0-100).
pub const SNAPSHOT_QUALITY: u8 = 90;

/// A detection must score strictly above this to trigger a capture.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

pub const LOGIN_TICK_MS: u64 = 200;
pub const REGISTER_TICK_MS: u64 = 100;
pub const SESSION_TIMEOUT_SECS: u64 = 30;
pub const MIN_CAPTURE_GAP_MS: u64 = 200;
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;
pub const REQUIRED_FRAME_COUNT: usize = 5;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];
