pub const FACE_DETECTOR_MODEL_NAME: &str = "blazeface_short_range.onnx";
pub const FACE_DETECTOR_MODEL_URL: &str =
    "https://github.com/proctor-rs/models/releases/download/v0.2.0/blazeface_short_range.onnx";

pub const FACE_MESH_MODEL_NAME: &str = "face_mesh_468.onnx";
pub const FACE_MESH_MODEL_URL: &str =
    "https://github.com/proctor-rs/models/releases/download/v0.2.0/face_mesh_468.onnx";

pub const OBJECT_MODEL_NAME: &str = "proctor-yolo.onnx";
pub const OBJECT_MODEL_URL: &str =
    "https://github.com/proctor-rs/models/releases/download/v0.2.0/proctor-yolo.onnx";

/// Capture resolution requested from the camera.
pub const CAMERA_WIDTH: u32 = 640;
pub const CAMERA_HEIGHT: u32 = 480;
pub const CAMERA_FPS: u32 = 30;

/// Upper bound on faces returned per frame.
pub const MAX_FACES: usize = 3;

/// Landmark count of the face-geometry model.
pub const FACE_MESH_LANDMARKS: usize = 468;

/// Consecutive empty frames tolerated before `no_face` (~0.5s at 30 fps).
pub const NO_FACE_FRAME_THRESHOLD: u32 = 15;

/// Consecutive looking-away frames tolerated before `looking_away`.
pub const LOOKING_AWAY_FRAME_THRESHOLD: u32 = 20;

/// Average eye-aspect-ratio below which eyes count as closed or downcast.
pub const EAR_THRESHOLD: f64 = 0.15;

/// Normalized nose offset above which the head counts as turned.
pub const HEAD_OFFSET_THRESHOLD: f64 = 0.25;

/// Minimum spacing between two counted violations of the same kind.
pub const DEBOUNCE_WINDOW_MS: i64 = 3_000;

/// How long the latest warning message stays visible.
pub const WARNING_DURATION_MS: i64 = 3_000;

/// Trust points lost per counted violation.
pub const TRUST_PENALTY_PER_VIOLATION: u32 = 2;

/// Delay before the first camera-track scan after arming.
pub const TRACK_SCAN_INITIAL_DELAY_MS: u64 = 1_000;

/// Rescan period while no live camera track is found.
pub const TRACK_RESCAN_INTERVAL_MS: u64 = 2_000;

/// Object detections at or above this confidence can trigger escalation.
pub const SUSPICIOUS_OBJECT_CONFIDENCE: f64 = 0.6;
