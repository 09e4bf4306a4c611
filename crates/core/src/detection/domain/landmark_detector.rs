use thiserror::Error;

use super::face_landmarks::DetectedFace;
use crate::shared::frame::Frame;
use crate::shared::model_resolver::ModelResolveError;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error(transparent)]
    Resolve(#[from] ModelResolveError),
    #[error("failed to initialise model {model}: {reason}")]
    Runtime { model: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("detector used before load()")]
    NotLoaded,
    #[error("frame {width}x{height} cannot be fed to the model")]
    InvalidFrame { width: u32, height: u32 },
    #[error("inference failed: {0}")]
    Inference(String),
}

impl From<Box<dyn std::error::Error>> for DetectionError {
    fn from(e: Box<dyn std::error::Error>) -> Self {
        DetectionError::Inference(e.to_string())
    }
}

/// Domain interface for face-geometry models.
///
/// `load` and `dispose` are idempotent; `detect` needs `&mut self` because
/// ONNX sessions are run mutably.
pub trait LandmarkDetector: Send {
    fn load(&mut self) -> Result<(), ModelLoadError>;

    fn is_loaded(&self) -> bool;

    /// Faces found in `frame`, possibly none.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, DetectionError>;

    fn dispose(&mut self);
}
