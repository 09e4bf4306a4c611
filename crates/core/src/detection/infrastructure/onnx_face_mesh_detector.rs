//! Two-stage face-geometry detector: BlazeFace boxes, then a 468-point
//! FaceMesh model on a square crop around each box.

use std::path::{Path, PathBuf};

use crate::detection::domain::face_landmarks::{DetectedFace, Point};
use crate::detection::domain::landmark_detector::{
    DetectionError, LandmarkDetector, ModelLoadError,
};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::{
    FACE_DETECTOR_MODEL_NAME, FACE_DETECTOR_MODEL_URL, FACE_MESH_LANDMARKS, FACE_MESH_MODEL_NAME,
    FACE_MESH_MODEL_URL, MAX_FACES,
};
use crate::shared::frame::Frame;
use crate::shared::model_resolver::{self, ModelLocation};

use super::execution_provider::open_session;
use super::math::{resize_to_nchw, sigmoid};
use super::onnx_blazeface_detector::{FaceBox, OnnxBlazefaceDetector, DEFAULT_CONFIDENCE};

/// FaceMesh model input resolution.
const MESH_INPUT_SIZE: usize = 192;

/// Crop margin around the BlazeFace box; the mesh model expects some
/// forehead and chin in view.
const CROP_MARGIN: f64 = 0.25;

/// Minimum face-presence probability reported by the mesh model.
const MESH_PRESENCE_THRESH: f32 = 0.5;

struct LoadedModels {
    locator: OnnxBlazefaceDetector,
    mesh: ort::session::Session,
}

pub struct OnnxFaceMeshDetector {
    locator_model: ModelLocation,
    mesh_model: ModelLocation,
    cache_dir: Option<PathBuf>,
    max_faces: usize,
    models: Option<LoadedModels>,
}

impl OnnxFaceMeshDetector {
    pub fn new(bundled_dir: Option<PathBuf>) -> Self {
        Self::from_locations(
            ModelLocation::new(FACE_DETECTOR_MODEL_NAME, FACE_DETECTOR_MODEL_URL)
                .with_bundled_dir(bundled_dir.clone()),
            ModelLocation::new(FACE_MESH_MODEL_NAME, FACE_MESH_MODEL_URL)
                .with_bundled_dir(bundled_dir),
        )
    }

    pub fn from_locations(locator_model: ModelLocation, mesh_model: ModelLocation) -> Self {
        Self {
            locator_model,
            mesh_model,
            cache_dir: None,
            max_faces: MAX_FACES,
            models: None,
        }
    }

    /// Resolve models against `dir` instead of the user cache.
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    pub fn with_max_faces(mut self, max_faces: usize) -> Self {
        self.max_faces = max_faces;
        self
    }

    fn resolve(&self, location: &ModelLocation) -> Result<PathBuf, ModelLoadError> {
        let path = match &self.cache_dir {
            Some(dir) => model_resolver::resolve_in(dir, location)?,
            None => model_resolver::resolve(location)?,
        };
        Ok(path)
    }

    fn mesh_for(
        mesh: &mut ort::session::Session,
        frame: &Frame,
        face: &FaceBox,
    ) -> Result<Option<DetectedFace>, Box<dyn std::error::Error>> {
        let fw = frame.width();
        let fh = frame.height();
        let crop = square_crop(&face.bbox, fw, fh);
        if crop.width < 1.0 || crop.height < 1.0 {
            return Ok(None);
        }

        let (x0, y0) = (crop.x_min as usize, crop.y_min as usize);
        let (x1, y1) = (crop.x_max() as usize, crop.y_max() as usize);
        let pixels = frame.as_ndarray();
        let view = pixels.slice(ndarray::s![y0..y1, x0..x1, ..]);
        let input_tensor = resize_to_nchw(view, MESH_INPUT_SIZE);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = mesh.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("FaceMesh model produced no outputs".into());
        }

        if outputs.len() > 1 {
            let presence = outputs[1].try_extract_array::<f32>()?;
            let logit = presence.iter().next().copied().unwrap_or(0.0);
            if sigmoid(logit) < MESH_PRESENCE_THRESH {
                return Ok(None);
            }
        }

        let landmarks = outputs[0].try_extract_array::<f32>()?;
        let raw: Vec<f32> = landmarks.iter().copied().collect();
        if raw.len() < FACE_MESH_LANDMARKS * 3 {
            return Err(format!(
                "FaceMesh output has {} values, expected {}",
                raw.len(),
                FACE_MESH_LANDMARKS * 3
            )
            .into());
        }

        let keypoints = map_keypoints(&raw, &crop, fw, fh);
        Ok(Some(DetectedFace::new(keypoints, face.bbox, face.score)))
    }
}

impl LandmarkDetector for OnnxFaceMeshDetector {
    fn load(&mut self) -> Result<(), ModelLoadError> {
        if self.models.is_some() {
            return Ok(());
        }
        let locator_path = self.resolve(&self.locator_model)?;
        let mesh_path = self.resolve(&self.mesh_model)?;

        let runtime_err = |model: &Path, e: Box<dyn std::error::Error>| ModelLoadError::Runtime {
            model: model.display().to_string(),
            reason: e.to_string(),
        };
        let locator = OnnxBlazefaceDetector::new(&locator_path, DEFAULT_CONFIDENCE)
            .map_err(|e| runtime_err(&locator_path, e))?;
        let mesh = open_session(&mesh_path).map_err(|e| runtime_err(&mesh_path, e))?;

        log::info!(
            "Face mesh models loaded ({}, {})",
            locator_path.display(),
            mesh_path.display()
        );
        self.models = Some(LoadedModels { locator, mesh });
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.models.is_some()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, DetectionError> {
        let max_faces = self.max_faces;
        let models = self.models.as_mut().ok_or(DetectionError::NotLoaded)?;
        if !frame.is_decodable() || frame.channels() != 3 {
            return Err(DetectionError::InvalidFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }

        let boxes = models.locator.locate(frame)?;
        let mut faces = Vec::with_capacity(boxes.len().min(max_faces));
        for face_box in boxes.iter().take(max_faces) {
            if let Some(face) = Self::mesh_for(&mut models.mesh, frame, face_box)? {
                faces.push(face);
            }
        }
        Ok(faces)
    }

    fn dispose(&mut self) {
        if self.models.take().is_some() {
            log::info!("Face mesh models released");
        }
    }
}

/// Square pixel crop around a normalized face box, grown by `CROP_MARGIN`
/// and clipped to the frame.
fn square_crop(bbox: &BoundingBox, fw: u32, fh: u32) -> BoundingBox {
    let cx = (bbox.x_min + bbox.width / 2.0) * fw as f64;
    let cy = (bbox.y_min + bbox.height / 2.0) * fh as f64;
    let side = (bbox.width * fw as f64).max(bbox.height * fh as f64) * (1.0 + 2.0 * CROP_MARGIN);
    let square = BoundingBox::new(cx - side / 2.0, cy - side / 2.0, side, side).clamp_to(fw, fh);
    // Whole pixels so the slice and the inverse mapping agree.
    BoundingBox::from_corners([
        square.x_min.floor(),
        square.y_min.floor(),
        square.x_max().floor(),
        square.y_max().floor(),
    ])
}

/// Maps mesh output (crop pixel space of `MESH_INPUT_SIZE`) back to
/// normalized frame coordinates.
fn map_keypoints(raw: &[f32], crop: &BoundingBox, fw: u32, fh: u32) -> Vec<Point> {
    let scale_x = crop.width / MESH_INPUT_SIZE as f64;
    let scale_y = crop.height / MESH_INPUT_SIZE as f64;
    raw.chunks_exact(3)
        .take(FACE_MESH_LANDMARKS)
        .map(|v| {
            Point::new(
                (crop.x_min + v[0] as f64 * scale_x) / fw as f64,
                (crop.y_min + v[1] as f64 * scale_y) / fh as f64,
                v[2] as f64 / MESH_INPUT_SIZE as f64,
            )
        })
        .collect()
}
