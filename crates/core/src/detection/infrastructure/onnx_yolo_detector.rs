/// YOLO proctoring-object detector using ONNX Runtime via `ort`.
///
/// Expects a YOLOv8/11 export with output `[1, 4 + classes, anchors]`,
/// boxes in input pixels, one confidence row per class.
use std::path::{Path, PathBuf};

use crate::detection::domain::landmark_detector::{DetectionError, ModelLoadError};
use crate::detection::domain::object_detector::{Detection, ObjectDetector, ProctorClass};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::{OBJECT_MODEL_NAME, OBJECT_MODEL_URL};
use crate::shared::frame::Frame;
use crate::shared::model_resolver::{self, ModelLocation};

use super::execution_provider::open_session;
use super::math::{nms, resize_to_nchw};

/// Fallback input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for object detections.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

pub struct OnnxObjectDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxObjectDetector {
    /// Resolves the proctoring model (cache, bundled dir, download) and
    /// opens it.
    pub fn load(bundled_dir: Option<PathBuf>) -> Result<Self, ModelLoadError> {
        let location =
            ModelLocation::new(OBJECT_MODEL_NAME, OBJECT_MODEL_URL).with_bundled_dir(bundled_dir);
        let path = model_resolver::resolve(&location)?;
        Self::new(&path, DEFAULT_CONFIDENCE).map_err(|e| ModelLoadError::Runtime {
            model: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// The input resolution is read from the model's input shape (NCHW),
    /// falling back to 640 if the shape is dynamic.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = open_session(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }

    fn run(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        let input_tensor = resize_to_nchw(frame.as_ndarray(), self.input_size as usize);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 || shape[1] <= 4 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }
        let data: Vec<f32> = tensor.iter().copied().collect();

        Ok(parse_output(
            &data,
            shape[1] - 4,
            shape[2],
            self.confidence,
            self.input_size,
        ))
    }
}

impl ObjectDetector for OnnxObjectDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        if !frame.is_decodable() || frame.channels() != 3 {
            return Err(DetectionError::InvalidFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }
        Ok(self.run(frame)?)
    }
}

/// Best class per anchor, confidence filter, then NMS.
///
/// `data` is the row-major `[4 + num_classes, num_anchors]` output with the
/// batch dimension dropped. Boxes come back normalized by `input_size`.
fn parse_output(
    data: &[f32],
    num_classes: usize,
    num_anchors: usize,
    confidence: f64,
    input_size: u32,
) -> Vec<Detection> {
    let at = |row: usize, anchor: usize| data.get(row * num_anchors + anchor).copied();
    let size = input_size as f64;
    let mut candidates = Vec::new();

    for a in 0..num_anchors {
        let (Some(cx), Some(cy), Some(w), Some(h)) = (at(0, a), at(1, a), at(2, a), at(3, a))
        else {
            break;
        };

        let mut best_conf = 0.0f32;
        let mut best_class = 0usize;
        for c in 0..num_classes {
            let conf = at(4 + c, a).unwrap_or(0.0);
            if conf > best_conf {
                best_conf = conf;
                best_class = c;
            }
        }
        if (best_conf as f64) < confidence {
            continue;
        }
        let Some(class) = ProctorClass::from_index(best_class) else {
            continue;
        };

        let (cx, cy, w, h) = (cx as f64, cy as f64, w as f64, h as f64);
        candidates.push(Detection {
            class,
            class_index: best_class,
            confidence: best_conf as f64,
            bbox: BoundingBox::new(
                (cx - w / 2.0) / size,
                (cy - h / 2.0) / size,
                w / size,
                h / size,
            ),
        });
    }

    let boxes: Vec<BoundingBox> = candidates.iter().map(|d| d.bbox).collect();
    let scores: Vec<f64> = candidates.iter().map(|d| d.confidence).collect();
    nms(&boxes, &scores, NMS_IOU_THRESH)
        .into_iter()
        .map(|i| candidates[i].clone())
        .collect()
}
