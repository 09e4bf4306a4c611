//! Shared post-processing for the ONNX detection backends.

use crate::shared::bounding_box::BoundingBox;

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Greedy NMS: visits candidates by descending score and drops any box whose
/// IoU with an already kept box exceeds `iou_thresh`.
///
/// Returns indices into `boxes`, best first.
pub fn nms(boxes: &[BoundingBox], scores: &[f64], iou_thresh: f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len().min(scores.len())).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    for i in order {
        if keep
            .iter()
            .all(|&k| boxes[k].iou(&boxes[i]) <= iou_thresh)
        {
            keep.push(i);
        }
    }
    keep
}

/// Nearest-neighbour resize of an HWC `u8` view into a `1 x 3 x size x size`
/// tensor scaled to `[0, 1]`.
pub fn resize_to_nchw(src: ndarray::ArrayView3<'_, u8>, size: usize) -> ndarray::Array4<f32> {
    let (src_h, src_w, _) = src.dim();
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, size, size));
    if src_h == 0 || src_w == 0 {
        return tensor;
    }

    for y in 0..size {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / size as f64) as usize).min(src_h - 1);
        for x in 0..size {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / size as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}
