//! 468-point face mesh geometry: eye aspect ratio and head-pose offset.
//!
//! All keypoints are normalized to the frame, so ratios are scale-free.
//! Index sets follow the canonical MediaPipe face-mesh topology.

use serde::{Deserialize, Serialize};

use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::FACE_MESH_LANDMARKS;

/// Eye contour as `[p1, p2, p3, p4, p5, p6]`: p1/p4 are the horizontal
/// corners, (p2, p6) and (p3, p5) the vertical pairs.
pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
pub const NOSE_TIP: usize = 1;
pub const LEFT_EAR: usize = 234;
pub const RIGHT_EAR: usize = 454;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// Relative depth; unused by the 2D heuristics.
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in the image plane.
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One face found in a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Normalized `[0, 1]` keypoints in mesh order.
    pub keypoints: Vec<Point>,
    /// Normalized face box.
    pub bbox: BoundingBox,
    pub score: f64,
}

impl DetectedFace {
    pub fn new(keypoints: Vec<Point>, bbox: BoundingBox, score: f64) -> Self {
        Self {
            keypoints,
            bbox,
            score,
        }
    }

    /// True when every landmark the heuristics index into is present.
    pub fn has_full_mesh(&self) -> bool {
        self.keypoints.len() >= FACE_MESH_LANDMARKS
    }

    /// Box in pixel coordinates of a `frame_w` x `frame_h` frame.
    pub fn pixel_bbox(&self, frame_w: u32, frame_h: u32) -> BoundingBox {
        BoundingBox::new(
            self.bbox.x_min * frame_w as f64,
            self.bbox.y_min * frame_h as f64,
            self.bbox.width * frame_w as f64,
            self.bbox.height * frame_h as f64,
        )
    }
}

/// `(|p2 - p6| + |p3 - p5|) / (2 |p1 - p4|)`; 0 when the eye has no width.
pub fn eye_aspect_ratio(keypoints: &[Point], eye: &[usize; 6]) -> f64 {
    let p = |i: usize| keypoints[eye[i]];
    let vertical_a = p(1).distance(&p(5));
    let vertical_b = p(2).distance(&p(4));
    let horizontal = p(0).distance(&p(3));
    if horizontal == 0.0 {
        return 0.0;
    }
    (vertical_a + vertical_b) / (2.0 * horizontal)
}

/// Mean EAR of both eyes.
pub fn average_ear(face: &DetectedFace) -> f64 {
    let left = eye_aspect_ratio(&face.keypoints, &LEFT_EYE);
    let right = eye_aspect_ratio(&face.keypoints, &RIGHT_EYE);
    (left + right) / 2.0
}

/// Horizontal nose offset from the ear midpoint, relative to ear span.
///
/// 0 is frontal; values grow as the head turns. A zero ear span is treated
/// as a span of 1 so the ratio stays finite.
pub fn head_pose_offset(face: &DetectedFace) -> f64 {
    let nose = face.keypoints[NOSE_TIP];
    let left_ear = face.keypoints[LEFT_EAR];
    let right_ear = face.keypoints[RIGHT_EAR];

    let ear_mid_x = (left_ear.x + right_ear.x) / 2.0;
    let mut face_width = left_ear.distance(&right_ear);
    if face_width == 0.0 {
        face_width = 1.0;
    }
    (nose.x - ear_mid_x).abs() / face_width
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    /// A frontal face with open eyes: EAR 0.3, head offset 0.
    pub(crate) fn frontal_face() -> DetectedFace {
        let mut kp = vec![Point::new(0.5, 0.5, 0.0); FACE_MESH_LANDMARKS];
        set_eye(&mut kp, &LEFT_EYE, 0.40, 0.40, 0.1, 0.03);
        set_eye(&mut kp, &RIGHT_EYE, 0.60, 0.40, 0.1, 0.03);
        kp[NOSE_TIP] = Point::new(0.5, 0.5, 0.0);
        kp[LEFT_EAR] = Point::new(0.3, 0.45, 0.0);
        kp[RIGHT_EAR] = Point::new(0.7, 0.45, 0.0);
        DetectedFace::new(kp, BoundingBox::new(0.3, 0.3, 0.4, 0.4), 0.95)
    }

    /// Places a six-point eye centered at `(cx, cy)` with the given width
    /// and total lid opening.
    pub(crate) fn set_eye(
        kp: &mut [Point],
        eye: &[usize; 6],
        cx: f64,
        cy: f64,
        width: f64,
        opening: f64,
    ) {
        let half_w = width / 2.0;
        let half_o = opening / 2.0;
        kp[eye[0]] = Point::new(cx - half_w, cy, 0.0);
        kp[eye[3]] = Point::new(cx + half_w, cy, 0.0);
        kp[eye[1]] = Point::new(cx - half_w / 2.0, cy - half_o, 0.0);
        kp[eye[5]] = Point::new(cx - half_w / 2.0, cy + half_o, 0.0);
        kp[eye[2]] = Point::new(cx + half_w / 2.0, cy - half_o, 0.0);
        kp[eye[4]] = Point::new(cx + half_w / 2.0, cy + half_o, 0.0);
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0, 5.0);
        let b = Point::new(3.0, 4.0, -2.0);
        assert_relative_eq!(a.distance(&b), 5.0);
    }

    #[test]
    fn test_open_eyes_ear() {
        let face = frontal_face();
        // opening 0.03 over width 0.1: (0.03 + 0.03) / (2 * 0.1)
        assert_relative_eq!(average_ear(&face), 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_ear_is_zero_when_eyelids_touch() {
        let mut face = frontal_face();
        set_eye(&mut face.keypoints, &LEFT_EYE, 0.4, 0.4, 0.1, 0.0);
        assert_relative_eq!(eye_aspect_ratio(&face.keypoints, &LEFT_EYE), 0.0);
    }

    #[test]
    fn test_ear_is_zero_without_eye_width() {
        let kp = vec![Point::new(0.2, 0.2, 0.0); FACE_MESH_LANDMARKS];
        assert_relative_eq!(eye_aspect_ratio(&kp, &RIGHT_EYE), 0.0);
    }

    #[rstest]
    #[case::frontal(0.5, 0.0)]
    #[case::slightly_turned(0.56, 0.15)]
    #[case::turned_left(0.4, 0.25)]
    #[case::turned_right(0.7, 0.5)]
    fn test_head_pose_offset(#[case] nose_x: f64, #[case] expected: f64) {
        let mut face = frontal_face();
        face.keypoints[NOSE_TIP].x = nose_x;
        // ear span is 0.4, ear midpoint 0.5
        assert_relative_eq!(head_pose_offset(&face), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_head_pose_offset_with_coincident_ears() {
        let mut face = frontal_face();
        face.keypoints[LEFT_EAR] = Point::new(0.5, 0.5, 0.0);
        face.keypoints[RIGHT_EAR] = Point::new(0.5, 0.5, 0.0);
        face.keypoints[NOSE_TIP].x = 0.6;
        assert_relative_eq!(head_pose_offset(&face), 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_pixel_bbox_scales_normalized_box() {
        let face = frontal_face();
        let px = face.pixel_bbox(640, 480);
        assert_relative_eq!(px.x_min, 192.0);
        assert_relative_eq!(px.height, 192.0);
    }

    #[test]
    fn test_partial_mesh_is_not_full() {
        let face = DetectedFace::new(vec![Point::default(); 5], BoundingBox::default(), 0.9);
        assert!(!face.has_full_mesh());
    }
}
