use serde::{Deserialize, Serialize};

/// Axis-aligned box, top-left anchored, in pixels or normalized units
/// depending on the producer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x_min: f64, y_min: f64, width: f64, height: f64) -> Self {
        Self {
            x_min,
            y_min,
            width,
            height,
        }
    }

    /// Builds a box from corner coordinates `[x1, y1, x2, y2]`.
    pub fn from_corners(corners: [f64; 4]) -> Self {
        Self::new(
            corners[0],
            corners[1],
            (corners[2] - corners[0]).max(0.0),
            (corners[3] - corners[1]).max(0.0),
        )
    }

    pub fn x_max(&self) -> f64 {
        self.x_min + self.width
    }

    pub fn y_max(&self) -> f64 {
        self.y_min + self.height
    }

    pub fn corners(&self) -> [f64; 4] {
        [self.x_min, self.y_min, self.x_max(), self.y_max()]
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Clips the box to `[0, frame_w] x [0, frame_h]`.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Self {
        let x1 = self.x_min.clamp(0.0, frame_w as f64);
        let y1 = self.y_min.clamp(0.0, frame_h as f64);
        let x2 = self.x_max().clamp(0.0, frame_w as f64);
        let y2 = self.y_max().clamp(0.0, frame_h as f64);
        Self::from_corners([x1, y1, x2, y2])
    }

    /// Grows the box by `ratio` of its size on every side, keeping the center.
    pub fn expand(&self, ratio: f64) -> Self {
        let dx = self.width * ratio;
        let dy = self.height * ratio;
        Self::new(
            self.x_min - dx,
            self.y_min - dy,
            self.width + 2.0 * dx,
            self.height + 2.0 * dy,
        )
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x_min.max(other.x_min);
        let iy1 = self.y_min.max(other.y_min);
        let ix2 = self.x_max().min(other.x_max());
        let iy2 = self.y_max().min(other.y_max());

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_from_corners() {
        let b = BoundingBox::from_corners([10.0, 20.0, 50.0, 80.0]);
        assert_eq!(b, BoundingBox::new(10.0, 20.0, 40.0, 60.0));
        assert_eq!(b.corners(), [10.0, 20.0, 50.0, 80.0]);
    }

    #[test]
    fn test_from_inverted_corners_is_empty() {
        let b = BoundingBox::from_corners([50.0, 50.0, 10.0, 10.0]);
        assert_eq!(b.area(), 0.0);
    }

    #[test]
    fn test_iou_identical() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_relative_eq!(b.iou(&b), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        assert_relative_eq!(a.iou(&b), 25.0 / 175.0);
    }

    #[rstest]
    #[case::disjoint(BoundingBox::new(20.0, 20.0, 5.0, 5.0))]
    #[case::touching(BoundingBox::new(10.0, 0.0, 10.0, 10.0))]
    #[case::zero_width(BoundingBox::new(0.0, 0.0, 0.0, 10.0))]
    fn test_iou_no_overlap(#[case] other: BoundingBox) {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&other), 0.0);
    }

    #[test]
    fn test_clamp_to_frame() {
        let b = BoundingBox::new(-10.0, 590.0, 50.0, 50.0).clamp_to(640, 600);
        assert_eq!(b, BoundingBox::new(0.0, 590.0, 40.0, 10.0));
    }

    #[test]
    fn test_expand_keeps_center() {
        let b = BoundingBox::new(100.0, 100.0, 40.0, 20.0).expand(0.25);
        assert_relative_eq!(b.x_min, 90.0);
        assert_relative_eq!(b.y_min, 95.0);
        assert_relative_eq!(b.width, 60.0);
        assert_relative_eq!(b.height, 30.0);
    }
}
