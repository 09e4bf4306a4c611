//! Secondary channel: proctoring objects (phones, notes, extra people).
//!
//! Object detections are advisory. They are shown to the host and can be
//! turned into an escalation trigger, but never count as violations.

use serde::{Deserialize, Serialize};

use super::landmark_detector::DetectionError;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::SUSPICIOUS_OBJECT_CONFIDENCE;
use crate::shared::frame::Frame;

/// Classes of the proctoring object model, in model output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProctorClass {
    MobilePhone,
    Book,
    Notes,
    Earphone,
    SecondaryScreen,
    ExtraPerson,
    HandGesture,
    Laptop,
}

impl ProctorClass {
    pub const ALL: [ProctorClass; 8] = [
        ProctorClass::MobilePhone,
        ProctorClass::Book,
        ProctorClass::Notes,
        ProctorClass::Earphone,
        ProctorClass::SecondaryScreen,
        ProctorClass::ExtraPerson,
        ProctorClass::HandGesture,
        ProctorClass::Laptop,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProctorClass::MobilePhone => "mobile_phone",
            ProctorClass::Book => "book",
            ProctorClass::Notes => "notes",
            ProctorClass::Earphone => "earphone",
            ProctorClass::SecondaryScreen => "secondary_screen",
            ProctorClass::ExtraPerson => "extra_person",
            ProctorClass::HandGesture => "hand_gesture",
            ProctorClass::Laptop => "laptop",
        }
    }

    /// Classes worth a second opinion from a vision backend.
    pub fn is_suspicious(&self) -> bool {
        !matches!(self, ProctorClass::HandGesture | ProctorClass::Laptop)
    }
}

impl std::fmt::Display for ProctorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: ProctorClass,
    pub class_index: usize,
    pub confidence: f64,
    /// Normalized box.
    pub bbox: BoundingBox,
}

pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;
}

/// Escalation trigger naming every confident suspicious detection, e.g.
/// `yolo_watchdog: mobile_phone(87%), notes(64%)`.
pub fn suspicious_trigger(detections: &[Detection]) -> Option<String> {
    let parts: Vec<String> = detections
        .iter()
        .filter(|d| d.class.is_suspicious() && d.confidence >= SUSPICIOUS_OBJECT_CONFIDENCE)
        .map(|d| format!("{}({:.0}%)", d.class, d.confidence * 100.0))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("yolo_watchdog: {}", parts.join(", ")))
}
