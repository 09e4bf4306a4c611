//! Frame-by-frame heuristics over face-mesh output.
//!
//! Each signal needs its condition to persist across consecutive frames so
//! blinks and short glances are not reported. Counters live with the caller;
//! `classify` itself holds no state.

use super::violation::ViolationKind;
use crate::detection::domain::face_landmarks::{average_ear, head_pose_offset, DetectedFace};
use crate::shared::constants::{
    EAR_THRESHOLD, HEAD_OFFSET_THRESHOLD, LOOKING_AWAY_FRAME_THRESHOLD, NO_FACE_FRAME_THRESHOLD,
};

/// Consecutive-frame run lengths carried between calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCounters {
    pub no_face: u32,
    pub looking_away: u32,
}

impl FrameCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signal {
    pub kind: ViolationKind,
    pub message: &'static str,
}

impl Signal {
    fn of(kind: ViolationKind) -> Self {
        Self {
            kind,
            message: kind.default_message(),
        }
    }
}

/// Whether a single face looks away from the screen on this frame: eyes
/// closed/downcast or head turned.
pub fn is_looking_away(face: &DetectedFace) -> bool {
    average_ear(face) < EAR_THRESHOLD || head_pose_offset(face) > HEAD_OFFSET_THRESHOLD
}

/// At most one signal for this frame's faces, updating `counters`.
pub fn classify(faces: &[DetectedFace], counters: &mut FrameCounters) -> Option<Signal> {
    match faces {
        [] => {
            counters.no_face += 1;
            counters.looking_away = 0;
            if counters.no_face > NO_FACE_FRAME_THRESHOLD {
                counters.no_face = 0;
                return Some(Signal::of(ViolationKind::NoFace));
            }
            None
        }
        [face] => {
            counters.no_face = 0;
            if !face.has_full_mesh() {
                return None;
            }
            if is_looking_away(face) {
                counters.looking_away += 1;
                if counters.looking_away > LOOKING_AWAY_FRAME_THRESHOLD {
                    counters.looking_away = 0;
                    return Some(Signal::of(ViolationKind::LookingAway));
                }
            } else {
                counters.looking_away = 0;
            }
            None
        }
        _ => {
            counters.reset();
            Some(Signal::of(ViolationKind::MultipleFaces))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_landmarks::tests::{frontal_face, set_eye};
    use crate::detection::domain::face_landmarks::{LEFT_EYE, NOSE_TIP, RIGHT_EYE};
    use rstest::rstest;

    fn closed_eyes_face() -> DetectedFace {
        let mut face = frontal_face();
        set_eye(&mut face.keypoints, &LEFT_EYE, 0.40, 0.40, 0.1, 0.002);
        set_eye(&mut face.keypoints, &RIGHT_EYE, 0.60, 0.40, 0.1, 0.002);
        face
    }

    fn turned_face() -> DetectedFace {
        let mut face = frontal_face();
        face.keypoints[NOSE_TIP].x = 0.65;
        face
    }

    /// Runs `frames` identical frames and returns every emitted signal.
    fn run(faces: &[DetectedFace], frames: usize, counters: &mut FrameCounters) -> Vec<Signal> {
        (0..frames)
            .filter_map(|_| classify(faces, counters))
            .collect()
    }

    #[test]
    fn test_no_face_fires_on_sixteenth_frame() {
        let mut counters = FrameCounters::default();
        assert!(run(&[], 15, &mut counters).is_empty());
        assert_eq!(counters.no_face, 15);

        let signal = classify(&[], &mut counters).unwrap();
        assert_eq!(signal.kind, ViolationKind::NoFace);
        assert_eq!(counters.no_face, 0);
    }

    #[test]
    fn test_no_face_needs_another_full_run() {
        let mut counters = FrameCounters::default();
        let signals = run(&[], 32, &mut counters);
        assert_eq!(signals.len(), 2);
        assert!(run(&[], 15, &mut counters).is_empty());
    }

    #[test]
    fn test_face_reappearing_resets_no_face_run() {
        let mut counters = FrameCounters::default();
        run(&[], 10, &mut counters);
        classify(&[frontal_face()], &mut counters);
        assert_eq!(counters.no_face, 0);
        assert!(run(&[], 15, &mut counters).is_empty());
    }

    #[test]
    fn test_multiple_faces_fires_immediately_and_resets() {
        let mut counters = FrameCounters {
            no_face: 7,
            looking_away: 12,
        };
        let signal = classify(&[frontal_face(), frontal_face()], &mut counters).unwrap();
        assert_eq!(signal.kind, ViolationKind::MultipleFaces);
        assert_eq!(counters, FrameCounters::default());
    }

    #[rstest]
    #[case::closed_eyes(closed_eyes_face())]
    #[case::turned_head(turned_face())]
    fn test_looking_away_fires_after_twenty_frames(#[case] face: DetectedFace) {
        let mut counters = FrameCounters::default();
        let faces = [face];
        assert!(run(&faces, 20, &mut counters).is_empty());

        let signal = classify(&faces, &mut counters).unwrap();
        assert_eq!(signal.kind, ViolationKind::LookingAway);
        assert_eq!(counters.looking_away, 0);
    }

    #[test]
    fn test_attentive_frame_resets_looking_away() {
        let mut counters = FrameCounters::default();
        run(&[turned_face()], 19, &mut counters);
        classify(&[frontal_face()], &mut counters);
        assert_eq!(counters.looking_away, 0);
        assert!(run(&[turned_face()], 20, &mut counters).is_empty());
    }

    #[test]
    fn test_no_face_frame_resets_looking_away() {
        let mut counters = FrameCounters::default();
        run(&[turned_face()], 19, &mut counters);
        classify(&[], &mut counters);
        assert_eq!(counters.looking_away, 0);
    }

    #[test]
    fn test_attentive_candidate_never_signals() {
        // EAR 0.3, head offset 0.1
        let mut face = frontal_face();
        face.keypoints[NOSE_TIP].x = 0.54;
        assert!(!is_looking_away(&face));

        let mut counters = FrameCounters::default();
        assert!(run(&[face], 20, &mut counters).is_empty());
    }

    #[test]
    fn test_partial_mesh_is_ignored() {
        let mut face = turned_face();
        face.keypoints.truncate(100);
        let mut counters = FrameCounters {
            no_face: 4,
            looking_away: 3,
        };
        assert!(classify(&[face], &mut counters).is_none());
        assert_eq!(counters.no_face, 0);
        assert_eq!(counters.looking_away, 3);
    }
}
