use serde::{Deserialize, Serialize};

/// Camera- and visibility-derived violations that count against the
/// trust score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoFace,
    MultipleFaces,
    LookingAway,
    TabSwitch,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 4] = [
        ViolationKind::NoFace,
        ViolationKind::MultipleFaces,
        ViolationKind::LookingAway,
        ViolationKind::TabSwitch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "no_face",
            ViolationKind::MultipleFaces => "multiple_faces",
            ViolationKind::LookingAway => "looking_away",
            ViolationKind::TabSwitch => "tab_switch",
        }
    }

    /// Candidate-facing warning shown when this kind is recorded.
    pub fn default_message(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "No face detected! Please face the camera.",
            ViolationKind::MultipleFaces => {
                "Multiple faces detected! Only the candidate should be visible."
            }
            ViolationKind::LookingAway => "Please look at the camera. Looking away detected.",
            ViolationKind::TabSwitch => "Tab switch detected! Stay on the interview page.",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: i64,
    pub message: String,
}

/// Environment-tampering events raised by the lockdown enforcer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockdownViolation {
    FullscreenExit,
    ContextMenuAttempt,
    WebcamDisconnect,
}

impl LockdownViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockdownViolation::FullscreenExit => "FULLSCREEN_EXIT",
            LockdownViolation::ContextMenuAttempt => "CONTEXT_MENU_ATTEMPT",
            LockdownViolation::WebcamDisconnect => "WEBCAM_DISCONNECT",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            LockdownViolation::FullscreenExit => {
                "Fullscreen mode exited. Please return to fullscreen to continue."
            }
            LockdownViolation::ContextMenuAttempt => {
                "Right-click is disabled during the assessment."
            }
            LockdownViolation::WebcamDisconnect => "Camera disconnected. Assessment paused.",
        }
    }

    /// Whether this event pauses the session until re-armed.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, LockdownViolation::ContextMenuAttempt)
    }
}

impl std::fmt::Display for LockdownViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockdownIncident {
    #[serde(rename = "type")]
    pub kind: LockdownViolation,
    pub timestamp: i64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_serializes_with_type_tag() {
        let v = Violation {
            kind: ViolationKind::MultipleFaces,
            timestamp: 1_700_000_000_000,
            message: "two people".into(),
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "multiple_faces");
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_kind_names_match_serde() {
        for kind in ViolationKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_lockdown_violation_names() {
        let json = serde_json::to_string(&LockdownViolation::ContextMenuAttempt).unwrap();
        assert_eq!(json, "\"CONTEXT_MENU_ATTEMPT\"");
        assert!(LockdownViolation::WebcamDisconnect.is_blocking());
        assert!(!LockdownViolation::ContextMenuAttempt.is_blocking());
    }
}
