use serde::{Deserialize, Serialize};

use super::violation::{LockdownViolation, ViolationKind};
use crate::shared::constants::TRUST_PENALTY_PER_VIOLATION;

/// Per-session violation counters and the derived trust score.
///
/// `total_violations` covers heuristic and lockdown violations alike.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProctorStats {
    pub total_violations: u32,
    pub no_face_count: u32,
    pub multiple_faces_count: u32,
    pub looking_away_count: u32,
    pub tab_switch_count: u32,
    pub fullscreen_exit_count: u32,
    pub context_menu_count: u32,
    pub webcam_disconnect_count: u32,
    pub trust_score: u8,
}

impl Default for ProctorStats {
    fn default() -> Self {
        Self {
            total_violations: 0,
            no_face_count: 0,
            multiple_faces_count: 0,
            looking_away_count: 0,
            tab_switch_count: 0,
            fullscreen_exit_count: 0,
            context_menu_count: 0,
            webcam_disconnect_count: 0,
            trust_score: 100,
        }
    }
}

impl ProctorStats {
    /// Counts one violation of `kind` and recomputes the trust score.
    pub fn count(&mut self, kind: ViolationKind) {
        self.total_violations = self.total_violations.saturating_add(1);
        let counter = match kind {
            ViolationKind::NoFace => &mut self.no_face_count,
            ViolationKind::MultipleFaces => &mut self.multiple_faces_count,
            ViolationKind::LookingAway => &mut self.looking_away_count,
            ViolationKind::TabSwitch => &mut self.tab_switch_count,
        };
        *counter = counter.saturating_add(1);
        self.trust_score = trust_score_for(self.total_violations);
    }

    /// Counts one lockdown violation; it costs the same as any other.
    pub fn count_lockdown(&mut self, kind: LockdownViolation) {
        self.total_violations = self.total_violations.saturating_add(1);
        let counter = match kind {
            LockdownViolation::FullscreenExit => &mut self.fullscreen_exit_count,
            LockdownViolation::ContextMenuAttempt => &mut self.context_menu_count,
            LockdownViolation::WebcamDisconnect => &mut self.webcam_disconnect_count,
        };
        *counter = counter.saturating_add(1);
        self.trust_score = trust_score_for(self.total_violations);
    }

    pub fn count_of(&self, kind: ViolationKind) -> u32 {
        match kind {
            ViolationKind::NoFace => self.no_face_count,
            ViolationKind::MultipleFaces => self.multiple_faces_count,
            ViolationKind::LookingAway => self.looking_away_count,
            ViolationKind::TabSwitch => self.tab_switch_count,
        }
    }
}

/// `max(0, 100 - 2 * total)`.
pub fn trust_score_for(total_violations: u32) -> u8 {
    let penalty = total_violations.saturating_mul(TRUST_PENALTY_PER_VIOLATION);
    100u32.saturating_sub(penalty) as u8
}
