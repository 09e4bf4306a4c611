use serde::Serialize;

use crate::monitoring::domain::violation::LockdownViolation;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockdownPhase {
    #[default]
    Unarmed,
    Armed,
    Paused,
}

/// Lockdown bookkeeping. `is_paused` is what the host acts on; it always
/// equals `phase == Paused`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LockdownState {
    pub phase: LockdownPhase,
    pub is_full_screen: bool,
    pub is_webcam_disconnected: bool,
    pub is_paused: bool,
    pub exit_fullscreen_count: u32,
    pub context_menu_attempts: u32,
    #[serde(skip)]
    was_full_screen: bool,
}

impl LockdownState {
    /// Fresh state for a newly armed session.
    pub fn armed() -> Self {
        Self {
            phase: LockdownPhase::Armed,
            ..Self::default()
        }
    }

    pub fn is_armed(&self) -> bool {
        self.phase != LockdownPhase::Unarmed
    }

    fn pause(&mut self) {
        if self.is_armed() {
            self.phase = LockdownPhase::Paused;
            self.is_paused = true;
        }
    }

    /// Applies a fullscreen change. Leaving fullscreen only counts when
    /// fullscreen was actually observed before.
    pub fn on_fullscreen_changed(&mut self, is_full_screen: bool) -> Option<LockdownViolation> {
        self.is_full_screen = is_full_screen;
        let exited = !is_full_screen && self.was_full_screen;
        self.was_full_screen = is_full_screen;
        if !exited {
            return None;
        }
        self.exit_fullscreen_count += 1;
        self.pause();
        Some(LockdownViolation::FullscreenExit)
    }

    pub fn on_context_menu(&mut self) -> LockdownViolation {
        self.context_menu_attempts += 1;
        LockdownViolation::ContextMenuAttempt
    }

    pub fn on_track_ended(&mut self) -> LockdownViolation {
        self.is_webcam_disconnected = true;
        self.pause();
        LockdownViolation::WebcamDisconnect
    }

    /// A live camera track is being watched again.
    pub fn on_track_live(&mut self) {
        self.is_webcam_disconnected = false;
    }

    /// Manual re-arm after fullscreen was granted again.
    pub fn on_rearmed(&mut self) {
        if self.phase == LockdownPhase::Paused {
            self.phase = LockdownPhase::Armed;
        }
        self.is_paused = false;
    }

    pub fn disarm(&mut self) {
        self.phase = LockdownPhase::Unarmed;
        self.is_paused = false;
    }
}
