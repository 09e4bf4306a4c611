use thiserror::Error;

use super::vlm_result::VlmResult;

pub const SYSTEM_PROMPT: &str = "You are an AI proctor monitoring a candidate taking an exam. \
Analyze this webcam frame. Is the candidate holding a phone, reading from notes, \
or is there another person in the frame? \
Output JSON with { \"violation\": boolean, \"reason\": string, \"confidence\": number, \"flag_type\": string }. \
flag_type must be one of: PHONE_DETECTED, UNAUTHORIZED_OBJECT, ANOTHER_PERSON, SECONDARY_MONITOR, OTHER. \
confidence is a float between 0 and 1. If no violation, set violation to false and reason to \"No violation detected\".";

pub fn user_prompt(trigger_reason: &str) -> String {
    format!("Trigger reason: {trigger_reason}. Analyze this webcam frame for exam violations.")
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("request to {backend} failed: {source}")]
    Transport {
        backend: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{backend} returned status {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },
    #[error("{backend} returned malformed output: {reason}")]
    Malformed { backend: String, reason: String },
}

/// A vision-reasoning model that judges one JPEG frame.
pub trait VisionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `image_base64` is a base64 JPEG without a data-URL prefix.
    fn analyze(&self, image_base64: &str, trigger_reason: &str)
        -> Result<VlmResult, BackendError>;
}
