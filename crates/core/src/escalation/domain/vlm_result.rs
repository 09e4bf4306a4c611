use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EMPTY_RESPONSE_REASON: &str = "Empty VLM response";
pub const SAFE_DEFAULT_REASON: &str = "No violation detected (mock response - no VLM API configured)";
const UNKNOWN_REASON: &str = "Unknown";

/// A vision model's judgement of one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VlmResult {
    pub violation: bool,
    pub reason: String,
    pub confidence: f64,
    /// Category suggested by the model; may be absent or invalid.
    pub flag_type: Option<String>,
}

/// Model output as sent. Models omit fields and drift from the requested
/// types (`"confidence": "0.9"`), so each field is taken as raw JSON and
/// coerced on its own.
#[derive(Debug, Default, Deserialize)]
struct RawVlmResult {
    #[serde(default)]
    violation: Value,
    #[serde(default)]
    reason: Value,
    #[serde(default)]
    confidence: Value,
    #[serde(default)]
    flag_type: Value,
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

impl VlmResult {
    pub fn new(violation: bool, reason: &str, confidence: f64) -> Self {
        Self {
            violation,
            reason: reason.to_string(),
            confidence,
            flag_type: None,
        }
    }

    /// Returned when the model answered with no content.
    pub fn empty_response() -> Self {
        Self::new(false, EMPTY_RESPONSE_REASON, 0.0)
    }

    /// Returned when no backend is configured or every backend failed.
    pub fn safe_default() -> Self {
        Self::new(false, SAFE_DEFAULT_REASON, 0.0)
    }

    /// Parses the JSON object a model put in its message content. Missing
    /// or unusable fields default to no violation, reason "Unknown" and zero
    /// confidence; a non-string `flag_type` counts as absent. Numbers and
    /// booleans sent as strings are accepted.
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        let raw: RawVlmResult = serde_json::from_str(content)?;
        Ok(Self {
            violation: coerce_bool(&raw.violation).unwrap_or(false),
            reason: coerce_string(&raw.reason).unwrap_or_else(|| UNKNOWN_REASON.to_string()),
            confidence: coerce_f64(&raw.confidence).unwrap_or(0.0),
            flag_type: coerce_string(&raw.flag_type),
        })
    }

    /// Confidence forced into [0, 1]. NaN counts as 0.
    pub fn clamped_confidence(&self) -> f64 {
        if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        }
    }
}
