//! Request/response contract for escalation endpoints, independent of the
//! transport that carries it.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use super::escalation_client::{EscalationClient, EscalationRequest};

const DEFAULT_TRIGGER: &str = "unspecified";

/// Request fields are validated here rather than by serde, so a wrongly
/// typed field is a 400 and not a parse failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HandlerRequest {
    interview_id: Value,
    session_id: Value,
    #[serde(rename = "image_base64")]
    image_base64: Value,
    trigger_reason: Value,
}

/// Non-empty string, or a number rendered as text. Anything else is absent.
fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub body: Value,
}

impl HandlerResponse {
    fn ok(data: Value) -> Self {
        Self {
            status: 200,
            body: json!({ "success": true, "data": data }),
        }
    }

    fn error(status: u16, code: &str, message: &str) -> Self {
        Self {
            status,
            body: json!({ "success": false, "error": { "code": code, "message": message } }),
        }
    }
}

pub struct EscalationHandler {
    client: Arc<EscalationClient>,
}

impl EscalationHandler {
    pub fn new(client: Arc<EscalationClient>) -> Self {
        Self { client }
    }

    /// Handles one JSON request body.
    pub fn handle(&self, body: &str) -> HandlerResponse {
        // Only a JSON object is a request; arrays would fill fields by position.
        let request = serde_json::from_str::<serde_json::Map<String, Value>>(body)
            .and_then(|fields| serde_json::from_value::<HandlerRequest>(Value::Object(fields)));
        let request = match request {
            Ok(r) => r,
            Err(e) => {
                log::error!("Vision proctor request rejected: {e}");
                return internal_error();
            }
        };

        let (Some(_interview_id), Some(image_base64)) = (
            identifier(&request.interview_id),
            non_empty_text(&request.image_base64),
        ) else {
            return HandlerResponse::error(
                400,
                "VALIDATION_ERROR",
                "Missing interviewId or image_base64",
            );
        };

        let verdict = self.client.escalate(&EscalationRequest {
            session_id: identifier(&request.session_id).unwrap_or_default(),
            image_base64,
            trigger_reason: non_empty_text(&request.trigger_reason)
                .unwrap_or_else(|| DEFAULT_TRIGGER.to_string()),
        });

        match serde_json::to_value(&verdict) {
            Ok(data) => HandlerResponse::ok(data),
            Err(e) => {
                log::error!("Vision proctor response encoding failed: {e}");
                internal_error()
            }
        }
    }
}

fn internal_error() -> HandlerResponse {
    HandlerResponse::error(500, "INTERNAL_ERROR", "Failed to analyze frame")
}
