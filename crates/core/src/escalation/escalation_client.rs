use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::escalation::domain::proctoring_flag::{
    FlagDetails, FlagSource, FlagStore, FlagStoreError, FlagType, ProctoringFlag,
};
use crate::escalation::domain::vision_backend::{BackendError, VisionBackend};
use crate::escalation::domain::vlm_result::VlmResult;
use crate::escalation::infrastructure::image_encoding::{frame_to_jpeg_base64, ImageEncodingError};
use crate::escalation::infrastructure::jsonl_flag_store::JsonlFlagStore;
use crate::escalation::infrastructure::openai_compatible_backend::OpenAiCompatibleBackend;
use crate::escalation::infrastructure::rest_flag_store::RestFlagStore;
use crate::shared::config::{EscalationConfig, FlagStoreConfig};
use crate::shared::frame::Frame;

#[derive(Clone, Debug)]
pub struct EscalationRequest {
    pub session_id: String,
    /// Base64 JPEG, bare or as a data URL.
    pub image_base64: String,
    pub trigger_reason: String,
}

/// Outcome of one escalation. `confidence` is always within [0, 1].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VisionVerdict {
    pub violation: bool,
    pub reason: String,
    pub confidence: f64,
    #[serde(skip)]
    pub flag_type: Option<FlagType>,
    /// A flag row was written for this verdict.
    #[serde(skip)]
    pub flagged: bool,
}

/// Sends frames to an ordered chain of vision backends and persists
/// confirmed violations. Holds no per-call state; calls are independent.
pub struct EscalationClient {
    backends: Vec<Box<dyn VisionBackend>>,
    store: Option<Arc<dyn FlagStore>>,
}

impl EscalationClient {
    pub fn new(backends: Vec<Box<dyn VisionBackend>>, store: Option<Arc<dyn FlagStore>>) -> Self {
        Self { backends, store }
    }

    /// Self-hosted endpoint first, then OpenAI. Unconfigured backends are
    /// skipped; an empty chain is valid.
    pub fn from_config(
        escalation: &EscalationConfig,
        flags: &FlagStoreConfig,
    ) -> Result<Self, BackendError> {
        let timeout = Duration::from_secs(escalation.request_timeout_secs);
        let mut backends: Vec<Box<dyn VisionBackend>> = Vec::new();

        if let Some(endpoint) = escalation.custom_endpoint.as_deref().filter(|s| !s.is_empty()) {
            let key = escalation.custom_api_key.as_deref().unwrap_or("");
            backends.push(Box::new(OpenAiCompatibleBackend::custom(endpoint, key, timeout)?));
        }
        if let Some(key) = escalation.openai_api_key.as_deref().filter(|s| !s.is_empty()) {
            backends.push(Box::new(OpenAiCompatibleBackend::openai(
                &escalation.openai_url,
                key,
                timeout,
            )?));
        }
        if backends.is_empty() {
            log::warn!("No vision backend configured; escalations return the safe default");
        }

        let store = match flag_store_from_config(flags, timeout) {
            Ok(store) => store,
            Err(e) => {
                log::error!("Flag store unavailable, flags will not be persisted: {e}");
                None
            }
        };
        Ok(Self::new(backends, store))
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// First backend that answers wins; otherwise the safe default.
    pub fn analyze(&self, image_base64: &str, trigger_reason: &str) -> VlmResult {
        for backend in &self.backends {
            match backend.analyze(image_base64, trigger_reason) {
                Ok(result) => return result,
                Err(e) => log::warn!("Vision backend {} failed, trying next: {e}", backend.name()),
            }
        }
        if !self.backends.is_empty() {
            log::warn!("Every vision backend failed, returning safe default");
        }
        VlmResult::safe_default()
    }

    pub fn escalate(&self, request: &EscalationRequest) -> VisionVerdict {
        let result = self.analyze(&request.image_base64, &request.trigger_reason);
        let confidence = result.clamped_confidence();

        let mut verdict = VisionVerdict {
            violation: result.violation,
            reason: result.reason.clone(),
            confidence,
            flag_type: None,
            flagged: false,
        };
        if !result.violation {
            return verdict;
        }

        let flag_type = FlagType::resolve(result.flag_type.as_deref(), &result.reason);
        verdict.flag_type = Some(flag_type);
        log::info!(
            "Escalation confirmed {flag_type} ({:.0}%): {}",
            confidence * 100.0,
            result.reason
        );

        if request.session_id.is_empty() {
            return verdict;
        }
        if let Some(store) = &self.store {
            let now = Utc::now();
            let flag = ProctoringFlag {
                session_id: request.session_id.clone(),
                flag_type,
                confidence_score: confidence,
                source: FlagSource::VisionLlm,
                details: FlagDetails {
                    reason: result.reason,
                    trigger: request.trigger_reason.clone(),
                    analyzed_at: now,
                },
                created_at: now,
            };
            match store.insert(&flag) {
                Ok(()) => verdict.flagged = true,
                Err(e) => log::error!("Failed to insert proctoring flag: {e}"),
            }
        }
        verdict
    }

    /// Encodes `frame` as JPEG and escalates it.
    pub fn escalate_frame(
        &self,
        session_id: &str,
        frame: &Frame,
        trigger_reason: &str,
    ) -> Result<VisionVerdict, ImageEncodingError> {
        let image_base64 = frame_to_jpeg_base64(frame)?;
        Ok(self.escalate(&EscalationRequest {
            session_id: session_id.to_string(),
            image_base64,
            trigger_reason: trigger_reason.to_string(),
        }))
    }
}

/// REST store when a URL and key are configured, otherwise the JSON-lines
/// log (explicit path or the default under the data dir).
pub fn flag_store_from_config(
    config: &FlagStoreConfig,
    timeout: Duration,
) -> Result<Option<Arc<dyn FlagStore>>, FlagStoreError> {
    if let (Some(url), Some(key)) = (&config.rest_url, &config.rest_key) {
        let store = RestFlagStore::new(url, key, timeout)?;
        return Ok(Some(Arc::new(store) as Arc<dyn FlagStore>));
    }
    let path = config
        .log_path
        .clone()
        .or_else(JsonlFlagStore::default_path);
    Ok(path.map(|p| Arc::new(JsonlFlagStore::new(p)) as Arc<dyn FlagStore>))
}
