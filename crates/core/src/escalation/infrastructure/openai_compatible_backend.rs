use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::escalation::domain::vision_backend::{
    user_prompt, BackendError, VisionBackend, SYSTEM_PROMPT,
};
use crate::escalation::domain::vlm_result::VlmResult;

pub const CUSTOM_MODEL: &str = "custom-vlm";
pub const OPENAI_MODEL: &str = "gpt-4o";
const MAX_TOKENS: u32 = 300;

#[derive(Debug, Default, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// Any server speaking the OpenAI chat-completions protocol with image
/// input: OpenAI itself, vLLM, TGI.
pub struct OpenAiCompatibleBackend {
    name: String,
    url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        name: &str,
        url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport {
                backend: name.to_string(),
                source: e,
            })?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        })
    }

    /// Self-hosted server; `endpoint` is its `/v1` base URL.
    pub fn custom(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, BackendError> {
        let url = format!("{}/chat/completions", endpoint.trim_end_matches('/'));
        Self::new("custom-vlm", &url, api_key, CUSTOM_MODEL, timeout)
    }

    /// `url` is the full chat-completions URL.
    pub fn openai(url: &str, api_key: &str, timeout: Duration) -> Result<Self, BackendError> {
        Self::new("openai", url, api_key, OPENAI_MODEL, timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body(&self, image_base64: &str, trigger_reason: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": user_prompt(trigger_reason) },
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:image/jpeg;base64,{image_base64}"),
                                "detail": "low",
                            },
                        },
                    ],
                },
            ],
            "max_tokens": MAX_TOKENS,
            "response_format": { "type": "json_object" },
        })
    }

    fn transport(&self, e: reqwest::Error) -> BackendError {
        BackendError::Transport {
            backend: self.name.clone(),
            source: e,
        }
    }

    fn malformed(&self, reason: impl ToString) -> BackendError {
        BackendError::Malformed {
            backend: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl VisionBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn analyze(&self, image_base64: &str, trigger_reason: &str) -> Result<VlmResult, BackendError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image_base64, trigger_reason))
            .send()
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Status {
                backend: self.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response.json().map_err(|e| self.malformed(e))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty());

        match content {
            None => Ok(VlmResult::empty_response()),
            Some(content) => VlmResult::parse(&content).map_err(|e| self.malformed(e)),
        }
    }
}
