use std::time::Duration;

use crate::escalation::domain::proctoring_flag::{FlagStore, FlagStoreError, ProctoringFlag};

const TABLE_PATH: &str = "rest/v1/proctoring_flags";

/// PostgREST (Supabase) table insert authenticated with a service key.
pub struct RestFlagStore {
    url: String,
    key: String,
    client: reqwest::blocking::Client,
}

impl RestFlagStore {
    pub fn new(base_url: &str, key: &str, timeout: Duration) -> Result<Self, FlagStoreError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            url: format!("{}/{TABLE_PATH}", base_url.trim_end_matches('/')),
            key: key.to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FlagStore for RestFlagStore {
    fn insert(&self, flag: &ProctoringFlag) -> Result<(), FlagStoreError> {
        let response = self
            .client
            .post(&self.url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Prefer", "return=minimal")
            .json(flag)
            .send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(FlagStoreError::Rejected {
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::domain::proctoring_flag::{FlagDetails, FlagSource, FlagType};
    use crate::escalation::infrastructure::stub_server::StubServer;
    use chrono::Utc;

    fn flag() -> ProctoringFlag {
        let now = Utc::now();
        ProctoringFlag {
            session_id: "sess-9".to_string(),
            flag_type: FlagType::SecondaryMonitor,
            confidence_score: 0.6,
            source: FlagSource::VisionLlm,
            details: FlagDetails {
                reason: "second monitor".to_string(),
                trigger: "manual".to_string(),
                analyzed_at: now,
            },
            created_at: now,
        }
    }

    #[test]
    fn test_posts_row_with_service_key() {
        let server = StubServer::respond(201, "");
        let store = RestFlagStore::new(&format!("{}/", server.base_url), "svc", Duration::from_secs(5))
            .unwrap();

        store.insert(&flag()).unwrap();
        let req = server.captured();

        assert_eq!(req.request_line, "POST /rest/v1/proctoring_flags HTTP/1.1");
        assert_eq!(req.header("apikey"), Some("svc"));
        assert_eq!(req.header("authorization"), Some("Bearer svc"));
        let body = req.json();
        assert_eq!(body["session_id"], "sess-9");
        assert_eq!(body["flag_type"], "SECONDARY_MONITOR");
        assert_eq!(body["source"], "vision_llm");
    }

    #[test]
    fn test_rejection_is_reported() {
        let server = StubServer::respond(409, r#"{"message":"duplicate"}"#);
        let store = RestFlagStore::new(&server.base_url, "svc", Duration::from_secs(5)).unwrap();

        let err = store.insert(&flag()).unwrap_err();

        assert!(matches!(err, FlagStoreError::Rejected { status: 409, .. }));
    }
}
