use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagType {
    PhoneDetected,
    UnauthorizedObject,
    AnotherPerson,
    SecondaryMonitor,
    Other,
}

impl FlagType {
    pub const ALL: [FlagType; 5] = [
        FlagType::PhoneDetected,
        FlagType::UnauthorizedObject,
        FlagType::AnotherPerson,
        FlagType::SecondaryMonitor,
        FlagType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::PhoneDetected => "PHONE_DETECTED",
            FlagType::UnauthorizedObject => "UNAUTHORIZED_OBJECT",
            FlagType::AnotherPerson => "ANOTHER_PERSON",
            FlagType::SecondaryMonitor => "SECONDARY_MONITOR",
            FlagType::Other => "OTHER",
        }
    }

    /// Exact, case-sensitive match against the wire names.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Guesses the category from free-text reasoning. First match wins.
    pub fn from_reason(reason: &str) -> Self {
        let lower = reason.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["phone"]) {
            FlagType::PhoneDetected
        } else if has(&["person", "face"]) {
            FlagType::AnotherPerson
        } else if has(&["monitor", "screen"]) {
            FlagType::SecondaryMonitor
        } else if has(&["note", "book", "paper"]) {
            FlagType::UnauthorizedObject
        } else {
            FlagType::Other
        }
    }

    /// A valid model-supplied type wins over keyword matching.
    pub fn resolve(suggested: Option<&str>, reason: &str) -> Self {
        suggested
            .and_then(Self::parse)
            .unwrap_or_else(|| Self::from_reason(reason))
    }
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSource {
    Heuristic,
    VisionLlm,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlagDetails {
    pub reason: String,
    pub trigger: String,
    pub analyzed_at: DateTime<Utc>,
}

/// One persisted row of `proctoring_flags`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProctoringFlag {
    pub session_id: String,
    pub flag_type: FlagType,
    pub confidence_score: f64,
    pub source: FlagSource,
    pub details: FlagDetails,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum FlagStoreError {
    #[error("flag log I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode flag: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("flag store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("flag store rejected insert with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Append-only sink for confirmed flags.
pub trait FlagStore: Send + Sync {
    fn insert(&self, flag: &ProctoringFlag) -> Result<(), FlagStoreError>;
}
