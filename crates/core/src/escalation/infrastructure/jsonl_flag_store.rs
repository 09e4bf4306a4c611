use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::escalation::domain::proctoring_flag::{FlagStore, FlagStoreError, ProctoringFlag};

const APP_DIR: &str = "Proctor";
const LOG_NAME: &str = "proctoring_flags.jsonl";

/// Append-only JSON-lines file, one flag per line.
pub struct JsonlFlagStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `<data dir>/Proctor/proctoring_flags.jsonl`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR).join(LOG_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every flag back, skipping lines that no longer parse.
    pub fn read_all(&self) -> Result<Vec<ProctoringFlag>, FlagStoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io(e)),
        };
        Ok(text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(flag) => Some(flag),
                Err(e) => {
                    log::warn!("Skipping corrupt flag line in {}: {e}", self.path.display());
                    None
                }
            })
            .collect())
    }

    fn io(&self, e: std::io::Error) -> FlagStoreError {
        FlagStoreError::Io {
            path: self.path.clone(),
            source: e,
        }
    }
}

impl FlagStore for JsonlFlagStore {
    fn insert(&self, flag: &ProctoringFlag) -> Result<(), FlagStoreError> {
        let mut line = serde_json::to_string(flag)?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io(e))?;
        file.write_all(line.as_bytes()).map_err(|e| self.io(e))?;
        file.flush().map_err(|e| self.io(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::domain::proctoring_flag::{FlagDetails, FlagSource, FlagType};
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_flag(session: &str, flag_type: FlagType) -> ProctoringFlag {
        let now = Utc::now();
        ProctoringFlag {
            session_id: session.to_string(),
            flag_type,
            confidence_score: 0.75,
            source: FlagSource::VisionLlm,
            details: FlagDetails {
                reason: "test".to_string(),
                trigger: "manual".to_string(),
                analyzed_at: now,
            },
            created_at: now,
        }
    }

    #[test]
    fn test_appends_in_order() {
        let tmp = TempDir::new().unwrap();
        let store = JsonlFlagStore::new(tmp.path().join("nested").join("flags.jsonl"));

        store.insert(&sample_flag("a", FlagType::PhoneDetected)).unwrap();
        store.insert(&sample_flag("b", FlagType::Other)).unwrap();

        let flags = store.read_all().unwrap();
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].session_id, "a");
        assert_eq!(flags[1].flag_type, FlagType::Other);
        let text = fs::read_to_string(store.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = JsonlFlagStore::new(tmp.path().join("none.jsonl"));
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = JsonlFlagStore::new(tmp.path().join("flags.jsonl"));
        store.insert(&sample_flag("a", FlagType::PhoneDetected)).unwrap();
        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        writeln!(file, "{{not json").unwrap();

        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_unwritable_path_errors() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let store = JsonlFlagStore::new(blocker.join("flags.jsonl"));

        assert!(matches!(
            store.insert(&sample_flag("a", FlagType::Other)),
            Err(FlagStoreError::Io { .. })
        ));
    }
}
