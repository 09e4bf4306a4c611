use std::sync::Mutex;

use crate::escalation::domain::proctoring_flag::{FlagStore, FlagStoreError, ProctoringFlag};

/// Keeps flags in memory. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryFlagStore {
    flags: Mutex<Vec<ProctoringFlag>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> Vec<ProctoringFlag> {
        self.flags.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.flags.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FlagStore for MemoryFlagStore {
    fn insert(&self, flag: &ProctoringFlag) -> Result<(), FlagStoreError> {
        self.flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(flag.clone());
        Ok(())
    }
}
