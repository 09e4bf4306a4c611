//! Session-wide violation bookkeeping: per-kind debounce, counters, the
//! trust score and the transient warning shown to the candidate.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use super::proctor_stats::ProctorStats;
use super::violation::{LockdownIncident, LockdownViolation, Violation, ViolationKind};
use crate::shared::clock::Clock;
use crate::shared::constants::{DEBOUNCE_WINDOW_MS, WARNING_DURATION_MS};

/// Owned copy of everything the aggregator knows, for display or export.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregatorSnapshot {
    pub stats: ProctorStats,
    pub violations: Vec<Violation>,
    pub incidents: Vec<LockdownIncident>,
    pub current_warning: Option<String>,
}

/// Where out-of-loop reporters (lockdown handlers) send what they observe.
pub trait ViolationSink: Send + Sync {
    fn violation(&self, kind: ViolationKind, message: &str);
    fn lockdown(&self, kind: LockdownViolation, message: &str);
}

#[derive(Default)]
struct AggregatorState {
    stats: ProctorStats,
    violations: Vec<Violation>,
    incidents: Vec<LockdownIncident>,
    last_counted: HashMap<ViolationKind, i64>,
    last_incident: HashMap<LockdownViolation, i64>,
    warning: Option<(String, i64)>,
}

/// Whether `kind` was counted less than `window_ms` before `now`.
fn within_window<K: Eq + Hash>(
    last: &HashMap<K, i64>,
    kind: &K,
    now: i64,
    window_ms: i64,
) -> bool {
    last.get(kind).is_some_and(|&at| now - at < window_ms)
}

/// Debounces violation signals and keeps the session's live trust score.
///
/// Shared between the detection loop and lockdown handlers; every update
/// happens under a single lock.
pub struct ViolationAggregator {
    clock: Arc<dyn Clock>,
    debounce_ms: i64,
    warning_ms: i64,
    state: Mutex<AggregatorState>,
}

impl ViolationAggregator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            debounce_ms: DEBOUNCE_WINDOW_MS,
            warning_ms: WARNING_DURATION_MS,
            state: Mutex::new(AggregatorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        // Updates never panic between writes, so a poisoned state is whole.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Counts a violation unless one of the same kind was counted less than
    /// the debounce window ago. Returns the recorded violation, if any.
    pub fn record(&self, kind: ViolationKind, message: &str) -> Option<Violation> {
        let now = self.clock.now_ms();
        let mut state = self.lock();

        if within_window(&state.last_counted, &kind, now, self.debounce_ms) {
            log::debug!("Debounced {kind}");
            return None;
        }

        let violation = Violation {
            kind,
            timestamp: now,
            message: message.to_string(),
        };
        state.last_counted.insert(kind, now);
        state.violations.push(violation.clone());
        state.stats.count(kind);
        state.warning = Some((message.to_string(), now + self.warning_ms));

        log::info!(
            "Violation {kind}: {message} (trust score {})",
            state.stats.trust_score
        );
        Some(violation)
    }

    /// Counts a lockdown violation under the same rules as `record`:
    /// debounced per kind, appended to the incident log, charged against
    /// the trust score and surfaced as the current warning.
    pub fn record_lockdown(
        &self,
        kind: LockdownViolation,
        message: &str,
    ) -> Option<LockdownIncident> {
        let now = self.clock.now_ms();
        let mut state = self.lock();

        if within_window(&state.last_incident, &kind, now, self.debounce_ms) {
            log::debug!("Debounced {kind}");
            return None;
        }

        let incident = LockdownIncident {
            kind,
            timestamp: now,
            message: message.to_string(),
        };
        state.last_incident.insert(kind, now);
        state.incidents.push(incident.clone());
        state.stats.count_lockdown(kind);
        state.warning = Some((message.to_string(), now + self.warning_ms));

        log::warn!(
            "Lockdown violation {kind}: {message} (trust score {})",
            state.stats.trust_score
        );
        Some(incident)
    }

    /// The latest warning while it is still within its display window.
    pub fn current_warning(&self) -> Option<String> {
        let now = self.clock.now_ms();
        let state = self.lock();
        state
            .warning
            .as_ref()
            .filter(|(_, expires_at)| now < *expires_at)
            .map(|(message, _)| message.clone())
    }

    pub fn clear_warning(&self) {
        self.lock().warning = None;
    }

    pub fn stats(&self) -> ProctorStats {
        self.lock().stats.clone()
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.lock().violations.clone()
    }

    pub fn incidents(&self) -> Vec<LockdownIncident> {
        self.lock().incidents.clone()
    }

    /// Back to a fresh session: trust 100, no history, no warning.
    pub fn reset(&self) {
        *self.lock() = AggregatorState::default();
    }

    pub fn snapshot(&self) -> AggregatorSnapshot {
        let current_warning = self.current_warning();
        let state = self.lock();
        AggregatorSnapshot {
            stats: state.stats.clone(),
            violations: state.violations.clone(),
            incidents: state.incidents.clone(),
            current_warning,
        }
    }
}

impl ViolationSink for ViolationAggregator {
    fn violation(&self, kind: ViolationKind, message: &str) {
        self.record(kind, message);
    }

    fn lockdown(&self, kind: LockdownViolation, message: &str) {
        self.record_lockdown(kind, message);
    }
}
