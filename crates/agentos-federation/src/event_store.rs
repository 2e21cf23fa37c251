//! In-memory event ingest store with ordering invariants.
//!
//! Per `(tenant_id, run_id)`: event IDs are unique, and accepted sequence
//! values strictly increase. An envelope with `sequence == 0` is treated as
//! unordered and always passes the monotonic check. Read order equals
//! acceptance order. The buffer lives for the process lifetime only.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;

use agentos_core::event;

#[derive(Debug, Default)]
struct StoredEvents {
    seen_event_ids: HashSet<String>,
    last_sequence: i64,
    events: Vec<Value>,
}

/// Per-(tenant, run) event buffer.
#[derive(Debug, Default)]
pub struct EventStore {
    state: Mutex<HashMap<(String, String), StoredEvents>>,
}

impl EventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests envelopes for a run, returning `(accepted, rejected)`.
    ///
    /// An envelope is rejected when its `event` object is missing, its
    /// `event_id` is empty or already seen, or its sequence is non-zero and
    /// not greater than the last accepted sequence.
    pub fn ingest(
        &self,
        tenant_id: &str,
        run_id: &str,
        envelopes: Vec<Value>,
    ) -> (usize, usize) {
        let mut state = self.lock();
        let stored = state
            .entry((tenant_id.to_string(), run_id.to_string()))
            .or_default();

        let mut accepted = 0;
        let mut rejected = 0;
        for envelope in envelopes {
            let Some(event) = event::envelope_event(&envelope) else {
                rejected += 1;
                continue;
            };
            let Some(event_id) = event::event_id(event).map(str::to_string) else {
                rejected += 1;
                continue;
            };

            let sequence = event::event_sequence(event);
            if sequence != 0 && sequence <= stored.last_sequence {
                rejected += 1;
                continue;
            }
            if stored.seen_event_ids.contains(&event_id) {
                rejected += 1;
                continue;
            }

            stored.seen_event_ids.insert(event_id);
            stored.last_sequence = stored.last_sequence.max(sequence);
            stored.events.push(envelope);
            accepted += 1;
        }

        (accepted, rejected)
    }

    /// Returns a copy of the run's envelopes, in acceptance order.
    ///
    /// `None` means the run has never been ingested for this tenant.
    #[must_use]
    pub fn list(&self, tenant_id: &str, run_id: &str) -> Option<Vec<Value>> {
        let state = self.lock();
        state
            .get(&(tenant_id.to_string(), run_id.to_string()))
            .map(|stored| stored.events.clone())
    }

    /// Returns envelopes with `sequence == 0` or `sequence > from`, in
    /// acceptance order.
    #[must_use]
    pub fn list_from_sequence(
        &self,
        tenant_id: &str,
        run_id: &str,
        from: i64,
    ) -> Option<Vec<Value>> {
        let state = self.lock();
        state
            .get(&(tenant_id.to_string(), run_id.to_string()))
            .map(|stored| {
                stored
                    .events
                    .iter()
                    .filter(|envelope| {
                        let sequence = event::envelope_event(envelope)
                            .map(event::event_sequence)
                            .unwrap_or(0);
                        sequence == 0 || sequence > from
                    })
                    .cloned()
                    .collect()
            })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), StoredEvents>> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
