//! Bounded, deduplicated window of recognized deployment events.
//!
//! Persisted as a schema-versioned JSON state file. The visible window keeps
//! the most recent entries (newest first); a separate capped list of
//! processed event keys backs the dedup index so an id that has aged out of
//! the window cannot re-enter while the platform still returns it.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use pulse_core::{load_json_state, save_json_state};

use crate::pattern_matcher::{DeploymentEvent, DeploymentStatus};

const DEPLOY_STATE_SCHEMA_VERSION: u32 = 1;

/// Number of events the visible window retains.
pub const DEFAULT_RECENT_EVENT_CAP: usize = 50;

/// Number of processed event keys retained for deduplication.
pub const DEFAULT_PROCESSED_EVENT_CAP: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeployBridgeState {
    schema_version: u32,
    #[serde(default)]
    recent_events: Vec<DeploymentEvent>,
    #[serde(default)]
    processed_event_keys: Vec<String>,
    #[serde(default)]
    last_message_ts: Option<String>,
}

impl Default for DeployBridgeState {
    fn default() -> Self {
        Self {
            schema_version: DEPLOY_STATE_SCHEMA_VERSION,
            recent_events: Vec::new(),
            processed_event_keys: Vec::new(),
            last_message_ts: None,
        }
    }
}

/// File-backed event window + dedup index.
#[derive(Debug)]
pub struct DeployStateStore {
    path: PathBuf,
    recent_cap: usize,
    processed_cap: usize,
    state: DeployBridgeState,
    processed_index: HashSet<String>,
}

impl DeployStateStore {
    pub fn load(path: PathBuf, recent_cap: usize, processed_cap: usize) -> Result<Self> {
        let mut state: DeployBridgeState = load_json_state(&path)?.unwrap_or_default();
        if state.schema_version != DEPLOY_STATE_SCHEMA_VERSION {
            bail!(
                "unsupported deploy state schema: expected {}, found {}",
                DEPLOY_STATE_SCHEMA_VERSION,
                state.schema_version
            );
        }

        let recent_cap = recent_cap.max(1);
        let processed_cap = processed_cap.max(recent_cap);
        state.recent_events.truncate(recent_cap);
        if state.processed_event_keys.len() > processed_cap {
            let keep_from = state.processed_event_keys.len() - processed_cap;
            state.processed_event_keys = state.processed_event_keys[keep_from..].to_vec();
        }

        let processed_index = state
            .processed_event_keys
            .iter()
            .cloned()
            .collect::<HashSet<_>>();
        Ok(Self {
            path,
            recent_cap,
            processed_cap,
            state,
            processed_index,
        })
    }

    /// Merges a batch into the window and returns only the events that were
    /// genuinely new. Already-seen ids are dropped without side effects, so
    /// re-ingesting a batch is a no-op for downstream consumers.
    pub fn ingest(&mut self, incoming: Vec<DeploymentEvent>) -> Vec<DeploymentEvent> {
        let mut fresh = Vec::new();
        for event in incoming {
            if self.processed_index.contains(&event.id) {
                continue;
            }
            self.mark_processed(event.id.clone());
            fresh.push(event);
        }

        if !fresh.is_empty() {
            let mut window = fresh.clone();
            window.append(&mut self.state.recent_events);
            window.truncate(self.recent_cap);
            self.state.recent_events = window;
        }
        fresh
    }

    fn mark_processed(&mut self, key: String) {
        self.processed_index.insert(key.clone());
        self.state.processed_event_keys.push(key);
        while self.state.processed_event_keys.len() > self.processed_cap {
            let removed = self.state.processed_event_keys.remove(0);
            self.processed_index.remove(&removed);
        }
    }

    /// Most-recent-first window of recognized events.
    pub fn recent_events(&self) -> &[DeploymentEvent] {
        &self.state.recent_events
    }

    /// Status of the newest windowed event for a job, if any.
    pub fn latest_status_for_job(&self, job_id: &str) -> Option<DeploymentStatus> {
        self.state
            .recent_events
            .iter()
            .find(|event| event.job_id == job_id)
            .map(|event| event.status)
    }

    pub fn last_message_ts(&self) -> Option<&str> {
        self.state.last_message_ts.as_deref()
    }

    /// Records the newest observed message timestamp. Returns true when the
    /// stored value changed.
    pub fn set_last_message_ts(&mut self, ts: &str) -> bool {
        if self.state.last_message_ts.as_deref() == Some(ts) {
            return false;
        }
        self.state.last_message_ts = Some(ts.to_string());
        true
    }

    pub fn save(&self) -> Result<()> {
        save_json_state(&self.path, &self.state)
    }
}
