//! Persisted mapping from deployment jobs to issue tracker tickets.
//!
//! At most one link exists per job id. Every mutation is written to disk
//! immediately so a restart replays the last known state without loss.

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use pulse_core::{load_json_state, save_json_state};

use crate::pattern_matcher::DeploymentStatus;

const LINKS_SCHEMA_VERSION: u32 = 1;

/// Durable correlation between a deployment job and a tracker ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLink {
    pub job_id: String,
    pub ticket_id: String,
    pub status: DeploymentStatus,
    pub updated_at_unix_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinkRegistryState {
    schema_version: u32,
    #[serde(default)]
    links: Vec<DeploymentLink>,
}

impl Default for LinkRegistryState {
    fn default() -> Self {
        Self {
            schema_version: LINKS_SCHEMA_VERSION,
            links: Vec::new(),
        }
    }
}

/// File-backed link store.
#[derive(Debug)]
pub struct LinkRegistry {
    path: PathBuf,
    state: LinkRegistryState,
}

impl LinkRegistry {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state: LinkRegistryState = load_json_state(&path)?.unwrap_or_default();
        if state.schema_version != LINKS_SCHEMA_VERSION {
            bail!(
                "unsupported link registry schema: expected {}, found {}",
                LINKS_SCHEMA_VERSION,
                state.schema_version
            );
        }
        Ok(Self { path, state })
    }

    /// Creates a link, or re-points an existing one. A re-link rewrites the
    /// ticket reference and timestamp but preserves the known deployment
    /// status: re-linking must not regress observed state.
    pub fn add_link(
        &mut self,
        job_id: &str,
        ticket_id: &str,
        initial_status: DeploymentStatus,
        now_unix_ms: u64,
    ) -> Result<DeploymentLink> {
        let link = if let Some(existing) = self
            .state
            .links
            .iter_mut()
            .find(|link| link.job_id == job_id)
        {
            existing.ticket_id = ticket_id.to_string();
            existing.updated_at_unix_ms = now_unix_ms;
            existing.clone()
        } else {
            let link = DeploymentLink {
                job_id: job_id.to_string(),
                ticket_id: ticket_id.to_string(),
                status: initial_status,
                updated_at_unix_ms: now_unix_ms,
            };
            self.state.links.push(link.clone());
            link
        };
        self.save()?;
        Ok(link)
    }

    /// Removes the link for a job. Returns false when none existed.
    pub fn remove_link(&mut self, job_id: &str) -> Result<bool> {
        let before = self.state.links.len();
        self.state.links.retain(|link| link.job_id != job_id);
        if self.state.links.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn get_link(&self, job_id: &str) -> Option<&DeploymentLink> {
        self.state.links.iter().find(|link| link.job_id == job_id)
    }

    /// Overwrites the cached deployment status for a linked job. No-op
    /// (returns false) when the job has no link.
    pub fn update_status(
        &mut self,
        job_id: &str,
        status: DeploymentStatus,
        now_unix_ms: u64,
    ) -> Result<bool> {
        let Some(link) = self
            .state
            .links
            .iter_mut()
            .find(|link| link.job_id == job_id)
        else {
            return Ok(false);
        };
        link.status = status;
        link.updated_at_unix_ms = now_unix_ms;
        self.save()?;
        Ok(true)
    }

    pub fn links(&self) -> &[DeploymentLink] {
        &self.state.links
    }

    /// Drops every link. Returns how many were removed.
    pub fn clear(&mut self) -> Result<usize> {
        let removed = self.state.links.len();
        if removed > 0 {
            self.state.links.clear();
            self.save()?;
        }
        Ok(removed)
    }

    fn save(&self) -> Result<()> {
        save_json_state(&self.path, &self.state)
    }
}
