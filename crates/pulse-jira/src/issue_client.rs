//! Issue tracker types and the client seam the synchronization engine uses.

use async_trait::async_trait;
use thiserror::Error;

/// One workflow transition offered by the tracker for a ticket.
///
/// The set is defined by the tracker's per-project workflow; nothing about
/// the names is stable across projects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCandidate {
    pub id: String,
    pub name: String,
    pub target_status_name: String,
}

/// Failures surfaced by issue tracker calls. None of these are retried
/// automatically; callers surface them for manual retry.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("ticket {0} not found")]
    NotFound(String),
    #[error("issue tracker rejected credentials")]
    Unauthorized,
    #[error("issue tracker denied permission")]
    Forbidden,
    #[error("issue tracker returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("issue tracker transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode issue tracker response: {0}")]
    Decode(String),
}

#[async_trait]
/// Trait contract for the issue tracker operations the engine performs.
pub trait IssueClient: Send + Sync {
    /// Current status display name of a ticket.
    async fn get_ticket_status(&self, ticket_id: &str) -> Result<String, IssueError>;

    /// Transitions currently available for a ticket, in tracker order.
    async fn list_transitions(
        &self,
        ticket_id: &str,
    ) -> Result<Vec<TransitionCandidate>, IssueError>;

    /// Executes one workflow transition.
    async fn apply_transition(
        &self,
        ticket_id: &str,
        transition_id: &str,
    ) -> Result<(), IssueError>;
}
