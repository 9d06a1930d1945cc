//! Drives a ticket's workflow state to match a deployment outcome.
//!
//! The engine is a state machine over the ticket's current tracker status,
//! driven entirely by upstream events; nothing about the ticket is persisted
//! locally. Transition selection is a fixed keyword heuristic: workflows
//! differ per project, so the first transition (in tracker order) whose name
//! or target status contains a keyword for the outcome wins, with no
//! secondary tie-break. A workflow where nothing matches is a warning, not
//! an error.

use pulse_jira::{IssueClient, IssueError, TransitionCandidate};

use crate::pattern_matcher::DeploymentStatus;

/// Result of one synchronization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub updated: bool,
    pub transition_applied: Option<String>,
    pub reason: Option<String>,
}

impl SyncOutcome {
    fn skipped(reason: &str) -> Self {
        Self {
            updated: false,
            transition_applied: None,
            reason: Some(reason.to_string()),
        }
    }

    fn already_satisfied() -> Self {
        Self {
            updated: false,
            transition_applied: None,
            reason: None,
        }
    }
}

/// Current-status keywords that mean a deployment outcome needs no further
/// transition. Repeated events for an outcome must not re-trigger moves once
/// the ticket has reached an appropriate state.
fn satisfied_keywords(status: DeploymentStatus) -> &'static [&'static str] {
    match status {
        DeploymentStatus::Started => &["in progress", "progress", "development"],
        DeploymentStatus::Successful => &[
            "ready for test",
            "ready to test",
            "testing",
            "done",
            "complete",
        ],
        DeploymentStatus::Failed => &["to do", "backlog", "open"],
        DeploymentStatus::Unknown => &[],
    }
}

/// Keywords used to pick a transition for a deployment outcome.
fn transition_keywords(status: DeploymentStatus) -> &'static [&'static str] {
    match status {
        DeploymentStatus::Started => &["ready for test", "testing", "in progress", "development"],
        DeploymentStatus::Successful => &["ready for test", "testing", "qa ready", "done", "complete"],
        DeploymentStatus::Failed => &["to do", "backlog", "open", "reopened"],
        DeploymentStatus::Unknown => &[],
    }
}

/// True when the ticket's current status already satisfies the outcome.
pub fn status_is_satisfied(current_status: &str, status: DeploymentStatus) -> bool {
    let current = current_status.to_lowercase();
    satisfied_keywords(status)
        .iter()
        .any(|keyword| current.contains(keyword))
}

/// Picks the first transition (tracker order) whose name or target status
/// contains a keyword for the outcome.
pub fn select_transition(
    transitions: &[TransitionCandidate],
    status: DeploymentStatus,
) -> Option<&TransitionCandidate> {
    let keywords = transition_keywords(status);
    transitions.iter().find(|transition| {
        let name = transition.name.to_lowercase();
        let target = transition.target_status_name.to_lowercase();
        keywords
            .iter()
            .any(|keyword| name.contains(keyword) || target.contains(keyword))
    })
}

/// Applies at most one tracker transition for a deployment outcome.
///
/// `Unknown` outcomes are a deliberate no-op and never reach the tracker.
/// Tracker failures propagate untouched; the engine never retries them.
pub async fn synchronize(
    issue_client: &dyn IssueClient,
    ticket_id: &str,
    status: DeploymentStatus,
) -> Result<SyncOutcome, IssueError> {
    if status == DeploymentStatus::Unknown {
        return Ok(SyncOutcome::skipped("unknown deployment status"));
    }

    let current_status = issue_client.get_ticket_status(ticket_id).await?;
    if status_is_satisfied(&current_status, status) {
        return Ok(SyncOutcome::already_satisfied());
    }

    let transitions = issue_client.list_transitions(ticket_id).await?;
    let Some(transition) = select_transition(&transitions, status) else {
        return Ok(SyncOutcome::skipped("no matching transition"));
    };

    issue_client
        .apply_transition(ticket_id, &transition.id)
        .await?;
    Ok(SyncOutcome {
        updated: true,
        transition_applied: Some(transition.name.clone()),
        reason: None,
    })
}
