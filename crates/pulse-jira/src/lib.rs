//! Jira REST client used by the status synchronization engine.

pub mod issue_client;
pub mod jira_api_client;

pub use issue_client::{IssueClient, IssueError, TransitionCandidate};
pub use jira_api_client::JiraApiClient;
