//! Tests for deploy bridge poll cycles and regressions.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use pulse_jira::{IssueClient, IssueError, TransitionCandidate};
use pulse_slack::{AuthIdentity, ChatChannel, ChatClient, ChatError, ChatMessage};

use crate::notify::{NotificationSink, NotifyLevel};
use crate::pattern_matcher::DeploymentStatus;

use super::{newest_message_ts, DeployRuntime, DeployRuntimeConfig};

struct ScriptedChatClient {
    batches: Mutex<VecDeque<Result<Vec<ChatMessage>, ChatError>>>,
    fetch_oldest_args: Mutex<Vec<Option<String>>>,
}

impl ScriptedChatClient {
    fn new(batches: Vec<Result<Vec<ChatMessage>, ChatError>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            fetch_oldest_args: Mutex::new(Vec::new()),
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetch_oldest_args.lock().expect("args lock").len()
    }

    fn oldest_args(&self) -> Vec<Option<String>> {
        self.fetch_oldest_args.lock().expect("args lock").clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn fetch_history(
        &self,
        _channel_id: &str,
        oldest: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.fetch_oldest_args
            .lock()
            .expect("args lock")
            .push(oldest.map(ToOwned::to_owned));
        self.batches
            .lock()
            .expect("batch lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn list_channels(&self) -> Result<Vec<ChatChannel>, ChatError> {
        Ok(Vec::new())
    }

    async fn test_auth(&self) -> Result<AuthIdentity, ChatError> {
        Err(ChatError::Api("not scripted".to_string()))
    }
}

struct TicketScript {
    status: String,
    transitions: Vec<TransitionCandidate>,
    missing: bool,
}

struct ScriptedIssueClient {
    tickets: HashMap<String, TicketScript>,
    get_status_calls: Mutex<Vec<String>>,
    apply_calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedIssueClient {
    fn new() -> Self {
        Self {
            tickets: HashMap::new(),
            get_status_calls: Mutex::new(Vec::new()),
            apply_calls: Mutex::new(Vec::new()),
        }
    }

    fn with_ticket(
        mut self,
        ticket_id: &str,
        status: &str,
        transitions: Vec<TransitionCandidate>,
    ) -> Self {
        self.tickets.insert(
            ticket_id.to_string(),
            TicketScript {
                status: status.to_string(),
                transitions,
                missing: false,
            },
        );
        self
    }

    fn with_missing_ticket(mut self, ticket_id: &str) -> Self {
        self.tickets.insert(
            ticket_id.to_string(),
            TicketScript {
                status: String::new(),
                transitions: Vec::new(),
                missing: true,
            },
        );
        self
    }

    fn apply_calls(&self) -> Vec<(String, String)> {
        self.apply_calls.lock().expect("apply lock").clone()
    }

    fn get_status_count(&self) -> usize {
        self.get_status_calls.lock().expect("status lock").len()
    }

    fn script(&self, ticket_id: &str) -> Result<&TicketScript, IssueError> {
        match self.tickets.get(ticket_id) {
            Some(script) if script.missing => Err(IssueError::NotFound(ticket_id.to_string())),
            Some(script) => Ok(script),
            None => Err(IssueError::NotFound(ticket_id.to_string())),
        }
    }
}

#[async_trait]
impl IssueClient for ScriptedIssueClient {
    async fn get_ticket_status(&self, ticket_id: &str) -> Result<String, IssueError> {
        self.get_status_calls
            .lock()
            .expect("status lock")
            .push(ticket_id.to_string());
        Ok(self.script(ticket_id)?.status.clone())
    }

    async fn list_transitions(
        &self,
        ticket_id: &str,
    ) -> Result<Vec<TransitionCandidate>, IssueError> {
        Ok(self.script(ticket_id)?.transitions.clone())
    }

    async fn apply_transition(
        &self,
        ticket_id: &str,
        transition_id: &str,
    ) -> Result<(), IssueError> {
        self.script(ticket_id)?;
        self.apply_calls
            .lock()
            .expect("apply lock")
            .push((ticket_id.to_string(), transition_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<(NotifyLevel, String)>>,
}

impl RecordingSink {
    fn entries(&self) -> Vec<(NotifyLevel, String)> {
        self.entries.lock().expect("entries lock").clone()
    }

    fn count_at(&self, level: NotifyLevel) -> usize {
        self.entries()
            .iter()
            .filter(|(entry_level, _)| *entry_level == level)
            .count()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, level: NotifyLevel, message: &str) {
        self.entries
            .lock()
            .expect("entries lock")
            .push((level, message.to_string()));
    }
}

fn message(ts: &str, text: &str) -> ChatMessage {
    ChatMessage {
        ts: ts.to_string(),
        text: text.to_string(),
        user: Some("U1".to_string()),
        ..ChatMessage::default()
    }
}

fn transition(id: &str, name: &str, target: &str) -> TransitionCandidate {
    TransitionCandidate {
        id: id.to_string(),
        name: name.to_string(),
        target_status_name: target.to_string(),
    }
}

fn test_config(state_dir: &Path) -> DeployRuntimeConfig {
    let mut config = DeployRuntimeConfig::new("C1", state_dir);
    config.poll_interval = Duration::from_millis(10);
    config.poll_once = true;
    config
}

fn runtime_with(
    state_dir: &Path,
    chat: Arc<ScriptedChatClient>,
    issues: Arc<ScriptedIssueClient>,
    sink: Arc<RecordingSink>,
) -> DeployRuntime {
    DeployRuntime::new(test_config(state_dir), chat, issues, sink).expect("runtime")
}

#[tokio::test]
async fn functional_poll_cycle_syncs_linked_jobs_end_to_end() {
    let temp = tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::new(vec![Ok(vec![
        message(
            "100.1",
            "SUCCESSFUL: Job 'STG-Frontend [1491]' (<https://deploy.example/job/STG-Frontend/1491/>)",
        ),
        message("100.2", "lunch anyone?"),
    ])]));
    let issues = Arc::new(ScriptedIssueClient::new().with_ticket(
        "PROJ-42",
        "In Progress",
        vec![transition("21", "Ready for Test", "Ready for Test")],
    ));
    let sink = Arc::new(RecordingSink::default());
    let mut runtime = runtime_with(temp.path(), chat, issues.clone(), sink.clone());

    runtime
        .link_registry
        .add_link("1491", "PROJ-42", DeploymentStatus::Unknown, 1_000)
        .expect("link");

    let report = runtime.poll_once().await.expect("poll");
    assert_eq!(report.discovered_messages, 2);
    assert_eq!(report.matched_events, 1);
    assert_eq!(report.new_events, 1);
    assert_eq!(report.link_updates, 1);
    assert_eq!(report.sync_attempts, 1);
    assert_eq!(report.sync_applied, 1);
    assert_eq!(report.failed_syncs, 0);

    assert_eq!(
        issues.apply_calls(),
        vec![("PROJ-42".to_string(), "21".to_string())]
    );
    let link = runtime.link_registry.get_link("1491").expect("link");
    assert_eq!(link.status, DeploymentStatus::Successful);
    assert_eq!(sink.count_at(NotifyLevel::Success), 1);
}

#[tokio::test]
async fn functional_replayed_history_never_syncs_twice() {
    let temp = tempdir().expect("tempdir");
    let batch = vec![message("100.1", "SUCCESSFUL: Job 'api [7]'")];
    let chat = Arc::new(ScriptedChatClient::new(vec![
        Ok(batch.clone()),
        Ok(batch),
    ]));
    let issues = Arc::new(ScriptedIssueClient::new().with_ticket(
        "PROJ-9",
        "In Progress",
        vec![transition("21", "Ready for Test", "Ready for Test")],
    ));
    let sink = Arc::new(RecordingSink::default());
    let mut runtime = runtime_with(temp.path(), chat, issues.clone(), sink);

    runtime
        .link_registry
        .add_link("7", "PROJ-9", DeploymentStatus::Unknown, 1_000)
        .expect("link");

    let first = runtime.poll_once().await.expect("first poll");
    assert_eq!(first.new_events, 1);
    assert_eq!(first.sync_applied, 1);

    let second = runtime.poll_once().await.expect("second poll");
    assert_eq!(second.new_events, 0);
    assert_eq!(second.sync_attempts, 0);
    assert_eq!(issues.apply_calls().len(), 1);
}

#[tokio::test]
async fn functional_rate_limited_fetch_enters_cooldown_and_rejects_next_cycle() {
    let temp = tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::new(vec![Err(ChatError::RateLimited {
        retry_after_seconds: None,
    })]));
    let issues = Arc::new(ScriptedIssueClient::new());
    let sink = Arc::new(RecordingSink::default());
    let mut runtime = runtime_with(temp.path(), chat.clone(), issues, sink.clone());

    let first = runtime.poll_once().await.expect("first poll");
    assert!(first.rate_limited);
    assert_eq!(sink.count_at(NotifyLevel::Warning), 1);

    // Next attempt inside the window is rejected locally: no network call.
    let second = runtime.poll_once().await.expect("second poll");
    assert!(second.skipped_cooldown);
    assert_eq!(chat.fetch_count(), 1);
    // One notification per incident, not one per suppressed attempt.
    assert_eq!(sink.count_at(NotifyLevel::Warning), 1);
}

#[tokio::test]
async fn functional_cooldown_expiry_allows_the_next_cycle_through() {
    let temp = tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::new(vec![
        Err(ChatError::RateLimited {
            retry_after_seconds: None,
        }),
        Ok(Vec::new()),
    ]));
    let issues = Arc::new(ScriptedIssueClient::new());
    let sink = Arc::new(RecordingSink::default());
    let mut config = test_config(temp.path());
    config.rate_limit_cooldown_ms = 20;
    let mut runtime = DeployRuntime::new(config, chat.clone(), issues, sink).expect("runtime");

    let first = runtime.poll_once().await.expect("first poll");
    assert!(first.rate_limited);

    tokio::time::sleep(Duration::from_millis(40)).await;
    let second = runtime.poll_once().await.expect("second poll");
    assert!(!second.skipped_cooldown);
    assert_eq!(chat.fetch_count(), 2);
}

#[tokio::test]
async fn functional_unlinked_jobs_never_touch_the_tracker() {
    let temp = tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::new(vec![Ok(vec![message(
        "100.1",
        "FAILED: Job 'orphan [77]'",
    )])]));
    let issues = Arc::new(ScriptedIssueClient::new());
    let sink = Arc::new(RecordingSink::default());
    let mut runtime = runtime_with(temp.path(), chat, issues.clone(), sink);

    let report = runtime.poll_once().await.expect("poll");
    assert_eq!(report.new_events, 1);
    assert_eq!(report.sync_attempts, 0);
    assert_eq!(issues.get_status_count(), 0);
}

#[tokio::test]
async fn functional_poll_advances_the_history_cursor() {
    let temp = tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::new(vec![
        Ok(vec![message("100.2", "hello"), message("100.1", "world")]),
        Ok(Vec::new()),
    ]));
    let issues = Arc::new(ScriptedIssueClient::new());
    let sink = Arc::new(RecordingSink::default());
    let mut runtime = runtime_with(temp.path(), chat.clone(), issues, sink);

    runtime.poll_once().await.expect("first poll");
    runtime.poll_once().await.expect("second poll");

    assert_eq!(
        chat.oldest_args(),
        vec![None, Some("100.2".to_string())]
    );
}

#[tokio::test]
async fn regression_sync_failure_does_not_abort_the_cycle() {
    let temp = tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::new(vec![Ok(vec![
        message("100.1", "SUCCESSFUL: Job 'api [1]'"),
        message("100.2", "SUCCESSFUL: Job 'worker [2]'"),
    ])]));
    let issues = Arc::new(
        ScriptedIssueClient::new()
            .with_missing_ticket("GONE-1")
            .with_ticket(
                "PROJ-2",
                "In Progress",
                vec![transition("21", "Ready for Test", "Ready for Test")],
            ),
    );
    let sink = Arc::new(RecordingSink::default());
    let mut runtime = runtime_with(temp.path(), chat, issues.clone(), sink.clone());

    runtime
        .link_registry
        .add_link("1", "GONE-1", DeploymentStatus::Unknown, 1_000)
        .expect("link");
    runtime
        .link_registry
        .add_link("2", "PROJ-2", DeploymentStatus::Unknown, 1_000)
        .expect("link");

    let report = runtime.poll_once().await.expect("poll");
    assert_eq!(report.failed_syncs, 1);
    assert_eq!(report.sync_applied, 1);
    assert_eq!(issues.apply_calls().len(), 1);
    // The broken link stays for manual resolution.
    assert!(runtime.link_registry.get_link("1").is_some());
    let errors = sink.entries();
    assert!(errors
        .iter()
        .any(|(level, text)| *level == NotifyLevel::Error && text.contains("GONE-1")));
}

#[tokio::test]
async fn regression_stopped_runtime_discards_fetched_results() {
    let temp = tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::new(vec![Ok(vec![message(
        "100.1",
        "STARTED: Job 'api [5]'",
    )])]));
    let issues = Arc::new(ScriptedIssueClient::new());
    let sink = Arc::new(RecordingSink::default());
    let mut runtime = runtime_with(temp.path(), chat, issues, sink);

    runtime.stop_handle().stop();
    let report = runtime.poll_once().await.expect("poll");
    assert_eq!(report.new_events, 0);
    assert!(runtime.state_store.recent_events().is_empty());
    assert!(!temp.path().join("state.json").exists());
}

#[tokio::test]
async fn functional_satisfied_ticket_reports_a_skip_without_warning() {
    let temp = tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::new(vec![Ok(vec![message(
        "100.1",
        "SUCCESSFUL: Job 'api [7]'",
    )])]));
    let issues = Arc::new(ScriptedIssueClient::new().with_ticket(
        "PROJ-9",
        "Ready for Test",
        vec![transition("21", "Ready for Test", "Ready for Test")],
    ));
    let sink = Arc::new(RecordingSink::default());
    let mut runtime = runtime_with(temp.path(), chat, issues.clone(), sink.clone());

    runtime
        .link_registry
        .add_link("7", "PROJ-9", DeploymentStatus::Unknown, 1_000)
        .expect("link");

    let report = runtime.poll_once().await.expect("poll");
    assert_eq!(report.sync_skipped, 1);
    assert!(issues.apply_calls().is_empty());
    assert_eq!(sink.count_at(NotifyLevel::Warning), 0);
}

#[test]
fn unit_newest_message_ts_orders_numerically_not_lexicographically() {
    let messages = vec![message("99.9", "a"), message("100.1", "b")];
    assert_eq!(newest_message_ts(&messages), Some("100.1"));
    assert_eq!(newest_message_ts(&[]), None);
}
