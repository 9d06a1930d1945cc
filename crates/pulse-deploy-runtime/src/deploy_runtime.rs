//! Deploy bridge runtime: polls chat history and synchronizes ticket state.
//!
//! Single-task cooperative scheduling: one poll cycle runs to completion
//! before the next interval starts, so cycles never overlap and all store
//! mutation happens from one place. Chat and tracker calls are the only
//! suspension points. A failing cycle is logged and reported; the scheduler
//! itself never dies from one.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use pulse_core::current_unix_timestamp_ms;
use pulse_jira::IssueClient;
use pulse_slack::{ChatClient, ChatError, ChatMessage, RateLimitGuard, DEFAULT_COOLDOWN_MS};

use crate::event_store::{
    DeployStateStore, DEFAULT_PROCESSED_EVENT_CAP, DEFAULT_RECENT_EVENT_CAP,
};
use crate::link_registry::LinkRegistry;
use crate::notify::{NotificationSink, NotifyLevel};
use crate::pattern_matcher::match_deployment;
use crate::status_sync::synchronize;

/// Default cadence between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of history entries requested per poll.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Clone)]
/// Runtime configuration for the deploy bridge poll loop.
pub struct DeployRuntimeConfig {
    pub channel_id: String,
    pub state_dir: PathBuf,
    pub poll_interval: Duration,
    pub poll_once: bool,
    pub history_limit: usize,
    pub recent_event_cap: usize,
    pub processed_event_cap: usize,
    pub rate_limit_cooldown_ms: u64,
}

impl DeployRuntimeConfig {
    pub fn new(channel_id: impl Into<String>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            channel_id: channel_id.into(),
            state_dir: state_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_once: false,
            history_limit: DEFAULT_HISTORY_LIMIT,
            recent_event_cap: DEFAULT_RECENT_EVENT_CAP,
            processed_event_cap: DEFAULT_PROCESSED_EVENT_CAP,
            rate_limit_cooldown_ms: DEFAULT_COOLDOWN_MS,
        }
    }
}

#[derive(Debug, Default)]
/// Per-cycle accounting, emitted as one log line after each poll.
pub struct PollCycleReport {
    pub discovered_messages: usize,
    pub matched_events: usize,
    pub new_events: usize,
    pub link_updates: usize,
    pub sync_attempts: usize,
    pub sync_applied: usize,
    pub sync_skipped: usize,
    pub failed_syncs: usize,
    pub skipped_cooldown: bool,
    pub rate_limited: bool,
}

/// Handle for stopping a running bridge from another task. Stopping is safe
/// at any point: in-flight network calls complete but their results are
/// discarded before any store mutation.
#[derive(Clone)]
pub struct StopHandle {
    live: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Runs the deploy bridge loop until shutdown.
pub async fn run_deploy_bridge(
    config: DeployRuntimeConfig,
    chat_client: Arc<dyn ChatClient>,
    issue_client: Arc<dyn IssueClient>,
    notifier: Arc<dyn NotificationSink>,
) -> Result<()> {
    let mut runtime = DeployRuntime::new(config, chat_client, issue_client, notifier)?;
    runtime.run().await
}

pub struct DeployRuntime {
    config: DeployRuntimeConfig,
    chat_client: Arc<dyn ChatClient>,
    issue_client: Arc<dyn IssueClient>,
    notifier: Arc<dyn NotificationSink>,
    rate_limit_guard: RateLimitGuard,
    state_store: DeployStateStore,
    link_registry: LinkRegistry,
    live: Arc<AtomicBool>,
}

impl DeployRuntime {
    pub fn new(
        config: DeployRuntimeConfig,
        chat_client: Arc<dyn ChatClient>,
        issue_client: Arc<dyn IssueClient>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.state_dir)
            .with_context(|| format!("failed to create {}", config.state_dir.display()))?;

        let state_store = DeployStateStore::load(
            config.state_dir.join("state.json"),
            config.recent_event_cap,
            config.processed_event_cap,
        )?;
        let link_registry = LinkRegistry::load(config.state_dir.join("links.json"))?;
        let rate_limit_guard = RateLimitGuard::new(config.rate_limit_cooldown_ms);

        Ok(Self {
            config,
            chat_client,
            issue_client,
            notifier,
            rate_limit_guard,
            state_store,
            link_registry,
            live: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            live: self.live.clone(),
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            if !self.is_live() {
                println!("deploy bridge stopped");
                return Ok(());
            }

            match self.poll_once().await {
                Ok(report) => {
                    println!(
                        "deploy bridge poll: channel={} discovered={} matched={} new={} link_updates={} sync_applied={} sync_skipped={} sync_failed={}",
                        self.config.channel_id,
                        report.discovered_messages,
                        report.matched_events,
                        report.new_events,
                        report.link_updates,
                        report.sync_applied,
                        report.sync_skipped,
                        report.failed_syncs,
                    );
                    if self.config.poll_once {
                        return Ok(());
                    }
                }
                Err(error) => {
                    eprintln!("deploy bridge poll error: {error:#}");
                    self.notifier
                        .notify(NotifyLevel::Error, &format!("poll cycle failed: {error:#}"));
                    if self.config.poll_once {
                        return Err(error);
                    }
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!("deploy bridge shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// One poll cycle: guard check, history fetch, match, dedup, link update,
    /// synchronization. Messages are processed in platform-returned order.
    pub async fn poll_once(&mut self) -> Result<PollCycleReport> {
        let mut report = PollCycleReport::default();

        if let Err(error) = self.rate_limit_guard.check(current_unix_timestamp_ms()) {
            report.skipped_cooldown = true;
            println!("deploy bridge poll skipped: {error}");
            return Ok(report);
        }

        let history = self
            .chat_client
            .fetch_history(
                &self.config.channel_id,
                self.state_store.last_message_ts(),
                self.config.history_limit,
            )
            .await;

        let messages = match history {
            Ok(messages) => messages,
            Err(ChatError::RateLimited {
                retry_after_seconds,
            }) => {
                report.rate_limited = true;
                if self
                    .rate_limit_guard
                    .record_rate_limit(current_unix_timestamp_ms())
                {
                    let window_seconds = retry_after_seconds
                        .unwrap_or(self.config.rate_limit_cooldown_ms.div_ceil(1_000));
                    self.notifier.notify(
                        NotifyLevel::Warning,
                        &format!(
                            "chat api limit reached, suspending polls for {window_seconds}s"
                        ),
                    );
                }
                return Ok(report);
            }
            Err(error) => {
                return Err(error).context("failed to fetch channel history");
            }
        };

        if !self.is_live() {
            return Ok(report);
        }

        report.discovered_messages = messages.len();
        let mut state_dirty = false;

        if let Some(newest_ts) = newest_message_ts(&messages) {
            let newest_ts = newest_ts.to_string();
            if self.state_store.set_last_message_ts(&newest_ts) {
                state_dirty = true;
            }
        }

        let mut events = Vec::new();
        for message in &messages {
            if let Some(event) = match_deployment(message, &self.config.channel_id) {
                events.push(event);
            }
        }
        report.matched_events = events.len();

        let fresh = self.state_store.ingest(events);
        report.new_events = fresh.len();
        if !fresh.is_empty() {
            state_dirty = true;
        }

        for event in &fresh {
            if !self.is_live() {
                return Ok(report);
            }
            let Some(link) = self.link_registry.get_link(&event.job_id) else {
                continue;
            };
            let ticket_id = link.ticket_id.clone();

            if self.link_registry.update_status(
                &event.job_id,
                event.status,
                current_unix_timestamp_ms(),
            )? {
                report.link_updates = report.link_updates.saturating_add(1);
            }

            report.sync_attempts = report.sync_attempts.saturating_add(1);
            match synchronize(self.issue_client.as_ref(), &ticket_id, event.status).await {
                Ok(outcome) if outcome.updated => {
                    report.sync_applied = report.sync_applied.saturating_add(1);
                    let transition = outcome.transition_applied.unwrap_or_default();
                    self.notifier.notify(
                        NotifyLevel::Success,
                        &format!(
                            "ticket {ticket_id} updated via '{transition}' for job {} ({})",
                            event.job_id, event.status
                        ),
                    );
                }
                Ok(outcome) => {
                    report.sync_skipped = report.sync_skipped.saturating_add(1);
                    if let Some(reason) = outcome.reason {
                        self.notifier.notify(
                            NotifyLevel::Warning,
                            &format!("ticket {ticket_id} left unchanged: {reason}"),
                        );
                    }
                }
                Err(error) => {
                    report.failed_syncs = report.failed_syncs.saturating_add(1);
                    self.notifier.notify(
                        NotifyLevel::Error,
                        &format!("failed to update ticket {ticket_id}: {error}"),
                    );
                }
            }
        }

        if state_dirty && self.is_live() {
            self.state_store.save()?;
        }
        Ok(report)
    }
}

fn newest_message_ts(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .max_by(|left, right| ts_value(&left.ts).total_cmp(&ts_value(&right.ts)))
        .map(|message| message.ts.as_str())
}

fn ts_value(ts: &str) -> f64 {
    ts.parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests;
