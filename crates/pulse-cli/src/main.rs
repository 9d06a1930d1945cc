//! `pulse` binary: wires the Slack and Jira clients into the deploy bridge
//! and exposes the manual link/sync surfaces.

mod cli_args;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::Parser;

use pulse_core::current_unix_timestamp_ms;
use pulse_deploy_runtime::event_store::{
    DEFAULT_PROCESSED_EVENT_CAP, DEFAULT_RECENT_EVENT_CAP,
};
use pulse_deploy_runtime::{
    run_deploy_bridge, synchronize, DeployRuntimeConfig, DeployStateStore, DeploymentStatus,
    LinkRegistry, StdoutNotifier,
};
use pulse_jira::JiraApiClient;
use pulse_slack::{ChatClient, SlackApiClient};

use cli_args::{Cli, Command, LinksCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Run {
            poll_interval_seconds,
            poll_once,
        } => run_bridge(&cli, *poll_interval_seconds, *poll_once).await,
        Command::AuthTest => auth_test(&cli).await,
        Command::Channels => list_channels(&cli).await,
        Command::Links { command } => manage_links(&cli, command),
        Command::Sync { ticket_id, status } => manual_sync(&cli, ticket_id, status).await,
        Command::Events => print_events(&cli),
    }
}

fn slack_client(cli: &Cli) -> Result<SlackApiClient> {
    let Some(token) = cli.slack_token.as_deref().filter(|t| !t.trim().is_empty()) else {
        bail!("slack token not configured, pass --slack-token or set PULSE_SLACK_TOKEN");
    };
    SlackApiClient::new(&cli.slack_api_base, token, cli.request_timeout_ms)
}

fn jira_client(cli: &Cli) -> Result<JiraApiClient> {
    let Some(url) = cli.jira_url.as_deref().filter(|v| !v.trim().is_empty()) else {
        bail!("jira url not configured, pass --jira-url or set PULSE_JIRA_URL");
    };
    let Some(email) = cli.jira_email.as_deref().filter(|v| !v.trim().is_empty()) else {
        bail!("jira email not configured, pass --jira-email or set PULSE_JIRA_EMAIL");
    };
    let Some(token) = cli.jira_token.as_deref().filter(|v| !v.trim().is_empty()) else {
        bail!("jira token not configured, pass --jira-token or set PULSE_JIRA_TOKEN");
    };
    JiraApiClient::new(url, email, token, cli.request_timeout_ms)
}

async fn run_bridge(cli: &Cli, poll_interval_seconds: u64, poll_once: bool) -> Result<()> {
    let Some(channel_id) = cli
        .slack_channel
        .as_deref()
        .filter(|v| !v.trim().is_empty())
    else {
        bail!("slack channel not configured, pass --slack-channel or set PULSE_SLACK_CHANNEL");
    };

    let chat_client = Arc::new(slack_client(cli)?);
    let issue_client = Arc::new(jira_client(cli)?);

    let mut config = DeployRuntimeConfig::new(channel_id, &cli.state_dir);
    config.poll_interval = Duration::from_secs(poll_interval_seconds);
    config.poll_once = poll_once;

    run_deploy_bridge(config, chat_client, issue_client, Arc::new(StdoutNotifier)).await
}

async fn auth_test(cli: &Cli) -> Result<()> {
    let identity = slack_client(cli)?.test_auth().await?;
    println!(
        "slack auth ok: user_id={} user={} team={}",
        identity.user_id, identity.user, identity.team
    );
    Ok(())
}

async fn list_channels(cli: &Cli) -> Result<()> {
    let channels = slack_client(cli)?.list_channels().await?;
    if channels.is_empty() {
        println!("no channels visible to this token");
        return Ok(());
    }
    for channel in channels {
        println!(
            "{}  {}  member={}",
            channel.id, channel.name, channel.is_member
        );
    }
    Ok(())
}

fn manage_links(cli: &Cli, command: &LinksCommand) -> Result<()> {
    let mut registry = LinkRegistry::load(cli.state_dir.join("links.json"))?;
    match command {
        LinksCommand::List => {
            if registry.links().is_empty() {
                println!("no deployment links");
                return Ok(());
            }
            for link in registry.links() {
                println!(
                    "job {} -> {} status={} updated_at_unix_ms={}",
                    link.job_id, link.ticket_id, link.status, link.updated_at_unix_ms
                );
            }
        }
        LinksCommand::Add { job_id, ticket_id } => {
            // A link created while an event for this job is still in the
            // window adopts that event's status instead of Unknown.
            let initial_status = DeployStateStore::load(
                cli.state_dir.join("state.json"),
                DEFAULT_RECENT_EVENT_CAP,
                DEFAULT_PROCESSED_EVENT_CAP,
            )?
            .latest_status_for_job(job_id)
            .unwrap_or(DeploymentStatus::Unknown);
            let link = registry.add_link(
                job_id,
                ticket_id,
                initial_status,
                current_unix_timestamp_ms(),
            )?;
            println!(
                "linked job {} to {} (status {})",
                link.job_id, link.ticket_id, link.status
            );
        }
        LinksCommand::Remove { job_id } => {
            if registry.remove_link(job_id)? {
                println!("removed link for job {job_id}");
            } else {
                println!("no link for job {job_id}");
            }
        }
        LinksCommand::Clear => {
            let removed = registry.clear()?;
            println!("removed {removed} deployment links");
        }
    }
    Ok(())
}

async fn manual_sync(cli: &Cli, ticket_id: &str, status: &str) -> Result<()> {
    let status = status
        .parse::<DeploymentStatus>()
        .map_err(|error| anyhow!(error))?;
    let client = jira_client(cli)?;
    let outcome = synchronize(&client, ticket_id, status).await?;
    match (outcome.updated, outcome.transition_applied, outcome.reason) {
        (true, Some(transition), _) => {
            println!("ticket {ticket_id} updated via '{transition}'");
        }
        (_, _, Some(reason)) => println!("ticket {ticket_id} left unchanged: {reason}"),
        _ => println!("ticket {ticket_id} already in an appropriate status"),
    }
    Ok(())
}

fn print_events(cli: &Cli) -> Result<()> {
    let store = DeployStateStore::load(
        cli.state_dir.join("state.json"),
        DEFAULT_RECENT_EVENT_CAP,
        DEFAULT_PROCESSED_EVENT_CAP,
    )?;
    if store.recent_events().is_empty() {
        println!("no deployment events recorded");
        return Ok(());
    }
    for event in store.recent_events() {
        println!(
            "{} {} job={} build={} url={} channel={} user={}",
            event.timestamp,
            event.status,
            event.job_name,
            event.job_id,
            if event.deployment_url.is_empty() {
                "-"
            } else {
                &event.deployment_url
            },
            event.channel,
            event.user
        );
    }
    Ok(())
}
