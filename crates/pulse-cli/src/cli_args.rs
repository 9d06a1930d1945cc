use std::path::PathBuf;

use clap::{Parser, Subcommand};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "pulse",
    about = "Watches a Slack channel for deployment notifications and keeps linked Jira tickets in sync",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "PULSE_STATE_DIR",
        default_value = ".pulse",
        help = "Directory holding the event window and link registry state files."
    )]
    pub state_dir: PathBuf,

    #[arg(
        long,
        env = "PULSE_SLACK_TOKEN",
        hide_env_values = true,
        help = "Slack bot token (xoxb-...)."
    )]
    pub slack_token: Option<String>,

    #[arg(
        long,
        env = "PULSE_SLACK_CHANNEL",
        help = "Slack channel id to watch for deployment notifications."
    )]
    pub slack_channel: Option<String>,

    #[arg(
        long,
        env = "PULSE_SLACK_API_BASE",
        default_value = "https://slack.com/api",
        help = "Slack Web API base url. Override for tests or proxies."
    )]
    pub slack_api_base: String,

    #[arg(
        long,
        env = "PULSE_JIRA_URL",
        help = "Jira site base url, e.g. https://acme.atlassian.net."
    )]
    pub jira_url: Option<String>,

    #[arg(long, env = "PULSE_JIRA_EMAIL", help = "Jira account email.")]
    pub jira_email: Option<String>,

    #[arg(
        long,
        env = "PULSE_JIRA_TOKEN",
        hide_env_values = true,
        help = "Jira API token."
    )]
    pub jira_token: Option<String>,

    #[arg(
        long,
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Per-request HTTP timeout in milliseconds."
    )]
    pub request_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the deploy bridge poll loop.
    Run {
        #[arg(
            long,
            default_value_t = 30,
            value_parser = parse_positive_u64,
            help = "Seconds between poll cycles."
        )]
        poll_interval_seconds: u64,

        #[arg(long, help = "Run a single poll cycle and exit.")]
        poll_once: bool,
    },
    /// Verify the Slack token and print the bot identity.
    AuthTest,
    /// List channels visible to the Slack token.
    Channels,
    /// Manage job-to-ticket deployment links.
    Links {
        #[command(subcommand)]
        command: LinksCommand,
    },
    /// Manually synchronize one ticket with a deployment outcome.
    Sync {
        ticket_id: String,
        #[arg(help = "Deployment outcome: STARTED, SUCCESSFUL or FAILED.")]
        status: String,
    },
    /// Print the recent deployment event window.
    Events,
}

#[derive(Debug, Subcommand)]
pub enum LinksCommand {
    /// List all deployment links.
    List,
    /// Link a deployment job to a ticket (re-linking keeps the known status).
    Add { job_id: String, ticket_id: String },
    /// Remove the link for a job.
    Remove { job_id: String },
    /// Remove every link.
    Clear,
}
