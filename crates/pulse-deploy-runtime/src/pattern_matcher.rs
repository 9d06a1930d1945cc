//! Recognizes deployment notifications in raw chat messages.
//!
//! The matcher runs an ordered cascade of patterns, most specific first,
//! and the first match wins. The order is load-bearing: the catch-all
//! `STATUS: token` form would truncate multi-word job names that the quoted
//! forms capture whole, so reordering silently changes extraction results.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use pulse_slack::ChatMessage;

/// Lifecycle stage a deployment notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "SUCCESSFUL")]
    Successful,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "STARTED" => Ok(Self::Started),
            "SUCCESSFUL" => Ok(Self::Successful),
            "FAILED" => Ok(Self::Failed),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(format!(
                "invalid deployment status '{other}', expected STARTED, SUCCESSFUL, FAILED or UNKNOWN"
            )),
        }
    }
}

/// One recognized deployment notification. Immutable once created; newer
/// events for the same job supersede it, nothing mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    pub id: String,
    pub raw_text: String,
    pub job_name: String,
    pub job_id: String,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub deployment_url: String,
    pub channel: String,
    pub user: String,
    pub timestamp: String,
}

/// Fields captured by a winning pattern before provenance is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDeployment {
    pub status: DeploymentStatus,
    pub job_name: String,
    pub job_id: String,
    pub deployment_url: String,
}

enum PatternShape {
    NameIdUrl,
    NameId,
    NameOnly,
}

struct DeploymentPattern {
    regex: Regex,
    shape: PatternShape,
}

fn pattern(raw: &str, shape: PatternShape) -> DeploymentPattern {
    DeploymentPattern {
        regex: Regex::new(raw).expect("deployment pattern must compile"),
        shape,
    }
}

static DEPLOYMENT_PATTERNS: LazyLock<Vec<DeploymentPattern>> = LazyLock::new(|| {
    vec![
        // URL in parentheses, job name quoted / bare.
        pattern(
            r"(STARTED|SUCCESSFUL|FAILED):\s*Job\s+'([^']+)\s+\[(\d+)\]'\s*\(([^)]+)\)",
            PatternShape::NameIdUrl,
        ),
        pattern(
            r#"(STARTED|SUCCESSFUL|FAILED):\s*Job\s+"([^"]+)\s+\[(\d+)\]"\s*\(([^)]+)\)"#,
            PatternShape::NameIdUrl,
        ),
        pattern(
            r"(STARTED|SUCCESSFUL|FAILED):\s*Job\s+(\S+)\s+\[(\d+)\]\s*\(([^)]+)\)",
            PatternShape::NameIdUrl,
        ),
        pattern(
            r"(STARTED|SUCCESSFUL|FAILED):\s*(\S+)\s+\[(\d+)\]\s*\(([^)]+)\)",
            PatternShape::NameIdUrl,
        ),
        // URL wrapped in angle brackets inside the parentheses.
        pattern(
            r"(STARTED|SUCCESSFUL|FAILED):\s*Job\s+'([^']+)\s+\[(\d+)\]'\s*\(<([^>]+)>\)",
            PatternShape::NameIdUrl,
        ),
        pattern(
            r#"(STARTED|SUCCESSFUL|FAILED):\s*Job\s+"([^"]+)\s+\[(\d+)\]"\s*\(<([^>]+)>\)"#,
            PatternShape::NameIdUrl,
        ),
        pattern(
            r"(STARTED|SUCCESSFUL|FAILED):\s*Job\s+(\S+)\s+\[(\d+)\]\s*\(<([^>]+)>\)",
            PatternShape::NameIdUrl,
        ),
        pattern(
            r"(STARTED|SUCCESSFUL|FAILED):\s*(\S+)\s+\[(\d+)\]\s*\(<([^>]+)>\)",
            PatternShape::NameIdUrl,
        ),
        // No URL.
        pattern(
            r"(STARTED|SUCCESSFUL|FAILED):\s*Job\s+'([^']+)\s+\[(\d+)\]'",
            PatternShape::NameId,
        ),
        pattern(
            r#"(STARTED|SUCCESSFUL|FAILED):\s*Job\s+"([^"]+)\s+\[(\d+)\]""#,
            PatternShape::NameId,
        ),
        pattern(
            r"(STARTED|SUCCESSFUL|FAILED):\s*Job\s+(\S+)\s+\[(\d+)\]",
            PatternShape::NameId,
        ),
        pattern(
            r"(STARTED|SUCCESSFUL|FAILED):\s*(\S+)\s+\[(\d+)\]",
            PatternShape::NameId,
        ),
        // Catch-all: status plus a bare token.
        pattern(r"(STARTED|SUCCESSFUL|FAILED):\s*(\S+)", PatternShape::NameOnly),
        // Dash-separated form some notifier bots emit.
        pattern(
            r"(STARTED|SUCCESSFUL|FAILED)\s*-\s*(\S+)\s+\[(\d+)\]",
            PatternShape::NameId,
        ),
    ]
});

/// Pulls the text a matcher run should see out of a message: plain text
/// wins, then the first attachment's first field value, then its fallback.
pub fn extract_message_text(message: &ChatMessage) -> Option<String> {
    if !message.text.trim().is_empty() {
        return Some(message.text.clone());
    }
    let attachment = message.attachments.first()?;
    let text = if let Some(field) = attachment.fields.first() {
        field.value.clone()
    } else {
        attachment.fallback.clone().unwrap_or_default()
    };
    if text.trim().is_empty() {
        return None;
    }
    Some(text)
}

fn status_from_token(token: &str) -> Option<DeploymentStatus> {
    match token {
        "STARTED" => Some(DeploymentStatus::Started),
        "SUCCESSFUL" => Some(DeploymentStatus::Successful),
        "FAILED" => Some(DeploymentStatus::Failed),
        _ => None,
    }
}

fn strip_link_brackets(url: &str) -> &str {
    url.strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(url)
}

/// Runs the cascade over extracted text. Returns `None` for anything that is
/// not a deployment notification; an unrecognized leading token is a
/// non-match, never an `Unknown`-status event.
pub fn match_deployment_text(text: &str) -> Option<ParsedDeployment> {
    for pattern in DEPLOYMENT_PATTERNS.iter() {
        let Some(captures) = pattern.regex.captures(text) else {
            continue;
        };
        let status = status_from_token(captures.get(1)?.as_str())?;
        let group = |index: usize| {
            captures
                .get(index)
                .map(|value| value.as_str().to_string())
                .unwrap_or_default()
        };
        let (job_name, job_id, deployment_url) = match pattern.shape {
            PatternShape::NameIdUrl => (
                group(2),
                group(3),
                strip_link_brackets(&group(4)).to_string(),
            ),
            PatternShape::NameId => (group(2), group(3), String::new()),
            PatternShape::NameOnly => (group(2), String::new(), String::new()),
        };
        return Some(ParsedDeployment {
            status,
            job_name: non_empty_or_unknown(job_name),
            job_id: non_empty_or_unknown(job_id),
            deployment_url,
        });
    }
    None
}

fn non_empty_or_unknown(value: String) -> String {
    if value.trim().is_empty() {
        "Unknown".to_string()
    } else {
        value
    }
}

/// Converts a raw message into a deployment event, or `None` when the
/// message does not describe a deployment. Pure aside from the matching.
pub fn match_deployment(message: &ChatMessage, channel_id: &str) -> Option<DeploymentEvent> {
    let text = extract_message_text(message)?;
    let parsed = match_deployment_text(&text)?;
    Some(DeploymentEvent {
        id: message.ts.clone(),
        raw_text: text,
        job_name: parsed.job_name,
        job_id: parsed.job_id,
        status: parsed.status,
        deployment_url: parsed.deployment_url,
        channel: channel_id.to_string(),
        user: message.author().to_string(),
        timestamp: message.ts.clone(),
    })
}
