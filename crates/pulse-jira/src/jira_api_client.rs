//! Jira Cloud REST implementation of the issue client seam.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::issue_client::{IssueClient, IssueError, TransitionCandidate};

#[derive(Debug, Clone, Deserialize)]
struct IssueResponse {
    fields: IssueFields,
}

#[derive(Debug, Clone, Deserialize)]
struct IssueFields {
    status: IssueStatus,
}

#[derive(Debug, Clone, Deserialize)]
struct IssueStatus {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TransitionListResponse {
    #[serde(default)]
    transitions: Vec<TransitionRow>,
}

#[derive(Debug, Clone, Deserialize)]
struct TransitionRow {
    id: String,
    name: String,
    to: TransitionTarget,
}

#[derive(Debug, Clone, Deserialize)]
struct TransitionTarget {
    name: String,
}

/// Jira REST client (API v3, basic auth with an API token). Requests are
/// single-shot: the engine never retries tracker failures automatically.
#[derive(Clone)]
pub struct JiraApiClient {
    http: reqwest::Client,
    api_base: String,
    email: String,
    api_token: String,
}

impl JiraApiClient {
    pub fn new(
        base_url: &str,
        email: &str,
        api_token: &str,
        request_timeout_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("pulse-deploy-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create jira api client")?;

        Ok(Self {
            http,
            api_base: format!("{}/rest/api/3", base_url.trim_end_matches('/')),
            email: email.trim().to_string(),
            api_token: api_token.trim().to_string(),
        })
    }

    async fn check_status(
        ticket_id: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, IssueError> {
        let status = response.status();
        match status.as_u16() {
            200..=299 => Ok(response),
            401 => Err(IssueError::Unauthorized),
            403 => Err(IssueError::Forbidden),
            404 => Err(IssueError::NotFound(ticket_id.to_string())),
            code => {
                let body = response.text().await.unwrap_or_default();
                Err(IssueError::Status { status: code, body })
            }
        }
    }
}

#[async_trait]
impl IssueClient for JiraApiClient {
    async fn get_ticket_status(&self, ticket_id: &str) -> Result<String, IssueError> {
        let response = self
            .http
            .get(format!("{}/issue/{}", self.api_base, ticket_id))
            .query(&[("fields", "status")])
            .basic_auth(&self.email, Some(&self.api_token))
            .send()
            .await?;
        let response = Self::check_status(ticket_id, response).await?;
        let issue: IssueResponse = response
            .json()
            .await
            .map_err(|error| IssueError::Decode(format!("issue {ticket_id}: {error}")))?;
        Ok(issue.fields.status.name)
    }

    async fn list_transitions(
        &self,
        ticket_id: &str,
    ) -> Result<Vec<TransitionCandidate>, IssueError> {
        let response = self
            .http
            .get(format!("{}/issue/{}/transitions", self.api_base, ticket_id))
            .basic_auth(&self.email, Some(&self.api_token))
            .send()
            .await?;
        let response = Self::check_status(ticket_id, response).await?;
        let listing: TransitionListResponse = response
            .json()
            .await
            .map_err(|error| IssueError::Decode(format!("transitions {ticket_id}: {error}")))?;
        Ok(listing
            .transitions
            .into_iter()
            .map(|row| TransitionCandidate {
                id: row.id,
                name: row.name,
                target_status_name: row.to.name,
            })
            .collect())
    }

    async fn apply_transition(
        &self,
        ticket_id: &str,
        transition_id: &str,
    ) -> Result<(), IssueError> {
        let response = self
            .http
            .post(format!("{}/issue/{}/transitions", self.api_base, ticket_id))
            .basic_auth(&self.email, Some(&self.api_token))
            .json(&json!({ "transition": { "id": transition_id } }))
            .send()
            .await?;
        Self::check_status(ticket_id, response).await?;
        Ok(())
    }
}
