//! Slack Web API implementation of the chat client seam.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::chat_client::{
    AuthIdentity, ChatChannel, ChatClient, ChatError, ChatMessage,
};
use crate::transport_helpers::{parse_retry_after, truncate_for_error};

#[derive(Debug, Clone, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChannelListResponse {
    ok: bool,
    #[serde(default)]
    channels: Vec<ChatChannel>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Slack Web API client. No internal retry loop: rate limiting is owned by
/// the guard and the poll cadence, not the HTTP layer.
#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl SlackApiClient {
    pub fn new(api_base: &str, bot_token: &str, request_timeout_ms: u64) -> Result<Self> {
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
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
        })
    }

    async fn get_envelope<T>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ChatError>
    where
        T: DeserializeOwned,
    {
        let response = request.bearer_auth(&self.bot_token).send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ChatError::RateLimited {
                retry_after_seconds: parse_retry_after(response.headers()),
            });
        }
        if status.as_u16() == 401 {
            return Err(ChatError::Unauthorized(format!(
                "slack {operation} returned status 401"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api(format!(
                "slack {operation} failed with status {}: {}",
                status.as_u16(),
                truncate_for_error(&body, 800)
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|error| ChatError::Decode(format!("slack {operation}: {error}")))
    }

    fn envelope_error(operation: &str, error: Option<String>) -> ChatError {
        let code = error.unwrap_or_else(|| "unknown_error".to_string());
        match code.as_str() {
            "ratelimited" => ChatError::RateLimited {
                retry_after_seconds: None,
            },
            "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" => {
                ChatError::Unauthorized(code)
            }
            _ => ChatError::Api(format!("slack {operation} failed: {code}")),
        }
    }
}

#[async_trait]
impl ChatClient for SlackApiClient {
    async fn fetch_history(
        &self,
        channel_id: &str,
        oldest: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let limit_value = limit.to_string();
        let mut request = self
            .http
            .get(format!("{}/conversations.history", self.api_base))
            .query(&[("channel", channel_id), ("limit", limit_value.as_str())]);
        if let Some(oldest) = oldest {
            request = request.query(&[("oldest", oldest)]);
        }

        let envelope: HistoryResponse = self.get_envelope("conversations.history", request).await?;
        if !envelope.ok {
            return Err(Self::envelope_error(
                "conversations.history",
                envelope.error,
            ));
        }
        Ok(envelope.messages)
    }

    async fn list_channels(&self) -> Result<Vec<ChatChannel>, ChatError> {
        let request = self
            .http
            .get(format!("{}/conversations.list", self.api_base))
            .query(&[("types", "public_channel,private_channel")]);

        let envelope: ChannelListResponse = self.get_envelope("conversations.list", request).await?;
        if !envelope.ok {
            return Err(Self::envelope_error("conversations.list", envelope.error));
        }
        Ok(envelope.channels)
    }

    async fn test_auth(&self) -> Result<AuthIdentity, ChatError> {
        let request = self.http.post(format!("{}/auth.test", self.api_base));
        let envelope: AuthTestResponse = self.get_envelope("auth.test", request).await?;
        if !envelope.ok {
            return Err(Self::envelope_error("auth.test", envelope.error));
        }
        let user_id = envelope
            .user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                ChatError::Decode("auth.test response is missing user_id".to_string())
            })?;
        Ok(AuthIdentity {
            user_id,
            user: envelope.user.unwrap_or_default(),
            team: envelope.team.unwrap_or_default(),
        })
    }
}
