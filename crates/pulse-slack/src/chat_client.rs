//! Chat platform types and the client seam the deploy runtime polls through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One message returned by a channel history fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    pub ts: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub attachments: Vec<ChatAttachment>,
}

impl ChatMessage {
    /// Author identity for provenance: human user when present, else bot id.
    pub fn author(&self) -> &str {
        self.user
            .as_deref()
            .or(self.bot_id.as_deref())
            .unwrap_or("unknown")
    }
}

/// Bot-style message attachment carrying fields and/or fallback text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatAttachment {
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub fields: Vec<ChatAttachmentField>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatAttachmentField {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub value: String,
}

/// Channel summary from the channel listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChannel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_member: bool,
}

/// Identity reported by the auth check endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthIdentity {
    pub user_id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub team: String,
}

/// Failures surfaced by chat platform calls.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat api rate limited")]
    RateLimited { retry_after_seconds: Option<u64> },
    #[error("chat api rejected credentials: {0}")]
    Unauthorized(String),
    #[error("rate limit cooldown active, {remaining_seconds}s remaining")]
    CooldownActive { remaining_seconds: u64 },
    #[error("chat api error: {0}")]
    Api(String),
    #[error("chat transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode chat response: {0}")]
    Decode(String),
}

#[async_trait]
/// Trait contract for the chat platform operations the deploy bridge uses.
pub trait ChatClient: Send + Sync {
    /// Fetches channel history, oldest-exclusive when `oldest` is given.
    async fn fetch_history(
        &self,
        channel_id: &str,
        oldest: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatError>;

    /// Lists channels visible to the configured token.
    async fn list_channels(&self) -> Result<Vec<ChatChannel>, ChatError>;

    /// Verifies the configured token and reports the bot identity.
    async fn test_auth(&self) -> Result<AuthIdentity, ChatError>;
}
