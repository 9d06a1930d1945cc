//! Slack Web API client used by the Pulse deploy bridge.
//!
//! Exposes the `ChatClient` seam the runtime polls through, the reqwest
//! implementation against the Slack Web API, and the rate-limit guard that
//! suppresses calls locally while Slack is throttling us.

pub mod chat_client;
pub mod rate_limit;
pub mod slack_api_client;
pub mod transport_helpers;

pub use chat_client::{
    AuthIdentity, ChatAttachment, ChatAttachmentField, ChatChannel, ChatClient, ChatError,
    ChatMessage,
};
pub use rate_limit::{RateLimitGuard, RateLimitStatus, DEFAULT_COOLDOWN_MS};
pub use slack_api_client::SlackApiClient;
