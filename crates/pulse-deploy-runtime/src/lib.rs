//! Deployment event correlation and status synchronization engine.
//!
//! Polls a chat channel for deployment notifications, recognizes and
//! deduplicates deployment events, correlates them against persisted
//! job-to-ticket links, and drives idempotent issue tracker transitions.

pub mod deploy_runtime;
pub mod event_store;
pub mod link_registry;
pub mod notify;
pub mod pattern_matcher;
pub mod status_sync;

pub use deploy_runtime::{
    run_deploy_bridge, DeployRuntime, DeployRuntimeConfig, PollCycleReport, StopHandle,
};
pub use event_store::DeployStateStore;
pub use link_registry::{DeploymentLink, LinkRegistry};
pub use notify::{NotificationSink, NotifyLevel, StdoutNotifier};
pub use pattern_matcher::{match_deployment, DeploymentEvent, DeploymentStatus};
pub use status_sync::{synchronize, SyncOutcome};
