//! Outcome notification port.
//!
//! The engine reports user-visible outcomes (cooldowns, transitions,
//! failures) through this seam; delivery is fire-and-forget.

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NotifyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Output port for user-visible outcomes.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, level: NotifyLevel, message: &str);
}

/// Default sink: one line per notification on stdout/stderr.
pub struct StdoutNotifier;

impl NotificationSink for StdoutNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Warning | NotifyLevel::Error => {
                eprintln!("deploy bridge {}: {message}", level.as_str());
            }
            _ => println!("deploy bridge {}: {message}", level.as_str()),
        }
    }
}
