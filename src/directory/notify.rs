//! Outbound notifications about account and wiretap events.

use tracing::info;

/// Fire-and-forget notification channel.
///
/// Implementations must not block and must swallow their own failures.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, text: &str);
}

/// [`NotificationSink`] that writes each notification to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, text: &str) {
        info!(target: "chatwire::notify", text, "notification");
    }
}
