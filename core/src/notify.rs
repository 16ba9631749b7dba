use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

/// How long the connection failure stays on screen unless dismissed earlier.
pub const CONNECTION_FAILURE_DURATION: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub duration: Duration,
    pub dismissible: bool,
}

impl Notification {
    /// Shown once when the liveness probe fails.
    pub fn connection_failed(api_url: &str) -> Self {
        Self {
            severity: Severity::Error,
            title: "Failed to connect to agent server".to_string(),
            description: format!(
                "Please ensure your graph is running at {api_url} and your API key is \
                 correctly set (if connecting to a deployed graph)."
            ),
            duration: CONNECTION_FAILURE_DURATION,
            dismissible: true,
        }
    }
}

/// Fire-and-forget surface for user-visible notices.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications to whoever renders them.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, UnboundedReceiver<Notification>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            warn!("notification receiver dropped");
        }
    }
}

/// Writes notifications to the log. Default sink for headless sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: Notification) {
        let Notification {
            severity,
            title,
            description,
            ..
        } = notification;
        match severity {
            Severity::Info => info!(%title, %description, "notification"),
            Severity::Warning => warn!(%title, %description, "notification"),
            Severity::Error => error!(%title, %description, "notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failure_names_the_backend() {
        let notice = Notification::connection_failed("https://graph.example.com");
        assert_eq!(notice.severity, Severity::Error);
        assert!(notice.dismissible);
        assert!(notice.description.contains("https://graph.example.com"));
    }

    #[tokio::test]
    async fn channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Notification::connection_failed("a"));
        notifier.notify(Notification::connection_failed("b"));
        assert!(rx.recv().await.expect("first").description.contains(" a "));
        assert!(rx.recv().await.expect("second").description.contains(" b "));
    }
}
