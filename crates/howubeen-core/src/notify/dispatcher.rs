use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use super::{Message, NotificationCapability};
use crate::error::NotifyError;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub address: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sends one message to many recipients.
///
/// Attempts run concurrently, each under its own timeout; a failing or slow
/// recipient never affects another. Outcomes are returned in recipient order.
#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn NotificationCapability>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn NotificationCapability>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub async fn notify(&self, recipients: &[String], message: &Message) -> Vec<DeliveryOutcome> {
        let attempts = recipients
            .iter()
            .map(|address| self.deliver(address, message));
        join_all(attempts).await
    }

    async fn deliver(&self, address: &str, message: &Message) -> DeliveryOutcome {
        let attempt = self
            .transport
            .send(address, &message.subject, &message.body);
        let result = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.timeout.as_millis() as u64)),
        };

        match result {
            Ok(()) => {
                debug!(to = %address, subject = %message.subject, "notification delivered");
                DeliveryOutcome {
                    address: address.to_string(),
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                warn!(to = %address, error = %e, "notification delivery failed");
                DeliveryOutcome {
                    address: address.to_string(),
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails for one address, hangs for another, succeeds otherwise.
    struct Scripted {
        fail: &'static str,
        hang: &'static str,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationCapability for Scripted {
        async fn send(&self, address: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            if address == self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if address == self.fail {
                return Err(NotifyError::Transport("connection reset".into()));
            }
            self.sent.lock().unwrap().push(address.to_string());
            Ok(())
        }
    }

    fn message() -> Message {
        Message {
            subject: "s".into(),
            body: "b".into(),
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_block_others() {
        let transport = Arc::new(Scripted {
            fail: "two@x",
            hang: "",
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = NotificationDispatcher::new(transport.clone(), Duration::from_secs(1));
        let recipients = vec!["one@x".to_string(), "two@x".to_string(), "three@x".to_string()];

        let outcomes = dispatcher.notify(&recipients, &message()).await;

        let flags: Vec<_> = outcomes.iter().map(|o| o.success).collect();
        assert_eq!(flags, vec![true, false, true]);
        assert!(outcomes[1].error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(*transport.sent.lock().unwrap(), vec!["one@x", "three@x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_recipient_times_out() {
        let transport = Arc::new(Scripted {
            fail: "",
            hang: "slow@x",
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = NotificationDispatcher::new(transport, Duration::from_millis(200));
        let recipients = vec!["slow@x".to_string(), "fast@x".to_string()];

        let outcomes = dispatcher.notify(&recipients, &message()).await;

        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.as_deref().unwrap().contains("timed out"));
        assert!(outcomes[1].success);
    }

    #[tokio::test]
    async fn no_recipients_no_outcomes() {
        let transport = Arc::new(Scripted {
            fail: "",
            hang: "",
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = NotificationDispatcher::new(transport, Duration::from_secs(1));
        assert!(dispatcher.notify(&[], &message()).await.is_empty());
    }
}
