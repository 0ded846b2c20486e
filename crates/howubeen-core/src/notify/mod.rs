//! Outbound notifications.
//!
//! A [`NotificationCapability`] delivers one message to one address and
//! reports the outcome as data. The [`NotificationDispatcher`] fans a
//! message out to many recipients with isolated, time-bounded attempts.

pub mod dispatcher;
pub mod webhook;

pub use dispatcher::{DeliveryOutcome, NotificationDispatcher};
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::NotifyError;
use crate::model::{EmergencyContact, User};
use crate::storage::NotificationsConfig;

/// Delivers a single message. Must never panic; failures are returned.
#[async_trait]
pub trait NotificationCapability: Send + Sync {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Subject and body shared by every recipient of one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

impl Message {
    /// Reminder sent to the user after the warning threshold.
    pub fn reminder(user: &User, hours_inactive: i64) -> Self {
        let name = display_name(user);
        Self {
            subject: "How have you been? Time to check in".to_string(),
            body: format!(
                "Hi {name},\n\nWe haven't heard from you in {hours_inactive} hours. \
                 Take a moment to record a quick check-in so we know you're okay.\n\n\
                 If we don't hear from you soon, your emergency contacts will be notified."
            ),
        }
    }

    /// Alert sent to one emergency contact after the emergency threshold.
    pub fn emergency_alert(user: &User, contact: &EmergencyContact, hours_inactive: i64) -> Self {
        let name = display_name(user);
        Self {
            subject: format!("Safety alert: {name} has not checked in"),
            body: format!(
                "Hi {},\n\n{name} listed you as an emergency contact. They have not \
                 checked in for {hours_inactive} hours. Please try to reach them.",
                contact.name
            ),
        }
    }
}

fn display_name(user: &User) -> &str {
    if user.name.trim().is_empty() {
        &user.address
    } else {
        &user.name
    }
}

/// Fallback transport: records the message in the log and reports success.
pub struct LogNotifier;

#[async_trait]
impl NotificationCapability for LogNotifier {
    async fn send(&self, address: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        tracing::info!(to = %address, subject = %subject, "notification (log transport)");
        Ok(())
    }
}

/// Build the configured transport: the webhook when set, the log otherwise.
pub fn from_config(config: &NotificationsConfig) -> Box<dyn NotificationCapability> {
    match &config.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(url.clone(), config.sender.clone())),
        None => Box::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(name: &str) -> User {
        User {
            id: "u1".into(),
            name: name.into(),
            address: "sam@example.com".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn reminder_mentions_hours() {
        let msg = Message::reminder(&user("Sam"), 26);
        assert!(msg.body.contains("Hi Sam"));
        assert!(msg.body.contains("26 hours"));
    }

    #[test]
    fn alert_falls_back_to_address_without_name() {
        let contact = EmergencyContact {
            id: 1,
            user_id: "u1".into(),
            name: "Alex".into(),
            address: "alex@example.com".into(),
        };
        let msg = Message::emergency_alert(&user(" "), &contact, 49);
        assert!(msg.subject.contains("sam@example.com"));
        assert!(msg.body.starts_with("Hi Alex"));
    }

    #[tokio::test]
    async fn log_transport_always_succeeds() {
        assert!(LogNotifier.send("a@b.c", "s", "b").await.is_ok());
    }
}
