//! Webhook transport -- post each notification as JSON to a configured URL.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::NotificationCapability;
use crate::error::NotifyError;

pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    sender: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url: webhook_url.into(),
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl NotificationCapability for WebhookNotifier {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "from": self.sender,
            "to": address,
            "subject": subject,
            "body": body,
        });

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            Err(NotifyError::Rejected { status, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn posts_json_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(Matcher::PartialJson(json!({
                "to": "alex@example.com",
                "subject": "hello",
            })))
            .with_status(204)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url()), "safety@howubeen.app");
        notifier
            .send("alex@example.com", "hello", "body text")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(500)
            .with_body("mailbox full")
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url()), "s");
        let err = notifier.send("a@b.c", "s", "b").await.unwrap_err();
        assert_eq!(
            err,
            NotifyError::Rejected {
                status: 500,
                message: "mailbox full".into()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook", "s");
        let err = notifier.send("a@b.c", "s", "b").await.unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }
}
