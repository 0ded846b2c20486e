//! Enrichment over HTTP -- JSON endpoints for transcription, extraction and
//! weekly summaries.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{EnrichmentCapability, RawInsights};
use crate::error::EnrichmentError;
use crate::model::Insights;
use crate::storage::EnrichmentConfig;

pub struct HttpEnricher {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

/// Body of both `/transcribe` and `/summarize` responses.
#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

impl HttpEnricher {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Build from configuration. `None` when enrichment is disabled or has no endpoint.
    pub fn from_config(config: &EnrichmentConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let endpoint = config.endpoint.as_deref()?;
        Some(Self::new(endpoint, config.api_key.clone()))
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, EnrichmentError> {
        let mut request = self
            .client
            .post(format!("{}/{path}", self.endpoint))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(EnrichmentError::Request(format!(
                "{path} returned HTTP {status}: {text}"
            )))
        }
    }
}

#[async_trait]
impl EnrichmentCapability for HttpEnricher {
    async fn transcribe(&self, voice_reference: &str) -> Result<String, EnrichmentError> {
        let resp = self
            .post("transcribe", json!({ "voiceReference": voice_reference }))
            .await?;
        let body: TextResponse = resp.json().await?;
        Ok(body.text)
    }

    async fn extract(&self, text: &str) -> Result<Insights, EnrichmentError> {
        let resp = self.post("extract", json!({ "text": text })).await?;
        let raw: RawInsights = resp.json().await?;
        Ok(raw.normalize())
    }

    async fn summarize(&self, week: &str) -> Result<String, EnrichmentError> {
        let resp = self.post("summarize", json!({ "checkins": week })).await?;
        let body: TextResponse = resp.json().await?;
        Ok(body.text)
    }
}
