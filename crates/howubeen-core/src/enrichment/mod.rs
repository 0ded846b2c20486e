//! Insight extraction for check-ins.
//!
//! Enrichment is an injected capability: the ingestor works the same with
//! a live endpoint, a failing one, or none at all.

pub mod http;

pub use http::HttpEnricher;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::EnrichmentError;
use crate::model::{Alignment, FocusArea, Insights, Mood};

/// Takeaway used when no analysis was possible.
pub const FALLBACK_TAKEAWAY: &str = "Check-in saved without insights.";

/// Takeaway used when analysis ran but returned nothing usable.
pub const EMPTY_TAKEAWAY: &str = "No specific takeaway noted.";

const MAX_TAKEAWAY_CHARS: usize = 200;

/// Transcription and insight extraction.
#[async_trait]
pub trait EnrichmentCapability: Send + Sync {
    /// Turn a stored voice note into text.
    async fn transcribe(&self, voice_reference: &str) -> Result<String, EnrichmentError>;

    /// Derive mood, focus area, alignment and a takeaway from text.
    async fn extract(&self, text: &str) -> Result<Insights, EnrichmentError>;

    /// Write a short weekly summary from a week of check-ins.
    ///
    /// Optional; weekly summaries fall back to a plain aggregate.
    async fn summarize(&self, _week: &str) -> Result<String, EnrichmentError> {
        Err(EnrichmentError::Unsupported("weekly summaries"))
    }
}

/// Insights recorded when enrichment is disabled, slow or failing.
///
/// A mood the user picked explicitly beats the neutral default.
pub fn fallback_insights(declared: Option<Mood>) -> Insights {
    Insights {
        mood: declared.unwrap_or(Mood::Neutral),
        focus_area: FocusArea::Unknown,
        alignment: Alignment::Neutral,
        takeaway: FALLBACK_TAKEAWAY.to_string(),
    }
}

/// Loosely-typed extraction payload as a capability returns it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInsights {
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default, alias = "focus_area")]
    pub focus_area: Option<String>,
    #[serde(default)]
    pub alignment: Option<String>,
    #[serde(default)]
    pub takeaway: Option<String>,
}

impl RawInsights {
    /// Clamp every field to the allowed vocabulary.
    pub fn normalize(self) -> Insights {
        let mood = self
            .mood
            .as_deref()
            .and_then(|m| m.parse::<Mood>().ok())
            .unwrap_or(Mood::Neutral);
        let focus_area = self
            .focus_area
            .as_deref()
            .map(FocusArea::parse_lenient)
            .unwrap_or(FocusArea::None);
        let alignment = self
            .alignment
            .as_deref()
            .map(Alignment::parse_lenient)
            .unwrap_or(Alignment::Neutral);
        let takeaway = self
            .takeaway
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|t| t.chars().take(MAX_TAKEAWAY_CHARS).collect())
            .unwrap_or_else(|| EMPTY_TAKEAWAY.to_string());

        Insights {
            mood,
            focus_area,
            alignment,
            takeaway,
        }
    }
}

/// Text handed to `extract`: the transcript leads, typed text follows as context.
pub fn analysis_input(transcript: Option<&str>, text: Option<&str>) -> Option<String> {
    let transcript = transcript.map(str::trim).filter(|t| !t.is_empty());
    let text = text.map(str::trim).filter(|t| !t.is_empty());
    match (transcript, text) {
        (Some(spoken), Some(typed)) if spoken != typed => {
            Some(format!("{spoken}\n\nAdditional context: {typed}"))
        }
        (Some(spoken), _) => Some(spoken.to_string()),
        (None, Some(typed)) => Some(typed.to_string()),
        (None, None) => None,
    }
}
