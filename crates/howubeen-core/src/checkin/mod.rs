//! Check-in ingestion.
//!
//! A submission is validated, written with upsert semantics on its
//! `(user, day)` key, enriched, and returned as the consolidated record.

pub mod ingestor;
mod key_lock;

pub use ingestor::{CheckinIngestor, IngestorSettings};
pub use key_lock::{KeyLockGuard, KeyLocks};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{CheckinRecord, Mood};
use crate::storage::CheckinFields;

/// One client submission, as the ingestion API receives it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinSubmission {
    pub user_id: String,
    /// Calendar day; today (UTC) when absent.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, alias = "textInput")]
    pub raw_input: Option<String>,
    #[serde(default, alias = "voiceRef")]
    pub voice_reference: Option<String>,
    #[serde(default)]
    pub status: Option<Mood>,
}

impl CheckinSubmission {
    pub fn text(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            raw_input: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn voice(user_id: impl Into<String>, voice_reference: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            voice_reference: Some(voice_reference.into()),
            ..Default::default()
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_status(mut self, status: Mood) -> Self {
        self.status = Some(status);
        self
    }

    /// Blank strings count as absent.
    pub(crate) fn validate(&self) -> Result<(String, CheckinFields), ValidationError> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::MissingField("userId".into()));
        }

        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let raw_input = non_blank(&self.raw_input);
        let voice_reference = non_blank(&self.voice_reference);
        if raw_input.is_none() && voice_reference.is_none() {
            return Err(ValidationError::EmptyCheckin);
        }

        Ok((
            user_id.to_string(),
            CheckinFields {
                raw_input,
                voice_reference,
                status: self.status,
            },
        ))
    }
}

/// Response of a successful submission.
///
/// The shape is the same whether enrichment succeeded or fell back;
/// `degraded` tells callers to surface a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedCheckin {
    #[serde(flatten)]
    pub record: CheckinRecord,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
