//! Idempotent check-in ingestion with best-effort enrichment.
//!
//! ```text
//! submit ─► validate ─► lock(user, day) ─► upsert ─► transcribe? ─► extract ─► apply ─► record
//!                                                         │              │
//!                                                         └── failure ───┴─► fallback, degraded
//! ```
//!
//! Submissions for the same key run one at a time, so a text note and a
//! voice note sent moments apart merge into one row in arrival order.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, instrument, warn};

use super::{CheckinSubmission, IngestedCheckin, KeyLocks};
use crate::enrichment::{analysis_input, fallback_insights, EnrichmentCapability};
use crate::error::{EnrichmentError, Result};
use crate::model::{CheckinRecord, EnrichmentStatus, Insights};
use crate::storage::{bounded, CheckinRange, CheckinStore, Config, EnrichmentUpdate};

/// Timeouts applied by the ingestor.
#[derive(Debug, Clone, Copy)]
pub struct IngestorSettings {
    pub store_timeout: Duration,
    pub enrichment_timeout: Duration,
}

impl Default for IngestorSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            enrichment_timeout: Duration::from_secs(15),
        }
    }
}

impl IngestorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            store_timeout: config.timeouts.store(),
            enrichment_timeout: config.timeouts.enrichment(),
        }
    }
}

pub struct CheckinIngestor {
    store: Arc<dyn CheckinStore>,
    enricher: Option<Arc<dyn EnrichmentCapability>>,
    settings: IngestorSettings,
    locks: KeyLocks,
}

/// What the enrichment step produced for one record.
struct EnrichmentOutcome {
    update: EnrichmentUpdate,
    warning: Option<String>,
}

impl CheckinIngestor {
    /// `enricher` may be `None`: every submission then stores default insights.
    pub fn new(
        store: Arc<dyn CheckinStore>,
        enricher: Option<Arc<dyn EnrichmentCapability>>,
        settings: IngestorSettings,
    ) -> Self {
        Self {
            store,
            enricher,
            settings,
            locks: KeyLocks::new(),
        }
    }

    /// Record a check-in submitted now.
    pub async fn submit(&self, submission: CheckinSubmission) -> Result<IngestedCheckin> {
        self.submit_at(submission, Utc::now()).await
    }

    /// Record a check-in as if submitted at `now`.
    ///
    /// # Errors
    /// Fails only on validation or storage errors; enrichment problems
    /// yield a `degraded` record instead.
    #[instrument(skip(self, submission), fields(user_id = %submission.user_id))]
    pub async fn submit_at(
        &self,
        submission: CheckinSubmission,
        now: DateTime<Utc>,
    ) -> Result<IngestedCheckin> {
        let (user_id, fields) = submission.validate()?;
        let date = submission.date.unwrap_or_else(|| now.date_naive());

        let _guard = self.locks.acquire(&format!("{user_id}:{date}")).await;

        let base = bounded(
            "upsert_checkin",
            self.settings.store_timeout,
            self.store.upsert_checkin(&user_id, date, fields, now),
        )
        .await?;

        let outcome = self.enrich(&base).await;
        let record = bounded(
            "apply_enrichment",
            self.settings.store_timeout,
            self.store.apply_enrichment(&user_id, date, outcome.update),
        )
        .await?;

        let degraded = record.is_degraded();
        info!(
            %date,
            checkin_id = record.id,
            degraded,
            input = ?record.input_type(),
            "check-in recorded"
        );

        Ok(IngestedCheckin {
            record,
            degraded,
            warning: outcome.warning,
        })
    }

    /// Stored check-in for one day, if any.
    pub async fn get(&self, user_id: &str, date: NaiveDate) -> Result<Option<CheckinRecord>> {
        let record = bounded(
            "get_checkin",
            self.settings.store_timeout,
            self.store.get_checkin(user_id, date),
        )
        .await?;
        Ok(record)
    }

    /// Check-ins for a user, newest first.
    pub async fn timeline(&self, user_id: &str, range: CheckinRange) -> Result<Vec<CheckinRecord>> {
        let records = bounded(
            "list_checkins",
            self.settings.store_timeout,
            self.store.list_checkins(user_id, range),
        )
        .await?;
        Ok(records)
    }

    async fn enrich(&self, record: &CheckinRecord) -> EnrichmentOutcome {
        let Some(enricher) = &self.enricher else {
            return degraded(record, None, "Insights are disabled; check-in saved with default labels.");
        };

        // A stored transcript belongs to the current voice note; the upsert
        // clears it when a different note arrives.
        let transcript = match (&record.transcript, &record.voice_reference) {
            (Some(stored), _) => Some(stored.clone()),
            (None, Some(voice)) => self.transcribe(enricher.as_ref(), voice).await,
            (None, None) => None,
        };
        let transcription_failed = record.voice_reference.is_some() && transcript.is_none();

        let Some(input) = analysis_input(transcript.as_deref(), record.raw_input.as_deref()) else {
            return degraded(
                record,
                None,
                "Voice note could not be transcribed; check-in saved with default labels.",
            );
        };

        let limit = self.settings.enrichment_timeout;
        let extracted = match tokio::time::timeout(limit, enricher.extract(&input)).await {
            Ok(result) => result,
            Err(_) => Err(EnrichmentError::Timeout(limit.as_millis() as u64)),
        };

        match extracted {
            Ok(insights) => EnrichmentOutcome {
                update: update_from(insights, transcript, EnrichmentStatus::Complete),
                warning: transcription_failed.then(|| {
                    "Voice note could not be transcribed; insights are based on the typed text."
                        .to_string()
                }),
            },
            Err(e) => {
                warn!(user_id = %record.user_id, date = %record.date, error = %e, "insight extraction failed");
                degraded(
                    record,
                    transcript,
                    "Insights are unavailable right now; check-in saved with default labels.",
                )
            }
        }
    }

    async fn transcribe(&self, enricher: &dyn EnrichmentCapability, voice: &str) -> Option<String> {
        let limit = self.settings.enrichment_timeout;
        match tokio::time::timeout(limit, enricher.transcribe(voice)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(Ok(_)) => {
                warn!(voice_reference = %voice, "transcription returned no text");
                None
            }
            Ok(Err(e)) => {
                warn!(voice_reference = %voice, error = %e, "transcription failed");
                None
            }
            Err(_) => {
                warn!(voice_reference = %voice, timeout_ms = limit.as_millis() as u64, "transcription timed out");
                None
            }
        }
    }
}

fn update_from(
    insights: Insights,
    transcript: Option<String>,
    status: EnrichmentStatus,
) -> EnrichmentUpdate {
    EnrichmentUpdate {
        transcript,
        mood: insights.mood,
        focus_area: insights.focus_area,
        alignment: insights.alignment,
        takeaway: insights.takeaway,
        status,
    }
}

fn degraded(record: &CheckinRecord, transcript: Option<String>, warning: &str) -> EnrichmentOutcome {
    EnrichmentOutcome {
        update: update_from(
            fallback_insights(record.status),
            transcript,
            EnrichmentStatus::Degraded,
        ),
        warning: Some(warning.to_string()),
    }
}
