//! Builds and stores weekly summaries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{
    last_complete_week, summary_input, week_bounds, SummarySource, WeekDigest, WeeklySummary,
};
use crate::enrichment::EnrichmentCapability;
use crate::error::{EnrichmentError, Result, StoreError, ValidationError};
use crate::liveness::SweepFailure;
use crate::model::CheckinRecord;
use crate::storage::{bounded, CheckinRange, Config, SummaryStore};

/// Timeouts applied by the summarizer.
#[derive(Debug, Clone, Copy)]
pub struct SummarizerSettings {
    pub store_timeout: Duration,
    pub enrichment_timeout: Duration,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            enrichment_timeout: Duration::from_secs(15),
        }
    }
}

impl SummarizerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            store_timeout: config.timeouts.store(),
            enrichment_timeout: config.timeouts.enrichment(),
        }
    }
}

/// Result of summarizing one week for every user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueReport {
    pub week_start: Option<NaiveDate>,
    pub generated: Vec<String>,
    /// Users who already had a summary for the week.
    pub skipped: Vec<String>,
    /// Users with no check-ins that week.
    pub empty: Vec<String>,
    pub failures: Vec<SweepFailure>,
}

pub struct WeeklySummarizer {
    store: Arc<dyn SummaryStore>,
    enricher: Option<Arc<dyn EnrichmentCapability>>,
    settings: SummarizerSettings,
}

impl WeeklySummarizer {
    /// Without an enricher every summary is the plain aggregate.
    pub fn new(
        store: Arc<dyn SummaryStore>,
        enricher: Option<Arc<dyn EnrichmentCapability>>,
        settings: SummarizerSettings,
    ) -> Self {
        Self {
            store,
            enricher,
            settings,
        }
    }

    /// Summarize the week containing `day` and store the result, replacing
    /// any earlier summary for that week.
    ///
    /// Returns `None` when the user has no check-ins that week.
    #[instrument(skip(self))]
    pub async fn generate(
        &self,
        user_id: &str,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklySummary>> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::MissingField("userId".into()).into());
        }
        let summary = self.summarize_week(user_id, day, now).await?;
        Ok(summary)
    }

    /// Summarize the last complete week for every user who lacks one.
    ///
    /// Per-user failures land in the report; only a failure to list users
    /// fails the run.
    #[instrument(skip(self))]
    pub async fn generate_due(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<DueReport> {
        let limit = self.settings.store_timeout;
        let week_start = last_complete_week(today);
        let users = bounded("list_users", limit, self.store.list_users()).await?;

        let mut report = DueReport {
            week_start: Some(week_start),
            ..Default::default()
        };
        for user_id in users {
            let existing = bounded(
                "get_weekly_summary",
                limit,
                self.store.get_weekly_summary(&user_id, week_start),
            )
            .await;
            let outcome = match existing {
                Ok(Some(_)) => {
                    report.skipped.push(user_id);
                    continue;
                }
                Ok(None) => self.summarize_week(&user_id, week_start, now).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(Some(_)) => report.generated.push(user_id),
                Ok(None) => report.empty.push(user_id),
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "weekly summary failed");
                    report.failures.push(SweepFailure {
                        user_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            %week_start,
            generated = report.generated.len(),
            skipped = report.skipped.len(),
            failures = report.failures.len(),
            "weekly summaries finished"
        );
        Ok(report)
    }

    /// Stored summaries for a user, newest week first.
    pub async fn list(&self, user_id: &str, limit: Option<u32>) -> Result<Vec<WeeklySummary>> {
        let summaries = bounded(
            "list_weekly_summaries",
            self.settings.store_timeout,
            self.store.list_weekly_summaries(user_id, limit),
        )
        .await?;
        Ok(summaries)
    }

    /// The most recent stored summary, if any.
    pub async fn latest(&self, user_id: &str) -> Result<Option<WeeklySummary>> {
        Ok(self.list(user_id, Some(1)).await?.into_iter().next())
    }

    async fn summarize_week(
        &self,
        user_id: &str,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklySummary>, StoreError> {
        let limit = self.settings.store_timeout;
        let (week_start, week_end) = week_bounds(day);
        let range = CheckinRange {
            from: Some(week_start),
            to: Some(week_end),
            limit: None,
        };
        let records = bounded("list_checkins", limit, self.store.list_checkins(user_id, range)).await?;
        if records.is_empty() {
            info!(user_id = %user_id, %week_start, "no check-ins that week, nothing to summarize");
            return Ok(None);
        }

        let digest = WeekDigest::from_checkins(week_start, &records);
        let (summary_text, source) = match self.written_summary(&digest, &records).await {
            Some(text) => (text, SummarySource::Generated),
            None => (digest.plain_text(), SummarySource::Aggregate),
        };

        let stored = bounded(
            "upsert_weekly_summary",
            limit,
            self.store.upsert_weekly_summary(WeeklySummary {
                id: 0,
                user_id: user_id.to_string(),
                digest,
                summary_text,
                source,
                generated_at: now,
            }),
        )
        .await?;
        info!(
            user_id = %user_id,
            %week_start,
            checkins = stored.digest.checkin_count,
            source = stored.source.as_str(),
            "weekly summary stored"
        );
        Ok(Some(stored))
    }

    /// Prose from the capability, or `None` to fall back to the aggregate.
    async fn written_summary(
        &self,
        digest: &WeekDigest,
        records: &[CheckinRecord],
    ) -> Option<String> {
        let enricher = self.enricher.as_ref()?;
        let limit = self.settings.enrichment_timeout;
        let input = summary_input(digest, records);
        let written = match tokio::time::timeout(limit, enricher.summarize(&input)).await {
            Ok(result) => result,
            Err(_) => Err(EnrichmentError::Timeout(limit.as_millis() as u64)),
        };
        match written {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!(week_start = %digest.week_start, "summary capability returned no text");
                None
            }
            Err(EnrichmentError::Unsupported(_)) => None,
            Err(e) => {
                warn!(week_start = %digest.week_start, error = %e, "weekly summary capability failed");
                None
            }
        }
    }
}
