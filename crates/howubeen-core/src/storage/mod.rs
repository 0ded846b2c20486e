mod config;
pub mod database;
pub mod migrations;

pub use config::{
    Config, EnrichmentConfig, LivenessConfig, LoggingConfig, NotificationsConfig, TimeoutsConfig,
};
pub use database::Database;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::liveness::{LivenessLevel, LivenessState};
use crate::model::{
    Alignment, CheckinRecord, EmergencyContact, EnrichmentStatus, FocusArea, Mood, User,
};
use crate::summary::WeeklySummary;

/// Returns `~/.config/howubeen[-dev]/` based on HOWUBEEN_ENV.
///
/// Set HOWUBEEN_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("HOWUBEEN_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("howubeen-dev")
    } else {
        base_dir.join("howubeen")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Await a store call, failing with [`StoreError::Timeout`] past `limit`.
///
/// A timeout drops `call`. Whether the write still lands depends on the
/// store: [`Database`] skips a call that has not started yet, but one already
/// running commits anyway. A `Timeout` therefore means "outcome unknown",
/// never "nothing written".
pub async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

/// Fields a submission writes onto the day's row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckinFields {
    pub raw_input: Option<String>,
    pub voice_reference: Option<String>,
    pub status: Option<Mood>,
}

/// Fields the enrichment step writes onto the day's row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentUpdate {
    pub transcript: Option<String>,
    pub mood: Mood,
    pub focus_area: FocusArea,
    pub alignment: Alignment,
    pub takeaway: String,
    pub status: EnrichmentStatus,
}

/// Filter for timeline reads. Bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct CheckinRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<u32>,
}

/// Durable storage the ingestor and the liveness monitor share.
///
/// Every write must land atomically: callers may abandon a call at any
/// await point (timeout, shutdown) and readers must never observe a
/// half-written row.
///
/// An abandoned write may still commit after the caller has given up. Every
/// write here is idempotent by key, so callers recover by retrying, never by
/// assuming the write was lost.
#[async_trait]
pub trait CheckinStore: Send + Sync {
    /// Insert the `(user_id, date)` row or overwrite its submitted fields.
    async fn upsert_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
        fields: CheckinFields,
        at: DateTime<Utc>,
    ) -> Result<CheckinRecord, StoreError>;

    /// Apply enrichment to whichever row currently holds `(user_id, date)`.
    async fn apply_enrichment(
        &self,
        user_id: &str,
        date: NaiveDate,
        update: EnrichmentUpdate,
    ) -> Result<CheckinRecord, StoreError>;

    async fn get_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<CheckinRecord>, StoreError>;

    /// Check-in with the most recent submission time.
    async fn get_latest_checkin(&self, user_id: &str)
        -> Result<Option<CheckinRecord>, StoreError>;

    /// Newest first.
    async fn list_checkins(
        &self,
        user_id: &str,
        range: CheckinRange,
    ) -> Result<Vec<CheckinRecord>, StoreError>;

    async fn get_liveness_state(&self, user_id: &str)
        -> Result<Option<LivenessState>, StoreError>;

    async fn set_liveness_state(
        &self,
        user_id: &str,
        state: LivenessLevel,
        entered_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn list_users(&self) -> Result<Vec<String>, StoreError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    async fn list_emergency_contacts(
        &self,
        user_id: &str,
    ) -> Result<Vec<EmergencyContact>, StoreError>;
}

/// Storage for weekly summaries, alongside the check-ins they digest.
#[async_trait]
pub trait SummaryStore: CheckinStore {
    /// Insert or replace the summary for `(user_id, week_start)`; returns it with its row id.
    async fn upsert_weekly_summary(
        &self,
        summary: WeeklySummary,
    ) -> Result<WeeklySummary, StoreError>;

    async fn get_weekly_summary(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklySummary>, StoreError>;

    /// Newest week first.
    async fn list_weekly_summaries(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<WeeklySummary>, StoreError>;
}
