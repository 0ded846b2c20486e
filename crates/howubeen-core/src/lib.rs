//! # HowUBeen Core Library
//!
//! Check-in ingestion and inactivity escalation for the HowUBeen safety
//! check-in service. Every operation is available through the standalone
//! CLI binary; any other front-end is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Ingestion**: one check-in per user and calendar day, upserted under a
//!   per-key lock and enriched with mood/focus insights when available
//! - **Liveness**: a recurring sweep that classifies inactivity and notifies
//!   exactly once per escalation
//! - **Summaries**: a weekly digest of mood trend, focus and alignment,
//!   written up by the enrichment capability when one is configured
//! - **Storage**: SQLite persistence and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`CheckinIngestor`]: validated, idempotent check-in recording
//! - [`LivenessMonitor`]: sweep, watch loop and status lookups
//! - [`NotificationDispatcher`]: isolated fan-out to recipients
//! - [`WeeklySummarizer`]: weekly summaries, on demand or for every user
//! - [`Database`]: the SQLite-backed [`CheckinStore`]
//! - [`Config`]: application configuration management

pub mod checkin;
pub mod enrichment;
pub mod error;
pub mod liveness;
pub mod logging;
pub mod model;
pub mod notify;
pub mod storage;
pub mod summary;

pub use checkin::{CheckinIngestor, CheckinSubmission, IngestedCheckin, IngestorSettings};
pub use enrichment::{EnrichmentCapability, HttpEnricher};
pub use error::{
    ConfigError, CoreError, EnrichmentError, NotifyError, Result, StoreError, ValidationError,
};
pub use liveness::{
    LivenessLevel, LivenessMonitor, LivenessState, LivenessStatus, MonitorSettings, SweepReport,
    Thresholds,
};
pub use model::{
    Alignment, CheckinRecord, EmergencyContact, EnrichmentStatus, FocusArea, Insights, Mood, User,
};
pub use notify::{
    DeliveryOutcome, LogNotifier, Message, NotificationCapability, NotificationDispatcher,
    WebhookNotifier,
};
pub use storage::{CheckinRange, CheckinStore, Config, Database, SummaryStore};
pub use summary::{
    AlignmentTally, DueReport, MoodTrend, SummarizerSettings, SummarySource, WeekDigest,
    WeeklySummarizer, WeeklySummary,
};
