pub mod checkin;
pub mod config;
pub mod contact;
pub mod liveness;
pub mod summary;
pub mod user;

use std::path::PathBuf;
use std::sync::Arc;

use howubeen_core::notify::{self, NotificationCapability};
use howubeen_core::{
    CheckinIngestor, Config, Database, EnrichmentCapability, HttpEnricher, IngestorSettings,
    LivenessMonitor, MonitorSettings, NotificationDispatcher, SummarizerSettings,
    WeeklySummarizer,
};
use serde::Serialize;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Shared wiring for commands that touch the store.
pub struct Context {
    pub config: Config,
    db_path: Option<PathBuf>,
}

impl Context {
    pub fn new(config: Config, db_path: Option<PathBuf>) -> Self {
        Self { config, db_path }
    }

    pub fn database(&self) -> Result<Database, Box<dyn std::error::Error>> {
        let db = match &self.db_path {
            Some(path) => Database::open_at(path)?,
            None => Database::open()?,
        };
        Ok(db)
    }

    fn enricher(&self) -> Option<Arc<dyn EnrichmentCapability>> {
        HttpEnricher::from_config(&self.config.enrichment)
            .map(|e| Arc::new(e) as Arc<dyn EnrichmentCapability>)
    }

    pub fn ingestor(&self) -> Result<CheckinIngestor, Box<dyn std::error::Error>> {
        Ok(CheckinIngestor::new(
            Arc::new(self.database()?),
            self.enricher(),
            IngestorSettings::from_config(&self.config),
        ))
    }

    pub fn summarizer(&self) -> Result<WeeklySummarizer, Box<dyn std::error::Error>> {
        Ok(WeeklySummarizer::new(
            Arc::new(self.database()?),
            self.enricher(),
            SummarizerSettings::from_config(&self.config),
        ))
    }

    pub fn monitor(&self) -> Result<LivenessMonitor, Box<dyn std::error::Error>> {
        let transport: Arc<dyn NotificationCapability> =
            Arc::from(notify::from_config(&self.config.notifications));
        let dispatcher = NotificationDispatcher::new(transport, self.config.timeouts.notification());
        Ok(LivenessMonitor::new(
            Arc::new(self.database()?),
            dispatcher,
            MonitorSettings::from_config(&self.config),
        ))
    }
}

pub fn print_json<T: Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
