//! Recurring inactivity sweep.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::{LivenessLevel, LivenessState, Thresholds};
use crate::error::{Result, StoreError};
use crate::model::User;
use crate::notify::{DeliveryOutcome, Message, NotificationDispatcher};
use crate::storage::{bounded, CheckinStore, Config};

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub thresholds: Thresholds,
    /// Users evaluated at once during a sweep. Zero is treated as one.
    pub max_concurrency: usize,
    pub store_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            max_concurrency: 8,
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thresholds: config.liveness.thresholds(),
            max_concurrency: config.liveness.max_concurrency,
            store_timeout: config.timeouts.store(),
        }
    }
}

/// A persisted level change made during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTransition {
    pub user_id: String,
    pub from: LivenessLevel,
    pub to: LivenessLevel,
    /// Empty for resets and for escalations with nobody to tell.
    pub notifications: Vec<DeliveryOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub user_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub evaluated: usize,
    pub transitions: Vec<UserTransition>,
    pub failures: Vec<SweepFailure>,
}

/// Read-only view of a user's liveness, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessStatus {
    pub user_id: String,
    pub last_activity: DateTime<Utc>,
    pub has_checked_in: bool,
    pub hours_inactive: i64,
    /// Level the elapsed time maps to right now.
    pub level: LivenessLevel,
    /// Level the monitor last recorded, if it has seen this user.
    pub recorded: Option<LivenessState>,
}

pub struct LivenessMonitor {
    store: Arc<dyn CheckinStore>,
    dispatcher: NotificationDispatcher,
    settings: MonitorSettings,
}

impl LivenessMonitor {
    pub fn new(
        store: Arc<dyn CheckinStore>,
        dispatcher: NotificationDispatcher,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            settings,
        }
    }

    /// Evaluate every user once.
    ///
    /// Per-user failures land in the report; only a failure to list users
    /// fails the sweep as a whole.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let users = bounded(
            "list_users",
            self.settings.store_timeout,
            self.store.list_users(),
        )
        .await?;

        let results: Vec<_> = stream::iter(users)
            .map(|user_id| async move {
                let result = self.evaluate(&user_id, now).await;
                (user_id, result)
            })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        let mut report = SweepReport {
            evaluated: results.len(),
            ..Default::default()
        };
        for (user_id, result) in results {
            match result {
                Ok(Some(transition)) => report.transitions.push(transition),
                Ok(None) => {}
                Err(e) => {
                    error!(user_id = %user_id, error = %e, "liveness evaluation failed");
                    report.failures.push(SweepFailure {
                        user_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        report.transitions.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        report.failures.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        info!(
            evaluated = report.evaluated,
            transitions = report.transitions.len(),
            failures = report.failures.len(),
            "sweep finished"
        );
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` resolves.
    ///
    /// The first sweep runs immediately. A sweep still running when
    /// `shutdown` fires is dropped at its next await point.
    pub async fn run<S>(&self, interval: Duration, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                result = self.sweep(Utc::now()) => {
                    if let Err(e) = result {
                        error!(error = %e, "sweep aborted");
                    }
                }
            }
        }
        info!("liveness monitor stopped");
    }

    /// Current classification for one user. `None` if the user is unknown.
    pub async fn status(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<LivenessStatus>> {
        let limit = self.settings.store_timeout;
        let Some(user) = bounded("get_user", limit, self.store.get_user(user_id)).await? else {
            return Ok(None);
        };
        let latest = bounded("get_latest_checkin", limit, self.store.get_latest_checkin(user_id)).await?;
        let recorded = bounded("get_liveness_state", limit, self.store.get_liveness_state(user_id)).await?;

        let last_activity = latest
            .as_ref()
            .map_or(user.created_at, |record| record.last_activity());
        let elapsed = now - last_activity;

        Ok(Some(LivenessStatus {
            user_id: user.id,
            last_activity,
            has_checked_in: latest.is_some(),
            hours_inactive: elapsed.num_hours(),
            level: self.settings.thresholds.classify(elapsed),
            recorded,
        }))
    }

    async fn evaluate(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserTransition>, StoreError> {
        let limit = self.settings.store_timeout;
        let Some(user) = bounded("get_user", limit, self.store.get_user(user_id)).await? else {
            warn!(user_id = %user_id, "listed user has no record, skipping");
            return Ok(None);
        };
        let latest = bounded("get_latest_checkin", limit, self.store.get_latest_checkin(user_id)).await?;
        let recorded = bounded("get_liveness_state", limit, self.store.get_liveness_state(user_id)).await?;

        // New accounts are measured from signup.
        let last_activity = latest
            .as_ref()
            .map_or(user.created_at, |record| record.last_activity());
        let elapsed = now - last_activity;
        let target = self.settings.thresholds.classify(elapsed);

        let Some(recorded) = recorded else {
            return self.first_observation(&user, target, elapsed.num_hours(), now).await;
        };

        let checked_in_since = latest
            .as_ref()
            .is_some_and(|record| record.last_activity() > recorded.entered_at);
        let reset = recorded.state > LivenessLevel::Active && checked_in_since;
        let baseline = if reset { LivenessLevel::Active } else { recorded.state };

        if target > baseline {
            let notifications = self.escalate(&user, target, elapsed.num_hours(), now).await?;
            return Ok(Some(UserTransition {
                user_id: user.id,
                from: recorded.state,
                to: target,
                notifications,
            }));
        }

        if reset {
            bounded(
                "set_liveness_state",
                limit,
                self.store.set_liveness_state(user_id, LivenessLevel::Active, now),
            )
            .await?;
            info!(user_id = %user_id, from = %recorded.state, "check-in observed, reset to ACTIVE");
            return Ok(Some(UserTransition {
                user_id: user.id,
                from: recorded.state,
                to: LivenessLevel::Active,
                notifications: Vec::new(),
            }));
        }

        debug!(user_id = %user_id, state = %recorded.state, "no change");
        Ok(None)
    }

    async fn first_observation(
        &self,
        user: &User,
        target: LivenessLevel,
        hours_inactive: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<UserTransition>, StoreError> {
        if target == LivenessLevel::Active {
            bounded(
                "set_liveness_state",
                self.settings.store_timeout,
                self.store.set_liveness_state(&user.id, LivenessLevel::Active, now),
            )
            .await?;
            return Ok(None);
        }

        let notifications = self.escalate(user, target, hours_inactive, now).await?;
        Ok(Some(UserTransition {
            user_id: user.id.clone(),
            from: LivenessLevel::Active,
            to: target,
            notifications,
        }))
    }

    /// Notify for `target`, then persist it.
    ///
    /// The level is written only after every send has finished. A sweep
    /// dropped mid-notify leaves the old level in place, so the next sweep
    /// repeats the transition: a recipient may hear twice but never zero
    /// times.
    async fn escalate(
        &self,
        user: &User,
        target: LivenessLevel,
        hours_inactive: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<DeliveryOutcome>, StoreError> {
        let limit = self.settings.store_timeout;
        let outcomes: Vec<DeliveryOutcome> = match target {
            LivenessLevel::Active => Vec::new(),
            LivenessLevel::Warning => {
                let message = Message::reminder(user, hours_inactive);
                self.dispatcher
                    .notify(std::slice::from_ref(&user.address), &message)
                    .await
            }
            LivenessLevel::Emergency => {
                let contacts = bounded(
                    "list_emergency_contacts",
                    limit,
                    self.store.list_emergency_contacts(&user.id),
                )
                .await?;
                if contacts.is_empty() {
                    warn!(user_id = %user.id, "emergency reached but no contacts on file");
                }
                let sends = contacts.iter().map(|contact| {
                    let message = Message::emergency_alert(user, contact, hours_inactive);
                    let recipients = vec![contact.address.clone()];
                    async move { self.dispatcher.notify(&recipients, &message).await }
                });
                join_all(sends).await.into_iter().flatten().collect()
            }
        };

        let delivered = outcomes.iter().filter(|o| o.success).count();
        if delivered < outcomes.len() {
            warn!(
                user_id = %user.id,
                delivered,
                attempted = outcomes.len(),
                "some notifications failed"
            );
        }

        // `now` was captured before any reads, so a check-in racing this
        // sweep still compares as newer than `entered_at`.
        bounded(
            "set_liveness_state",
            limit,
            self.store.set_liveness_state(&user.id, target, now),
        )
        .await?;
        info!(user_id = %user.id, state = %target, hours_inactive, delivered, "liveness escalated");

        Ok(outcomes)
    }
}
