//! Integration tests for the liveness sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use howubeen_core::storage::{CheckinFields, CheckinRange, EnrichmentUpdate};
use howubeen_core::{
    CheckinRecord, CheckinStore, Database, EmergencyContact, LivenessLevel, LivenessMonitor,
    LivenessState, MonitorSettings, NotificationCapability, NotificationDispatcher, NotifyError,
    StoreError, User,
};

/// Transport that records deliveries and fails for chosen addresses.
#[derive(Default)]
struct Outbox {
    failing: Vec<String>,
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl NotificationCapability for Outbox {
    async fn send(&self, address: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        if self.failing.iter().any(|a| a == address) {
            return Err(NotifyError::Rejected {
                status: 550,
                message: "mailbox unavailable".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), subject.to_string()));
        Ok(())
    }
}

impl Outbox {
    fn addresses(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(a, _)| a.clone()).collect()
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

async fn add_user(db: &Database, id: &str, created_at: DateTime<Utc>) {
    db.insert_user(User {
        id: id.into(),
        name: id.to_uppercase(),
        address: format!("{id}@example.com"),
        created_at,
    })
    .await
    .unwrap();
}

async fn check_in(db: &Database, id: &str, at: DateTime<Utc>) {
    db.upsert_checkin(
        id,
        at.date_naive(),
        CheckinFields {
            raw_input: Some("all good".into()),
            ..Default::default()
        },
        at,
    )
    .await
    .unwrap();
}

fn monitor(store: Arc<dyn CheckinStore>, outbox: Arc<Outbox>) -> LivenessMonitor {
    let dispatcher = NotificationDispatcher::new(outbox, StdDuration::from_secs(1));
    LivenessMonitor::new(store, dispatcher, MonitorSettings::default())
}

#[tokio::test]
async fn test_classification_boundaries() {
    let db = Database::open_memory().unwrap();
    let now = t0() + Duration::days(10);
    let hm = |h: i64, m: i64| now - Duration::hours(h) - Duration::minutes(m);
    for (id, last) in [("a", hm(23, 59)), ("b", hm(24, 0)), ("c", hm(47, 59)), ("d", hm(48, 0))] {
        add_user(&db, id, t0()).await;
        check_in(&db, id, last).await;
    }
    let monitor = monitor(Arc::new(db.clone()), Arc::new(Outbox::default()));

    for (id, expected) in [
        ("a", LivenessLevel::Active),
        ("b", LivenessLevel::Warning),
        ("c", LivenessLevel::Warning),
        ("d", LivenessLevel::Emergency),
    ] {
        let status = monitor.status(id, now).await.unwrap().unwrap();
        assert_eq!(status.level, expected, "user {id}");
    }

    let report = monitor.sweep(now).await.unwrap();
    assert_eq!(report.evaluated, 4);
    let moved: Vec<_> = report
        .transitions
        .iter()
        .map(|t| (t.user_id.as_str(), t.to))
        .collect();
    assert_eq!(
        moved,
        vec![
            ("b", LivenessLevel::Warning),
            ("c", LivenessLevel::Warning),
            ("d", LivenessLevel::Emergency),
        ]
    );
}

#[tokio::test]
async fn test_repeated_sweeps_warn_once() {
    let db = Database::open_memory().unwrap();
    add_user(&db, "u1", t0()).await;
    check_in(&db, "u1", t0()).await;
    let outbox = Arc::new(Outbox::default());
    let monitor = monitor(Arc::new(db.clone()), outbox.clone());

    let now = t0() + Duration::hours(30);
    for _ in 0..5 {
        monitor.sweep(now).await.unwrap();
    }

    assert_eq!(outbox.addresses(), vec!["u1@example.com"]);
    let state = db.get_liveness_state("u1").await.unwrap().unwrap();
    assert_eq!(state.state, LivenessLevel::Warning);
}

#[tokio::test]
async fn test_new_checkin_resets_without_notification() {
    let db = Database::open_memory().unwrap();
    add_user(&db, "u1", t0()).await;
    check_in(&db, "u1", t0()).await;
    let outbox = Arc::new(Outbox::default());
    let monitor = monitor(Arc::new(db.clone()), outbox.clone());

    monitor.sweep(t0() + Duration::hours(30)).await.unwrap();
    assert_eq!(outbox.addresses().len(), 1);

    let back = t0() + Duration::hours(31);
    check_in(&db, "u1", back).await;
    let report = monitor.sweep(t0() + Duration::hours(32)).await.unwrap();

    assert_eq!(report.transitions.len(), 1);
    assert_eq!(report.transitions[0].from, LivenessLevel::Warning);
    assert_eq!(report.transitions[0].to, LivenessLevel::Active);
    assert!(report.transitions[0].notifications.is_empty());
    assert_eq!(outbox.addresses().len(), 1);

    // A fresh silence escalates again.
    monitor.sweep(back + Duration::hours(25)).await.unwrap();
    assert_eq!(outbox.addresses().len(), 2);
}

#[tokio::test]
async fn test_warning_then_emergency_notifies_contacts_only() {
    let db = Database::open_memory().unwrap();
    add_user(&db, "u1", t0()).await;
    check_in(&db, "u1", t0()).await;
    db.add_emergency_contact("u1", "Mom", "mom@example.com").await.unwrap();
    let outbox = Arc::new(Outbox::default());
    let monitor = monitor(Arc::new(db.clone()), outbox.clone());

    monitor.sweep(t0() + Duration::hours(30)).await.unwrap();
    let report = monitor.sweep(t0() + Duration::hours(49)).await.unwrap();

    assert_eq!(report.transitions[0].from, LivenessLevel::Warning);
    assert_eq!(report.transitions[0].to, LivenessLevel::Emergency);
    assert_eq!(outbox.addresses(), vec!["u1@example.com", "mom@example.com"]);

    let again = monitor.sweep(t0() + Duration::hours(72)).await.unwrap();
    assert!(again.transitions.is_empty());
    assert_eq!(outbox.addresses().len(), 2);
}

#[tokio::test]
async fn test_failed_contact_does_not_block_others() {
    let db = Database::open_memory().unwrap();
    add_user(&db, "u1", t0()).await;
    add_user(&db, "u2", t0()).await;
    for (name, address) in [("One", "c1@x.org"), ("Two", "c2@x.org"), ("Three", "c3@x.org")] {
        db.add_emergency_contact("u1", name, address).await.unwrap();
    }
    let outbox = Arc::new(Outbox {
        failing: vec!["c2@x.org".into()],
        ..Default::default()
    });
    let monitor = monitor(Arc::new(db.clone()), outbox.clone());

    let report = monitor.sweep(t0() + Duration::hours(50)).await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.transitions.len(), 2);
    let u1 = &report.transitions[0];
    assert_eq!(u1.user_id, "u1");
    let flags: Vec<_> = u1
        .notifications
        .iter()
        .map(|o| (o.address.as_str(), o.success))
        .collect();
    assert_eq!(
        flags,
        vec![("c1@x.org", true), ("c2@x.org", false), ("c3@x.org", true)]
    );

    // The transition stands even though one alert failed.
    let state = db.get_liveness_state("u1").await.unwrap().unwrap();
    assert_eq!(state.state, LivenessLevel::Emergency);
    assert_eq!(report.transitions[1].user_id, "u2");
    assert_eq!(report.transitions[1].to, LivenessLevel::Emergency);
}

#[tokio::test]
async fn test_new_account_has_grace_period() {
    let db = Database::open_memory().unwrap();
    let now = t0() + Duration::days(3);
    add_user(&db, "fresh", now - Duration::hours(2)).await;
    let outbox = Arc::new(Outbox::default());
    let monitor = monitor(Arc::new(db.clone()), outbox.clone());

    let report = monitor.sweep(now).await.unwrap();

    assert_eq!(report.evaluated, 1);
    assert!(report.transitions.is_empty());
    assert!(outbox.addresses().is_empty());
    let state = db.get_liveness_state("fresh").await.unwrap().unwrap();
    assert_eq!(state.state, LivenessLevel::Active);

    // Signup counts as the last activity once the grace period runs out.
    monitor.sweep(now + Duration::hours(23)).await.unwrap();
    assert_eq!(outbox.addresses(), vec!["fresh@example.com"]);
}

#[tokio::test]
async fn test_recorded_state_is_not_renotified() {
    let db = Database::open_memory().unwrap();
    add_user(&db, "u1", t0()).await;
    db.set_liveness_state("u1", LivenessLevel::Warning, t0() + Duration::hours(25))
        .await
        .unwrap();
    let outbox = Arc::new(Outbox::default());
    let monitor = monitor(Arc::new(db.clone()), outbox.clone());

    let report = monitor.sweep(t0() + Duration::hours(30)).await.unwrap();

    assert!(report.transitions.is_empty());
    assert!(outbox.addresses().is_empty());
}

/// Stalls on its first send, then delivers normally.
#[derive(Default)]
struct StallsOnce {
    stalled: AtomicBool,
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationCapability for StallsOnce {
    async fn send(&self, address: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(StdDuration::from_secs(3600)).await;
        }
        self.sent.lock().unwrap().push(address.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_sweep_cancelled_mid_alert_retries_next_time() {
    let db = Database::open_memory().unwrap();
    add_user(&db, "u1", t0()).await;
    db.add_emergency_contact("u1", "Mom", "mom@example.com").await.unwrap();
    let transport = Arc::new(StallsOnce::default());
    let dispatcher = NotificationDispatcher::new(transport.clone(), StdDuration::from_secs(30));
    let monitor = LivenessMonitor::new(Arc::new(db.clone()), dispatcher, MonitorSettings::default());

    // Shutdown lands while the alert is still in flight.
    let cancelled = tokio::time::timeout(
        StdDuration::from_millis(300),
        monitor.sweep(t0() + Duration::hours(50)),
    )
    .await;
    assert!(cancelled.is_err());
    assert!(db.get_liveness_state("u1").await.unwrap().is_none());
    assert!(transport.sent.lock().unwrap().is_empty());

    let report = monitor.sweep(t0() + Duration::hours(51)).await.unwrap();
    assert_eq!(report.transitions.len(), 1);
    assert_eq!(report.transitions[0].to, LivenessLevel::Emergency);
    assert_eq!(*transport.sent.lock().unwrap(), vec!["mom@example.com"]);
    let state = db.get_liveness_state("u1").await.unwrap().unwrap();
    assert_eq!(state.state, LivenessLevel::Emergency);

    monitor.sweep(t0() + Duration::hours(60)).await.unwrap();
    assert_eq!(transport.sent.lock().unwrap().len(), 1);
}

/// Delegates to a database but fails every read for one user.
struct BrokenForOne {
    inner: Database,
    broken: &'static str,
}

impl BrokenForOne {
    fn check(&self, user_id: &str) -> Result<(), StoreError> {
        if user_id == self.broken {
            Err(StoreError::QueryFailed("disk I/O error".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CheckinStore for BrokenForOne {
    async fn upsert_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
        fields: CheckinFields,
        at: DateTime<Utc>,
    ) -> Result<CheckinRecord, StoreError> {
        self.inner.upsert_checkin(user_id, date, fields, at).await
    }

    async fn apply_enrichment(
        &self,
        user_id: &str,
        date: NaiveDate,
        update: EnrichmentUpdate,
    ) -> Result<CheckinRecord, StoreError> {
        self.inner.apply_enrichment(user_id, date, update).await
    }

    async fn get_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<CheckinRecord>, StoreError> {
        self.inner.get_checkin(user_id, date).await
    }

    async fn get_latest_checkin(
        &self,
        user_id: &str,
    ) -> Result<Option<CheckinRecord>, StoreError> {
        self.check(user_id)?;
        self.inner.get_latest_checkin(user_id).await
    }

    async fn list_checkins(
        &self,
        user_id: &str,
        range: CheckinRange,
    ) -> Result<Vec<CheckinRecord>, StoreError> {
        self.inner.list_checkins(user_id, range).await
    }

    async fn get_liveness_state(
        &self,
        user_id: &str,
    ) -> Result<Option<LivenessState>, StoreError> {
        self.inner.get_liveness_state(user_id).await
    }

    async fn set_liveness_state(
        &self,
        user_id: &str,
        state: LivenessLevel,
        entered_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.set_liveness_state(user_id, state, entered_at).await
    }

    async fn list_users(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_users().await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.inner.get_user(user_id).await
    }

    async fn list_emergency_contacts(
        &self,
        user_id: &str,
    ) -> Result<Vec<EmergencyContact>, StoreError> {
        self.inner.list_emergency_contacts(user_id).await
    }
}

#[tokio::test]
async fn test_store_failure_is_isolated_per_user() {
    let db = Database::open_memory().unwrap();
    for id in ["a", "b", "c"] {
        add_user(&db, id, t0()).await;
    }
    let store = Arc::new(BrokenForOne {
        inner: db.clone(),
        broken: "b",
    });
    let outbox = Arc::new(Outbox::default());
    let monitor = monitor(store, outbox.clone());

    let report = monitor.sweep(t0() + Duration::hours(30)).await.unwrap();

    assert_eq!(report.evaluated, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].user_id, "b");
    assert!(report.failures[0].error.contains("disk I/O error"));
    let warned: Vec<_> = report.transitions.iter().map(|t| t.user_id.as_str()).collect();
    assert_eq!(warned, vec!["a", "c"]);
    assert!(db.get_liveness_state("b").await.unwrap().is_none());
}

#[tokio::test]
async fn test_low_concurrency_still_evaluates_everyone() {
    let db = Database::open_memory().unwrap();
    for i in 0..12 {
        add_user(&db, &format!("user{i:02}"), t0()).await;
    }
    let outbox = Arc::new(Outbox::default());
    let dispatcher = NotificationDispatcher::new(outbox.clone(), StdDuration::from_secs(1));
    let settings = MonitorSettings {
        max_concurrency: 2,
        ..Default::default()
    };
    let monitor = LivenessMonitor::new(Arc::new(db), dispatcher, settings);

    let report = monitor.sweep(t0() + Duration::hours(26)).await.unwrap();

    assert_eq!(report.evaluated, 12);
    assert_eq!(report.transitions.len(), 12);
    assert_eq!(outbox.addresses().len(), 12);
}
