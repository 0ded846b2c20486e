//! SQLite-backed [`CheckinStore`].
//!
//! Provides persistent storage for:
//! - Users and their emergency contacts
//! - One check-in per user per calendar day
//! - The escalation level the liveness monitor last recorded
//!
//! The connection lives behind a mutex and every call runs on the blocking
//! pool. Each write is a single statement or an explicit transaction, so a
//! caller that stops awaiting never leaves a partial row behind.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{
    data_dir, migrations, CheckinFields, CheckinRange, CheckinStore, EnrichmentUpdate,
    SummaryStore,
};
use crate::error::StoreError;
use crate::liveness::{LivenessLevel, LivenessState};
use crate::model::{
    Alignment, CheckinRecord, EmergencyContact, EnrichmentStatus, FocusArea, Mood, User,
};
use crate::summary::{AlignmentTally, MoodTrend, SummarySource, WeekDigest, WeeklySummary};

const CHECKIN_COLUMNS: &str = "id, user_id, date, raw_input, voice_reference, transcript, status, \
     mood, focus_area, alignment, takeaway, enrichment_status, created_at, updated_at";

const SUMMARY_COLUMNS: &str = "id, user_id, week_start, week_end, checkin_count, moods, \
     mood_trend, dominant_focus, on_track, neutral, off_track, summary_text, source, generated_at";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite database shared by ingestion and the liveness monitor.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database at `~/.config/howubeen/howubeen.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Self::open_at(&dir.join("howubeen.db"))
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// If the caller drops this future before `f` gets the connection, `f`
    /// never runs. Once `f` has started it runs to completion.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let waiting = WaitingGuard::new();
        let abandoned = Arc::clone(&waiting.abandoned);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|err| err.into_inner());
            if abandoned.load(Ordering::SeqCst) {
                return Err(StoreError::QueryFailed("caller gave up before the query ran".into()));
            }
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::QueryFailed(format!("store task failed: {e}")))?
    }

    /// Register a user. Stands in for the account subsystem.
    pub async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (id, name, address, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![user.id, user.name, user.address, user.created_at.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    /// Register an emergency contact for an existing user.
    pub async fn add_emergency_contact(
        &self,
        user_id: &str,
        name: &str,
        address: &str,
    ) -> Result<EmergencyContact, StoreError> {
        let (user_id, name, address) = (user_id.to_string(), name.to_string(), address.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO emergency_contacts (user_id, name, address) VALUES (?1, ?2, ?3)",
                params![user_id, name, address],
            )?;
            Ok(EmergencyContact {
                id: conn.last_insert_rowid(),
                user_id,
                name,
                address,
            })
        })
        .await
    }

    /// Number of stored rows for a `(user_id, date)` key.
    pub async fn count_checkins(&self, user_id: &str, date: NaiveDate) -> Result<u64, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM checkins WHERE user_id = ?1 AND date = ?2",
                params![user_id, date.format(DATE_FORMAT).to_string()],
                |row| row.get::<_, u64>(0),
            )?;
            Ok(n)
        })
        .await
    }
}

/// Marks a store call as abandoned when the awaiting future is dropped.
struct WaitingGuard {
    abandoned: Arc<AtomicBool>,
}

impl WaitingGuard {
    fn new() -> Self {
        Self {
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Drop for WaitingGuard {
    fn drop(&mut self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }
}

fn select_checkin(
    conn: &Connection,
    user_id: &str,
    date: &str,
) -> Result<Option<CheckinRecord>, StoreError> {
    let sql = format!("SELECT {CHECKIN_COLUMNS} FROM checkins WHERE user_id = ?1 AND date = ?2");
    let raw = conn
        .query_row(&sql, params![user_id, date], RawCheckin::from_row)
        .optional()?;
    raw.map(RawCheckin::into_record).transpose()
}

/// Column values as stored, before decoding.
struct RawCheckin {
    id: i64,
    user_id: String,
    date: String,
    raw_input: Option<String>,
    voice_reference: Option<String>,
    transcript: Option<String>,
    status: Option<String>,
    mood: Option<String>,
    focus_area: Option<String>,
    alignment: Option<String>,
    takeaway: Option<String>,
    enrichment_status: String,
    created_at: String,
    updated_at: String,
}

impl RawCheckin {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: row.get(2)?,
            raw_input: row.get(3)?,
            voice_reference: row.get(4)?,
            transcript: row.get(5)?,
            status: row.get(6)?,
            mood: row.get(7)?,
            focus_area: row.get(8)?,
            alignment: row.get(9)?,
            takeaway: row.get(10)?,
            enrichment_status: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_record(self) -> Result<CheckinRecord, StoreError> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map_err(|_| corrupt("date", &self.date))?;
        let enrichment = self
            .enrichment_status
            .parse::<EnrichmentStatus>()
            .map_err(|v| corrupt("enrichment_status", &v))?;

        Ok(CheckinRecord {
            id: self.id,
            user_id: self.user_id,
            date,
            raw_input: self.raw_input,
            voice_reference: self.voice_reference,
            transcript: self.transcript,
            status: decode_mood("status", self.status)?,
            mood: decode_mood("mood", self.mood)?,
            focus_area: self.focus_area.as_deref().map(FocusArea::parse_lenient),
            alignment: self.alignment.as_deref().map(Alignment::parse_lenient),
            takeaway: self.takeaway,
            enrichment,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

fn select_summary(
    conn: &Connection,
    user_id: &str,
    week_start: &str,
) -> Result<Option<WeeklySummary>, StoreError> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM weekly_summaries WHERE user_id = ?1 AND week_start = ?2"
    );
    let raw = conn
        .query_row(&sql, params![user_id, week_start], RawSummary::from_row)
        .optional()?;
    raw.map(RawSummary::into_summary).transpose()
}

struct RawSummary {
    id: i64,
    user_id: String,
    week_start: String,
    week_end: String,
    checkin_count: u32,
    moods: String,
    mood_trend: String,
    dominant_focus: Option<String>,
    on_track: u32,
    neutral: u32,
    off_track: u32,
    summary_text: String,
    source: String,
    generated_at: String,
}

impl RawSummary {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            week_start: row.get(2)?,
            week_end: row.get(3)?,
            checkin_count: row.get(4)?,
            moods: row.get(5)?,
            mood_trend: row.get(6)?,
            dominant_focus: row.get(7)?,
            on_track: row.get(8)?,
            neutral: row.get(9)?,
            off_track: row.get(10)?,
            summary_text: row.get(11)?,
            source: row.get(12)?,
            generated_at: row.get(13)?,
        })
    }

    fn into_summary(self) -> Result<WeeklySummary, StoreError> {
        let week_start = NaiveDate::parse_from_str(&self.week_start, DATE_FORMAT)
            .map_err(|_| corrupt("week_start", &self.week_start))?;
        let week_end = NaiveDate::parse_from_str(&self.week_end, DATE_FORMAT)
            .map_err(|_| corrupt("week_end", &self.week_end))?;
        let moods = self
            .moods
            .split(',')
            .filter(|m| !m.is_empty())
            .map(|m| m.parse::<Mood>().map_err(|_| corrupt("moods", m)))
            .collect::<Result<Vec<_>, _>>()?;
        let mood_trend = self
            .mood_trend
            .parse::<MoodTrend>()
            .map_err(|v| corrupt("mood_trend", &v))?;
        let source = self
            .source
            .parse::<SummarySource>()
            .map_err(|v| corrupt("source", &v))?;

        Ok(WeeklySummary {
            id: self.id,
            user_id: self.user_id,
            digest: WeekDigest {
                week_start,
                week_end,
                checkin_count: self.checkin_count,
                moods,
                mood_trend,
                dominant_focus: self.dominant_focus.as_deref().map(FocusArea::parse_lenient),
                alignment: AlignmentTally {
                    on_track: self.on_track,
                    neutral: self.neutral,
                    off_track: self.off_track,
                },
            },
            summary_text: self.summary_text,
            source,
            generated_at: parse_timestamp("generated_at", &self.generated_at)?,
        })
    }
}

fn corrupt(column: &str, value: &str) -> StoreError {
    StoreError::Corrupt {
        column: column.to_string(),
        value: value.to_string(),
    }
}

fn decode_mood(column: &str, value: Option<String>) -> Result<Option<Mood>, StoreError> {
    value
        .map(|v| v.parse::<Mood>().map_err(|_| corrupt(column, &v)))
        .transpose()
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupt(column, value))
}

#[async_trait]
impl CheckinStore for Database {
    async fn upsert_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
        fields: CheckinFields,
        at: DateTime<Utc>,
    ) -> Result<CheckinRecord, StoreError> {
        let user_id = user_id.to_string();
        let date = date.format(DATE_FORMAT).to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            // Fields absent from this submission keep their stored value.
            tx.execute(
                "INSERT INTO checkins
                    (user_id, date, raw_input, voice_reference, status, enrichment_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)
                 ON CONFLICT(user_id, date) DO UPDATE SET
                    raw_input = COALESCE(excluded.raw_input, checkins.raw_input),
                    voice_reference = COALESCE(excluded.voice_reference, checkins.voice_reference),
                    transcript = CASE
                        WHEN excluded.voice_reference IS NOT checkins.voice_reference
                             AND excluded.voice_reference IS NOT NULL THEN NULL
                        ELSE checkins.transcript
                    END,
                    status = COALESCE(excluded.status, checkins.status),
                    enrichment_status = 'pending',
                    updated_at = excluded.updated_at",
                params![
                    user_id,
                    date,
                    fields.raw_input,
                    fields.voice_reference,
                    fields.status.map(|m| m.as_str()),
                    at.to_rfc3339(),
                ],
            )?;
            let record = select_checkin(&tx, &user_id, &date)?
                .ok_or_else(|| StoreError::QueryFailed("upserted check-in not found".into()))?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn apply_enrichment(
        &self,
        user_id: &str,
        date: NaiveDate,
        update: EnrichmentUpdate,
    ) -> Result<CheckinRecord, StoreError> {
        let user_id = user_id.to_string();
        let date = date.format(DATE_FORMAT).to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE checkins
                 SET transcript = COALESCE(?3, transcript), mood = ?4, focus_area = ?5, alignment = ?6,
                     takeaway = ?7, enrichment_status = ?8
                 WHERE user_id = ?1 AND date = ?2",
                params![
                    user_id,
                    date,
                    update.transcript,
                    update.mood.as_str(),
                    update.focus_area.as_str(),
                    update.alignment.as_str(),
                    update.takeaway,
                    update.status.as_str(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::QueryFailed(format!(
                    "no check-in for user '{user_id}' on {date}"
                )));
            }
            let record = select_checkin(&tx, &user_id, &date)?
                .ok_or_else(|| StoreError::QueryFailed("enriched check-in not found".into()))?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn get_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<CheckinRecord>, StoreError> {
        let user_id = user_id.to_string();
        let date = date.format(DATE_FORMAT).to_string();
        self.with_conn(move |conn| select_checkin(conn, &user_id, &date))
            .await
    }

    async fn get_latest_checkin(
        &self,
        user_id: &str,
    ) -> Result<Option<CheckinRecord>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {CHECKIN_COLUMNS} FROM checkins WHERE user_id = ?1
                 ORDER BY updated_at DESC, id DESC LIMIT 1"
            );
            let raw = conn
                .query_row(&sql, params![user_id], RawCheckin::from_row)
                .optional()?;
            raw.map(RawCheckin::into_record).transpose()
        })
        .await
    }

    async fn list_checkins(
        &self,
        user_id: &str,
        range: CheckinRange,
    ) -> Result<Vec<CheckinRecord>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let from = range.from.map(|d| d.format(DATE_FORMAT).to_string());
            let to = range.to.map(|d| d.format(DATE_FORMAT).to_string());
            let limit = i64::from(range.limit.unwrap_or(100));
            let sql = format!(
                "SELECT {CHECKIN_COLUMNS} FROM checkins
                 WHERE user_id = ?1
                   AND (?2 IS NULL OR date >= ?2)
                   AND (?3 IS NULL OR date <= ?3)
                 ORDER BY date DESC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user_id, from, to, limit], RawCheckin::from_row)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?.into_record()?);
            }
            Ok(records)
        })
        .await
    }

    async fn get_liveness_state(
        &self,
        user_id: &str,
    ) -> Result<Option<LivenessState>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT state, entered_at FROM liveness_states WHERE user_id = ?1",
                    params![user_id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            row.map(|(state, entered_at)| {
                Ok::<_, StoreError>(LivenessState {
                    user_id: user_id.clone(),
                    state: state
                        .parse::<LivenessLevel>()
                        .map_err(|v| corrupt("state", &v))?,
                    entered_at: parse_timestamp("entered_at", &entered_at)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn set_liveness_state(
        &self,
        user_id: &str,
        state: LivenessLevel,
        entered_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO liveness_states (user_id, state, entered_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                    state = excluded.state,
                    entered_at = excluded.entered_at",
                params![user_id, state.as_str(), entered_at.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM users ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, address, created_at FROM users WHERE id = ?1",
                    params![user_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(id, name, address, created_at)| {
                Ok::<_, StoreError>(User {
                    id,
                    name,
                    address,
                    created_at: parse_timestamp("created_at", &created_at)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn list_emergency_contacts(
        &self,
        user_id: &str,
    ) -> Result<Vec<EmergencyContact>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, address FROM emergency_contacts
                 WHERE user_id = ?1 ORDER BY id",
            )?;
            let contacts = stmt
                .query_map(params![user_id], |row| {
                    Ok(EmergencyContact {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        address: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(contacts)
        })
        .await
    }
}

#[async_trait]
impl SummaryStore for Database {
    async fn upsert_weekly_summary(
        &self,
        summary: WeeklySummary,
    ) -> Result<WeeklySummary, StoreError> {
        self.with_conn(move |conn| {
            let digest = &summary.digest;
            let week_start = digest.week_start.format(DATE_FORMAT).to_string();
            let moods: Vec<&str> = digest.moods.iter().map(Mood::as_str).collect();

            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO weekly_summaries
                    (user_id, week_start, week_end, checkin_count, moods, mood_trend, dominant_focus,
                     on_track, neutral, off_track, summary_text, source, generated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(user_id, week_start) DO UPDATE SET
                    week_end = excluded.week_end,
                    checkin_count = excluded.checkin_count,
                    moods = excluded.moods,
                    mood_trend = excluded.mood_trend,
                    dominant_focus = excluded.dominant_focus,
                    on_track = excluded.on_track,
                    neutral = excluded.neutral,
                    off_track = excluded.off_track,
                    summary_text = excluded.summary_text,
                    source = excluded.source,
                    generated_at = excluded.generated_at",
                params![
                    summary.user_id,
                    week_start,
                    digest.week_end.format(DATE_FORMAT).to_string(),
                    digest.checkin_count,
                    moods.join(","),
                    digest.mood_trend.as_str(),
                    digest.dominant_focus.map(|f| f.as_str()),
                    digest.alignment.on_track,
                    digest.alignment.neutral,
                    digest.alignment.off_track,
                    summary.summary_text,
                    summary.source.as_str(),
                    summary.generated_at.to_rfc3339(),
                ],
            )?;
            let stored = select_summary(&tx, &summary.user_id, &week_start)?
                .ok_or_else(|| StoreError::QueryFailed("stored summary not found".into()))?;
            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    async fn get_weekly_summary(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklySummary>, StoreError> {
        let user_id = user_id.to_string();
        let week_start = week_start.format(DATE_FORMAT).to_string();
        self.with_conn(move |conn| select_summary(conn, &user_id, &week_start))
            .await
    }

    async fn list_weekly_summaries(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<WeeklySummary>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS} FROM weekly_summaries
                 WHERE user_id = ?1
                 ORDER BY week_start DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let limit = i64::from(limit.unwrap_or(52));
            let rows = stmt.query_map(params![user_id, limit], RawSummary::from_row)?;

            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row?.into_summary()?);
            }
            Ok(summaries)
        })
        .await
    }
}
