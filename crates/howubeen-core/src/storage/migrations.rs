//! Database schema migrations for howubeen.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: users, emergency contacts and check-ins.
///
/// `checkins` carries `UNIQUE(user_id, date)`: the upsert path relies on
/// the conflict target, so this constraint must never be dropped.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL DEFAULT '',
            address     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS emergency_contacts (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name     TEXT NOT NULL,
            address  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS checkins (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id            TEXT NOT NULL,
            date               TEXT NOT NULL,
            raw_input          TEXT,
            voice_reference    TEXT,
            transcript         TEXT,
            status             TEXT,
            mood               TEXT,
            focus_area         TEXT,
            alignment          TEXT,
            takeaway           TEXT,
            enrichment_status  TEXT NOT NULL DEFAULT 'pending',
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL,
            UNIQUE(user_id, date)
        );

        CREATE INDEX IF NOT EXISTS idx_contacts_user ON emergency_contacts(user_id);
        CREATE INDEX IF NOT EXISTS idx_checkins_user_updated ON checkins(user_id, updated_at);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: persisted escalation level per user.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS liveness_states (
            user_id     TEXT PRIMARY KEY,
            state       TEXT NOT NULL,
            entered_at  TEXT NOT NULL
        );",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

/// Migration v3: one summary per user per Monday-to-Sunday week.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS weekly_summaries (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         TEXT NOT NULL,
            week_start      TEXT NOT NULL,
            week_end        TEXT NOT NULL,
            checkin_count   INTEGER NOT NULL,
            moods           TEXT NOT NULL DEFAULT '',
            mood_trend      TEXT NOT NULL,
            dominant_focus  TEXT,
            on_track        INTEGER NOT NULL DEFAULT 0,
            neutral         INTEGER NOT NULL DEFAULT 0,
            off_track       INTEGER NOT NULL DEFAULT 0,
            summary_text    TEXT NOT NULL,
            source          TEXT NOT NULL,
            generated_at    TEXT NOT NULL,
            UNIQUE(user_id, week_start)
        );",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()?;
    Ok(())
}
