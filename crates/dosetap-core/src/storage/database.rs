//! SQLite-based session storage.
//!
//! Provides persistent storage for:
//! - Per-night dose facts, keyed by session key
//! - The quick-log event history
//! - Key-value store for application state

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::limiter::RateLimiter;
use crate::window::DoseFacts;

use super::data_dir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub name: String,
    pub at: DateTime<Utc>,
    pub session_key: String,
}

/// SQLite database for session storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/dosetap/dosetap.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the database
    /// cannot be opened or migrated.
    pub fn open() -> Result<Self, crate::error::CoreError> {
        let path = data_dir()?.join("dosetap.db");
        Ok(Self::open_at(&path)?)
    }

    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_key        TEXT PRIMARY KEY,
                dose1_at           TEXT,
                dose2_taken_at     TEXT,
                dose2_skipped      INTEGER NOT NULL DEFAULT 0,
                snooze_count       INTEGER NOT NULL DEFAULT 0,
                wake_final_at      TEXT,
                check_in_completed INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                at          TEXT NOT NULL,
                session_key TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_name_at ON events(name, at);
            CREATE INDEX IF NOT EXISTS idx_events_session_key ON events(session_key);",
        )?;
        Ok(())
    }

    /// Facts recorded for `session_key`; empty facts if the night is new.
    pub fn load_facts(&self, session_key: &str) -> Result<DoseFacts, DatabaseError> {
        let row = self
            .conn
            .query_row(
                "SELECT dose1_at, dose2_taken_at, dose2_skipped, snooze_count,
                        wake_final_at, check_in_completed
                 FROM sessions WHERE session_key = ?1",
                params![session_key],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, bool>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((dose1, dose2, skipped, snoozes, wake, check_in)) = row else {
            return Ok(DoseFacts::default());
        };
        Ok(DoseFacts {
            dose1_at: parse_opt("dose1_at", dose1)?,
            dose2_taken_at: parse_opt("dose2_taken_at", dose2)?,
            dose2_skipped: skipped,
            snooze_count: snoozes,
            wake_final_at: parse_opt("wake_final_at", wake)?,
            check_in_completed: check_in,
        })
    }

    /// Insert or replace the facts for `session_key`.
    pub fn save_facts(&self, session_key: &str, facts: &DoseFacts) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sessions
                (session_key, dose1_at, dose2_taken_at, dose2_skipped, snooze_count,
                 wake_final_at, check_in_completed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session_key,
                facts.dose1_at.map(|t| t.to_rfc3339()),
                facts.dose2_taken_at.map(|t| t.to_rfc3339()),
                facts.dose2_skipped,
                facts.snooze_count,
                facts.wake_final_at.map(|t| t.to_rfc3339()),
                facts.check_in_completed,
            ],
        )?;
        Ok(())
    }

    /// Append a quick-log event.
    pub fn record_event(
        &self,
        name: &str,
        at: DateTime<Utc>,
        session_key: &str,
    ) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO events (name, at, session_key) VALUES (?1, ?2, ?3)",
            params![name, at.to_rfc3339(), session_key],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent occurrence of `name`, across all sessions.
    pub fn last_event_at(&self, name: &str) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT MAX(at) FROM events WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )?;
        parse_opt("at", value)
    }

    pub fn events_for_session(&self, session_key: &str) -> Result<Vec<EventRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, at, session_key FROM events
             WHERE session_key = ?1
             ORDER BY at, id",
        )?;
        let rows = stmt.query_map(params![session_key], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, name, at, session_key) = row?;
            events.push(EventRecord {
                id,
                name,
                at: parse("at", &at)?,
                session_key,
            });
        }
        Ok(events)
    }

    /// Register each cooled-down event's last occurrence with `limiter`, so
    /// cooldowns survive a restart.
    pub fn seed_limiter(&self, limiter: &RateLimiter) -> Result<(), DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, MAX(at) FROM events GROUP BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (name, at) = row?;
            if limiter.cooldown(&name).is_some() {
                limiter.register(&name, parse("at", &at)?);
            }
        }
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

fn parse(column: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt {
            column: column.to_string(),
            message: e.to_string(),
        })
}

fn parse_opt(column: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.as_deref().map(|v| parse(column, v)).transpose()
}
