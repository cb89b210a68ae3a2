use chrono::{DateTime, Duration, Local, NaiveDate, SecondsFormat, Utc};
use itertools::Itertools;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::app_dirs::AppDirs;
use crate::error::Result;
use crate::sequencer::{Hand, TestType};
use crate::session::{SessionRecord, SessionSink};

/// Only this many of the most recent sessions are kept.
pub const HISTORY_LIMIT: usize = 100;

const SESSION_COLUMNS: &str =
    "date, test_type, peak, average_force, duration_secs, reps, hand, left_peak, right_peak";

/// Aggregates shown on the history screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub all_time_peak: f64,
    pub total_sessions: usize,
    pub sessions_this_week: usize,
    pub average_peak: f64,
    pub streak_days: u32,
}

/// SQLite-backed session history
#[derive(Debug)]
pub struct SessionDb {
    conn: Connection,
}

impl SessionDb {
    /// Open (or create) the history at the default state path
    pub fn open_default() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("gripmeter_sessions.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                test_type TEXT NOT NULL,
                peak REAL NOT NULL,
                average_force REAL NOT NULL,
                duration_secs INTEGER NOT NULL,
                reps INTEGER NOT NULL,
                hand TEXT NOT NULL,
                left_peak REAL NOT NULL,
                right_peak REAL NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_date ON sessions(date)",
            [],
        )?;

        Ok(SessionDb { conn })
    }

    /// Insert a finished session and drop anything beyond [`HISTORY_LIMIT`].
    pub fn record(&mut self, record: &SessionRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO sessions ({SESSION_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                timestamp(record.date),
                record.test_type.to_string(),
                record.peak,
                record.average_force,
                record.duration_secs as i64,
                record.reps,
                record.hand.to_string(),
                record.left_peak,
                record.right_peak,
            ],
        )?;
        tx.execute(
            r#"
            DELETE FROM sessions WHERE id NOT IN (
                SELECT id FROM sessions ORDER BY date DESC, id DESC LIMIT ?1
            )
            "#,
            params![HISTORY_LIMIT as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY date DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit as i64], session_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn all(&self) -> Result<Vec<SessionRecord>> {
        self.recent(HISTORY_LIMIT)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn all_time_peak(&self) -> Result<f64> {
        let peak: Option<f64> =
            self.conn
                .query_row("SELECT MAX(peak) FROM sessions", [], |row| row.get(0))?;
        Ok(peak.unwrap_or(0.0))
    }

    pub fn average_peak(&self) -> Result<f64> {
        let avg: Option<f64> =
            self.conn
                .query_row("SELECT AVG(peak) FROM sessions", [], |row| row.get(0))?;
        Ok(avg.unwrap_or(0.0))
    }

    pub fn sessions_since(&self, since: DateTime<Utc>) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE date > ?1",
            [timestamp(since)],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Consecutive local calendar days ending at `today` that have a session.
    pub fn streak(&self, today: NaiveDate) -> Result<u32> {
        let days = self
            .all()?
            .into_iter()
            .map(|s| s.date.with_timezone(&Local).date_naive());
        Ok(training_streak(days, today))
    }

    pub fn history_stats(&self, now: DateTime<Local>) -> Result<HistoryStats> {
        let week_ago = now.with_timezone(&Utc) - Duration::days(7);
        Ok(HistoryStats {
            all_time_peak: self.all_time_peak()?,
            total_sessions: self.count()?,
            sessions_this_week: self.sessions_since(week_ago)?,
            average_peak: self.average_peak()?,
            streak_days: self.streak(now.date_naive())?,
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sessions", [])?;
        Ok(())
    }
}

impl SessionSink for SessionDb {
    fn persist(&mut self, record: &SessionRecord) -> Result<()> {
        self.record(record)
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let date_str: String = row.get(0)?;
    let date = DateTime::parse_from_rfc3339(&date_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    let test_type = TestType::from_str(&row.get::<_, String>(1)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let hand = Hand::from_str(&row.get::<_, String>(6)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(SessionRecord {
        date,
        test_type,
        peak: row.get(2)?,
        average_force: row.get(3)?,
        duration_secs: row.get::<_, i64>(4)?.max(0) as u64,
        reps: row.get(5)?,
        hand,
        left_peak: row.get(7)?,
        right_peak: row.get(8)?,
    })
}

/// Counts back from `today` one day at a time; a day without a session ends
/// the streak, so a streak is 0 unless `today` itself has one.
pub fn training_streak(days: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> u32 {
    let mut expected = today;
    let mut streak = 0;
    for day in days.into_iter().sorted().rev().dedup() {
        if day > expected {
            continue;
        }
        if day != expected {
            break;
        }
        streak += 1;
        match expected.pred_opt() {
            Some(prev) => expected = prev,
            None => break,
        }
    }
    streak
}
