use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Hard-coded fallback when the settings row is missing or unreadable.
pub const DEFAULT_THRESHOLD: f64 = 60.0;

const THRESHOLD_KEY: &str = "threshold";

/// A single persisted noise sample.
///
/// Entries are append-only: once written they are never updated or deleted.
/// `simulated` marks values fabricated while the device was unreachable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoiseSample {
    pub timestamp: String,
    pub noise: f64,
    pub alerted: bool,
    pub simulated: bool,
}

/// Durable store for the alert threshold and the noise sample log.
///
/// Every operation opens its own connection and releases it on return, so
/// the poll worker and HTTP handlers never contend on a shared handle. WAL
/// mode keeps concurrent reads from blocking the worker's appends.
pub struct MonitorStore {
    path: PathBuf,
}

impl MonitorStore {
    /// Open (or create) the database and seed the default threshold row.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };

        let conn = store.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE TABLE IF NOT EXISTS logs (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                ts        TEXT,
                noise     REAL,
                alerted   INTEGER,
                simulated INTEGER NOT NULL DEFAULT 0
            );",
        )
        .context("Failed to run schema migration")?;

        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![THRESHOLD_KEY, DEFAULT_THRESHOLD.to_string()],
        )
        .context("Failed to seed default threshold")?;

        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open SQLite database {:?}", self.path))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("Failed to configure SQLite connection")?;

        Ok(conn)
    }

    /// Current alert threshold.
    ///
    /// Never fails the caller: a missing row, an unparseable value, or a
    /// storage error all degrade to [`DEFAULT_THRESHOLD`] so the poll loop
    /// cannot stall on a settings read.
    pub fn threshold(&self) -> f64 {
        self.read_threshold().unwrap_or(DEFAULT_THRESHOLD)
    }

    fn read_threshold(&self) -> Option<f64> {
        let conn = self.connect().ok()?;
        let value: String = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![THRESHOLD_KEY],
                |row| row.get(0),
            )
            .ok()?;
        value.parse().ok()
    }

    /// Upsert the alert threshold; exactly one row exists per key.
    pub fn set_threshold(&self, value: f64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![THRESHOLD_KEY, value.to_string()],
        )
        .context("Failed to store threshold")?;
        Ok(())
    }

    /// Append one sample to the log.
    pub fn append_log(&self, timestamp: &str, noise: f64, alerted: bool, simulated: bool) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO logs (ts, noise, alerted, simulated) VALUES (?1, ?2, ?3, ?4)",
            params![timestamp, noise, alerted as i64, simulated as i64],
        )
        .context("Failed to append noise sample")?;
        Ok(())
    }

    /// Most recent samples, newest first, at most `limit` entries.
    pub fn recent_logs(&self, limit: u32) -> Result<Vec<NoiseSample>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT ts, noise, alerted, simulated FROM logs ORDER BY id DESC LIMIT ?1")
            .context("Failed to prepare log query")?;

        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(NoiseSample {
                    timestamp: row.get(0)?,
                    noise: row.get(1)?,
                    alerted: row.get::<_, i64>(2)? != 0,
                    simulated: row.get::<_, i64>(3)? != 0,
                })
            })
            .context("Failed to query noise log")?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row.context("Failed to decode noise sample")?);
        }
        Ok(samples)
    }
}
