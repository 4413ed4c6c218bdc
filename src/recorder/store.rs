//! Run Results Store
//!
//! SQLite persistence for runs and their full event traces: one `runs`
//! table plus one table per event variant, every event row carrying the
//! `run_id` foreign key. WAL mode so the dashboard can read a run while it
//! is still being written; batched inserts inside immediate transactions.

use crate::engine::events::{Event, EventKind};
use crate::engine::time::Nanos;
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS runs (
    run_id   TEXT PRIMARY KEY,
    name     TEXT NOT NULL,
    ts_start INTEGER NOT NULL,
    ts_end   INTEGER,
    status   TEXT NOT NULL,
    config   TEXT NOT NULL,
    metadata TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS bars_received (
    run_id     TEXT NOT NULL REFERENCES runs(run_id),
    symbol     TEXT NOT NULL,
    period     TEXT NOT NULL,
    open       REAL NOT NULL,
    high       REAL NOT NULL,
    low        REAL NOT NULL,
    close      REAL NOT NULL,
    volume     INTEGER NOT NULL,
    ts_event   INTEGER NOT NULL,
    ts_created INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bars_received_run
    ON bars_received(run_id, symbol, ts_event);

CREATE TABLE IF NOT EXISTS bars_processed (
    run_id     TEXT NOT NULL REFERENCES runs(run_id),
    symbol     TEXT NOT NULL,
    period     TEXT NOT NULL,
    open       REAL NOT NULL,
    high       REAL NOT NULL,
    low        REAL NOT NULL,
    close      REAL NOT NULL,
    volume     INTEGER NOT NULL,
    indicators TEXT NOT NULL,
    ts_event   INTEGER NOT NULL,
    ts_created INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bars_processed_run
    ON bars_processed(run_id, symbol, ts_event);

CREATE TABLE IF NOT EXISTS order_submission_requests (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    symbol          TEXT NOT NULL,
    order_type      TEXT NOT NULL,
    side            TEXT NOT NULL,
    quantity        REAL NOT NULL,
    limit_price     REAL,
    stop_price      REAL,
    action          TEXT,
    signal          TEXT,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS order_cancellation_requests (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    symbol          TEXT NOT NULL,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS order_modification_requests (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    symbol          TEXT NOT NULL,
    quantity        REAL,
    limit_price     REAL,
    stop_price      REAL,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS orders_accepted (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    broker_order_id TEXT,
    ts_broker       INTEGER NOT NULL,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS orders_rejected (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    reason          TEXT NOT NULL,
    message         TEXT NOT NULL,
    ts_broker       INTEGER NOT NULL,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS cancellations_accepted (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    ts_broker       INTEGER NOT NULL,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS cancellations_rejected (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    reason          TEXT NOT NULL,
    message         TEXT NOT NULL,
    ts_broker       INTEGER NOT NULL,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS modifications_accepted (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    ts_broker       INTEGER NOT NULL,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS modifications_rejected (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    reason          TEXT NOT NULL,
    message         TEXT NOT NULL,
    ts_broker       INTEGER NOT NULL,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS fills (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    fill_id         TEXT NOT NULL,
    symbol          TEXT NOT NULL,
    side            TEXT NOT NULL,
    quantity_filled REAL NOT NULL,
    fill_price      REAL NOT NULL,
    commission      REAL NOT NULL,
    exchange        TEXT NOT NULL,
    ts_broker       INTEGER NOT NULL,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fills_run ON fills(run_id, symbol, ts_event);

CREATE TABLE IF NOT EXISTS orders_expired (
    run_id          TEXT NOT NULL REFERENCES runs(run_id),
    system_order_id TEXT NOT NULL,
    symbol          TEXT NOT NULL,
    ts_broker       INTEGER NOT NULL,
    ts_event        INTEGER NOT NULL,
    ts_created      INTEGER NOT NULL
);
"#;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }
}

/// One row of the `runs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub name: String,
    pub ts_start: Nanos,
    pub ts_end: Option<Nanos>,
    pub status: RunStatus,
    pub config: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// Table name for an event kind.
pub fn table_for(kind: EventKind) -> &'static str {
    match kind {
        EventKind::BarReceived => "bars_received",
        EventKind::BarProcessed => "bars_processed",
        EventKind::OrderSubmissionRequest => "order_submission_requests",
        EventKind::OrderCancellationRequest => "order_cancellation_requests",
        EventKind::OrderModificationRequest => "order_modification_requests",
        EventKind::OrderAccepted => "orders_accepted",
        EventKind::OrderRejected => "orders_rejected",
        EventKind::CancellationAccepted => "cancellations_accepted",
        EventKind::CancellationRejected => "cancellations_rejected",
        EventKind::ModificationAccepted => "modifications_accepted",
        EventKind::ModificationRejected => "modifications_rejected",
        EventKind::FillEvent => "fills",
        EventKind::OrderExpired => "orders_expired",
    }
}

pub struct RunStore {
    conn: Arc<Mutex<Connection>>,
}

impl RunStore {
    /// Open (creating if needed) the results database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating results directory for {path}"))?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("opening results database {path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("initialising results schema")?;
        info!(path = %path, "run store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Second, read-only connection for external inspection of in-progress
    /// and completed runs. WAL mode makes this safe while the writer is
    /// live.
    pub fn open_read_only(path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("opening results database {path} read-only"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn insert_run(&self, run: &RunRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO runs (run_id, name, ts_start, ts_end, status, config, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.run_id,
                run.name,
                run.ts_start,
                run.ts_end,
                run.status.as_str(),
                run.config.to_string(),
                run.metadata.to_string(),
            ],
        )
        .with_context(|| format!("inserting run {}", run.run_id))?;
        Ok(())
    }

    pub fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        ts_end: Option<Nanos>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE runs SET status = ?2, ts_end = COALESCE(?3, ts_end) WHERE run_id = ?1",
                params![run_id, status.as_str(), ts_end],
            )
            .with_context(|| format!("updating run {run_id}"))?;
        if updated == 0 {
            return Err(anyhow!("run {run_id} not found"));
        }
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT run_id, name, ts_start, ts_end, status, config, metadata
             FROM runs WHERE run_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![run_id], row_to_run)?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT run_id, name, ts_start, ts_end, status, config, metadata
             FROM runs ORDER BY ts_start DESC",
        )?;
        let rows = stmt.query_map([], row_to_run)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Batched insert of one kind's buffered events inside a single
    /// immediate transaction.
    pub fn write_batch(&self, run_id: &str, kind: EventKind, events: &[Event]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])
            .context("starting batch transaction")?;
        let result = (|| -> Result<usize> {
            let mut written = 0;
            for event in events {
                debug_assert_eq!(event.kind(), kind);
                insert_event(&conn, run_id, event)?;
                written += 1;
            }
            Ok(written)
        })();
        match result {
            Ok(written) => {
                conn.execute("COMMIT", [])
                    .context("committing batch transaction")?;
                Ok(written)
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(err).with_context(|| format!("writing {} batch", table_for(kind)))
            }
        }
    }

    /// Row count in an event table for one run.
    pub fn count_events(&self, run_id: &str, kind: EventKind) -> Result<i64> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE run_id = ?1",
            table_for(kind)
        );
        conn.query_row(&sql, params![run_id], |row| row.get(0))
            .map_err(Into::into)
    }

    /// (ts_event, symbol, indicators JSON) per recorded processed bar of a
    /// run, in event-time order.
    pub fn load_processed_indicators(&self, run_id: &str) -> Result<Vec<(Nanos, String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT ts_event, symbol, indicators
             FROM bars_processed WHERE run_id = ?1 ORDER BY ts_event, rowid",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// (system_order_id, fill_price, quantity_filled) per fill of a run,
    /// in event-time order.
    pub fn load_fills(&self, run_id: &str) -> Result<Vec<(String, f64, f64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT system_order_id, fill_price, quantity_filled
             FROM fills WHERE run_id = ?1 ORDER BY ts_event, rowid",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(4)?;
    let config: String = row.get(5)?;
    let metadata: String = row.get(6)?;
    Ok(RunRecord {
        run_id: row.get(0)?,
        name: row.get(1)?,
        ts_start: row.get(2)?,
        ts_end: row.get(3)?,
        status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
        config: serde_json::from_str(&config).unwrap_or(serde_json::Value::Null),
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
    })
}

fn insert_event(conn: &Connection, run_id: &str, event: &Event) -> Result<()> {
    match event {
        Event::BarReceived(e) => {
            conn.execute(
                "INSERT INTO bars_received
                 (run_id, symbol, period, open, high, low, close, volume, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    run_id,
                    e.symbol,
                    e.period.as_str(),
                    e.open,
                    e.high,
                    e.low,
                    e.close,
                    e.volume as i64,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::BarProcessed(e) => {
            conn.execute(
                "INSERT INTO bars_processed
                 (run_id, symbol, period, open, high, low, close, volume, indicators, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    run_id,
                    e.symbol,
                    e.period.as_str(),
                    e.open,
                    e.high,
                    e.low,
                    e.close,
                    e.volume as i64,
                    serde_json::to_string(&e.indicators)?,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::OrderSubmissionRequest(e) => {
            conn.execute(
                "INSERT INTO order_submission_requests
                 (run_id, system_order_id, symbol, order_type, side, quantity,
                  limit_price, stop_price, action, signal, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.symbol,
                    e.order_type.as_str(),
                    e.side.as_str(),
                    e.quantity,
                    e.limit_price,
                    e.stop_price,
                    e.action,
                    e.signal,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::OrderCancellationRequest(e) => {
            conn.execute(
                "INSERT INTO order_cancellation_requests
                 (run_id, system_order_id, symbol, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.symbol,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::OrderModificationRequest(e) => {
            conn.execute(
                "INSERT INTO order_modification_requests
                 (run_id, system_order_id, symbol, quantity, limit_price, stop_price,
                  ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.symbol,
                    e.quantity,
                    e.limit_price,
                    e.stop_price,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::OrderAccepted(e) => {
            conn.execute(
                "INSERT INTO orders_accepted
                 (run_id, system_order_id, broker_order_id, ts_broker, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.broker_order_id,
                    e.ts_broker,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::OrderRejected(e) => {
            conn.execute(
                "INSERT INTO orders_rejected
                 (run_id, system_order_id, reason, message, ts_broker, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.reason.as_str(),
                    e.message,
                    e.ts_broker,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::CancellationAccepted(e) => {
            conn.execute(
                "INSERT INTO cancellations_accepted
                 (run_id, system_order_id, ts_broker, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.ts_broker,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::CancellationRejected(e) => {
            conn.execute(
                "INSERT INTO cancellations_rejected
                 (run_id, system_order_id, reason, message, ts_broker, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.reason.as_str(),
                    e.message,
                    e.ts_broker,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::ModificationAccepted(e) => {
            conn.execute(
                "INSERT INTO modifications_accepted
                 (run_id, system_order_id, ts_broker, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.ts_broker,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::ModificationRejected(e) => {
            conn.execute(
                "INSERT INTO modifications_rejected
                 (run_id, system_order_id, reason, message, ts_broker, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.reason.as_str(),
                    e.message,
                    e.ts_broker,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::FillEvent(e) => {
            conn.execute(
                "INSERT INTO fills
                 (run_id, system_order_id, fill_id, symbol, side, quantity_filled,
                  fill_price, commission, exchange, ts_broker, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.fill_id.to_string(),
                    e.symbol,
                    e.side.as_str(),
                    e.quantity_filled,
                    e.fill_price,
                    e.commission,
                    e.exchange,
                    e.ts_broker,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
        Event::OrderExpired(e) => {
            conn.execute(
                "INSERT INTO orders_expired
                 (run_id, system_order_id, symbol, ts_broker, ts_event, ts_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run_id,
                    e.system_order_id.to_string(),
                    e.symbol,
                    e.ts_broker,
                    e.ts_event,
                    e.ts_created,
                ],
            )?;
        }
    }
    Ok(())
}
