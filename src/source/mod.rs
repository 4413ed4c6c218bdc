//! Historical Data Source
//!
//! Reads bars out of the source SQLite store and replays them onto the bus
//! in deterministic timestamp groups: all bars sharing a `ts_event` are
//! published together, then the system idle barrier runs before the next
//! group. That barrier is what makes a backtest reproducible regardless of
//! thread scheduling.
//!
//! The source store keeps prices as integers scaled by 10^9 and encodes the
//! bar period in the `rtype` column; the `symbology` table resolves tickers
//! to instrument ids over half-open time intervals.

use crate::engine::bus::EventBus;
use crate::engine::events::{BarPeriod, BarReceived, Event};
use crate::engine::time::{now_ns, Nanos};
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Source prices are integers scaled by this factor.
pub const PRICE_SCALE: f64 = 1_000_000_000.0;

const SOURCE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ohlcv (
    instrument_id INTEGER NOT NULL,
    rtype         INTEGER NOT NULL,
    ts_event      INTEGER NOT NULL,
    open          INTEGER NOT NULL,
    high          INTEGER NOT NULL,
    low           INTEGER NOT NULL,
    close         INTEGER NOT NULL,
    volume        INTEGER NOT NULL,
    PRIMARY KEY (instrument_id, rtype, ts_event)
);

CREATE TABLE IF NOT EXISTS symbology (
    symbol        TEXT NOT NULL,
    instrument_id INTEGER NOT NULL,
    start_ts      INTEGER NOT NULL,
    end_ts        INTEGER,
    PRIMARY KEY (symbol, start_ts)
);
"#;

pub struct SourceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SourceStore {
    /// Open an existing source database read-only.
    pub fn open(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(anyhow!("source database {path} does not exist"));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("opening source database {path}"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create (or open writable) a source database with the minimal
    /// schema. Used by fixtures and the demo tooling; bulk ingestion lives
    /// elsewhere.
    pub fn create(path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("creating source database {path}"))?;
        conn.execute_batch(SOURCE_SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory source for tests.
    pub fn create_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SOURCE_SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Map `symbol` to `instrument_id` over `[start_ts, end_ts)`;
    /// `end_ts = None` leaves the interval open-ended.
    pub fn map_symbol(
        &self,
        symbol: &str,
        instrument_id: i64,
        start_ts: Nanos,
        end_ts: Option<Nanos>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO symbology (symbol, instrument_id, start_ts, end_ts)
             VALUES (?1, ?2, ?3, ?4)",
            params![symbol, instrument_id, start_ts, end_ts],
        )?;
        Ok(())
    }

    /// Insert one bar with already-scaled integer prices.
    pub fn insert_bar_raw(
        &self,
        instrument_id: i64,
        period: BarPeriod,
        ts_event: Nanos,
        open: i64,
        high: i64,
        low: i64,
        close: i64,
        volume: u64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ohlcv (instrument_id, rtype, ts_event, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                instrument_id,
                period.rtype(),
                ts_event,
                open,
                high,
                low,
                close,
                volume as i64
            ],
        )?;
        Ok(())
    }

    /// Insert one bar from float prices, applying the 10^9 scale.
    pub fn insert_bar(
        &self,
        instrument_id: i64,
        period: BarPeriod,
        ts_event: Nanos,
        ohlc: (f64, f64, f64, f64),
        volume: u64,
    ) -> Result<()> {
        let scale = |p: f64| (p * PRICE_SCALE).round() as i64;
        self.insert_bar_raw(
            instrument_id,
            period,
            ts_event,
            scale(ohlc.0),
            scale(ohlc.1),
            scale(ohlc.2),
            scale(ohlc.3),
            volume,
        )
    }

    /// Instrument ids for `symbol` whose mapping interval overlaps
    /// `[start, end)`.
    fn resolve_symbol(&self, symbol: &str, start: Nanos, end: Nanos) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT instrument_id FROM symbology
             WHERE symbol = ?1 AND start_ts < ?3 AND (end_ts IS NULL OR end_ts > ?2)
             ORDER BY start_ts",
        )?;
        let ids = stmt
            .query_map(params![symbol, start, end], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Load every bar for `symbols` at `period` within `[start, end)`,
    /// ordered by (`ts_event`, symbol). Unresolvable symbols are an error:
    /// replaying a universe that silently misses a leg is data corruption.
    pub fn load_bars(
        &self,
        symbols: &[String],
        period: BarPeriod,
        start: Nanos,
        end: Nanos,
    ) -> Result<Vec<BarReceived>> {
        if symbols.is_empty() {
            return Err(anyhow!("no symbols requested"));
        }
        let mut instrument_to_symbol: HashMap<i64, String> = HashMap::new();
        for symbol in symbols {
            let ids = self.resolve_symbol(symbol, start, end)?;
            if ids.is_empty() {
                return Err(anyhow!(
                    "symbol {symbol} has no symbology mapping in the requested range"
                ));
            }
            for id in ids {
                instrument_to_symbol.insert(id, symbol.clone());
            }
        }

        let conn = self.conn.lock();
        let placeholders = vec!["?"; instrument_to_symbol.len()].join(", ");
        let sql = format!(
            "SELECT instrument_id, ts_event, open, high, low, close, volume
             FROM ohlcv
             WHERE rtype = ? AND ts_event >= ? AND ts_event < ?
               AND instrument_id IN ({placeholders})
             ORDER BY ts_event ASC, instrument_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut values: Vec<rusqlite::types::Value> = vec![
            period.rtype().into(),
            start.into(),
            end.into(),
        ];
        values.extend(
            instrument_to_symbol
                .keys()
                .map(|id| rusqlite::types::Value::from(*id)),
        );

        let ts_created = now_ns();
        let rows = stmt.query_map(params_from_iter(values), |row| {
            let instrument_id: i64 = row.get(0)?;
            let ts_event: Nanos = row.get(1)?;
            let open: i64 = row.get(2)?;
            let high: i64 = row.get(3)?;
            let low: i64 = row.get(4)?;
            let close: i64 = row.get(5)?;
            let volume: i64 = row.get(6)?;
            Ok((instrument_id, ts_event, open, high, low, close, volume))
        })?;

        let mut bars = Vec::new();
        for row in rows {
            let (instrument_id, ts_event, open, high, low, close, volume) = row?;
            let symbol = instrument_to_symbol
                .get(&instrument_id)
                .expect("query filtered to known instruments")
                .clone();
            bars.push(BarReceived {
                symbol,
                period,
                open: open as f64 / PRICE_SCALE,
                high: high as f64 / PRICE_SCALE,
                low: low as f64 / PRICE_SCALE,
                close: close as f64 / PRICE_SCALE,
                volume: volume as u64,
                ts_event,
                ts_created,
            });
        }
        // The SQL orders by (ts_event, instrument_id); different
        // instruments of one timestamp group stay adjacent either way.
        info!(bars = bars.len(), symbols = symbols.len(), "bars loaded");
        Ok(bars)
    }
}

/// Replays a loaded bar sequence through the bus, one timestamp group at a
/// time, with the idle barrier between groups.
pub struct ReplaySource {
    bus: Arc<EventBus>,
    bars: Vec<BarReceived>,
    stop: Arc<AtomicBool>,
}

impl ReplaySource {
    pub fn new(bus: Arc<EventBus>, bars: Vec<BarReceived>, stop: Arc<AtomicBool>) -> Self {
        Self { bus, bars, stop }
    }

    /// Publish every group to completion (or until the stop signal is
    /// raised between groups). The in-flight group always completes.
    /// Returns the number of bars published.
    pub fn run(&self) -> u64 {
        let mut published: u64 = 0;
        let mut i = 0;
        while i < self.bars.len() {
            if self.stop.load(Ordering::Acquire) {
                info!(published, "replay stopped by signal");
                break;
            }
            let group_ts = self.bars[i].ts_event;
            let mut j = i;
            while j < self.bars.len() && self.bars[j].ts_event == group_ts {
                let bar = self.bars[j].clone();
                self.bus.publish(Event::BarReceived(bar));
                published += 1;
                j += 1;
            }
            // The determinism barrier: everything this group caused is
            // fully handled before the next group starts.
            self.bus.wait_until_system_idle();
            debug!(group_ts, group = j - i, "group replayed");
            i = j;
        }
        published
    }
}
