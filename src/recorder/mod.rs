//! Run Recorder
//!
//! The subscriber that persists every event of a run. Events are buffered
//! per table and flushed with one batched transaction whenever a buffer
//! reaches the batch size; the runtime's `cleanup` hook flushes the tails
//! at shutdown, so the recorder must be the last subscriber torn down.
//! Nothing is ever dropped on back-pressure; the unbounded queue absorbs
//! bursts and shutdown blocks until everything buffered is durable.

pub mod store;

pub use store::{table_for, RunRecord, RunStatus, RunStore};

use crate::engine::events::{Event, EventKind};
use crate::engine::subscriber::EventHandler;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Buffered rows per table before a flush.
pub const BATCH_SIZE: usize = 1_000;

pub struct RunRecorder {
    store: Arc<RunStore>,
    run_id: String,
    batch_size: usize,
    buffers: HashMap<EventKind, Vec<Event>>,
    recorded: u64,
    flushes: u64,
}

impl RunRecorder {
    pub fn new(store: Arc<RunStore>, run_id: &str) -> Self {
        Self::with_batch_size(store, run_id, BATCH_SIZE)
    }

    pub fn with_batch_size(store: Arc<RunStore>, run_id: &str, batch_size: usize) -> Self {
        Self {
            store,
            run_id: run_id.into(),
            batch_size: batch_size.max(1),
            buffers: HashMap::new(),
            recorded: 0,
            flushes: 0,
        }
    }

    /// The recorder observes the whole taxonomy.
    pub fn subscriptions() -> Vec<EventKind> {
        EventKind::ALL.to_vec()
    }

    fn flush_kind(&mut self, kind: EventKind) -> Result<()> {
        let events = match self.buffers.get_mut(&kind) {
            Some(buffer) if !buffer.is_empty() => std::mem::take(buffer),
            _ => return Ok(()),
        };
        match self.store.write_batch(&self.run_id, kind, &events) {
            Ok(_) => {
                self.flushes += 1;
                Ok(())
            }
            Err(err) => {
                // Put the rows back so the next flush (or cleanup) retries.
                let buffer = self.buffers.entry(kind).or_default();
                let tail = std::mem::replace(buffer, events);
                buffer.extend(tail);
                Err(err)
            }
        }
    }

    fn flush_all(&mut self) -> Result<()> {
        for kind in EventKind::ALL {
            self.flush_kind(kind)?;
        }
        Ok(())
    }
}

impl EventHandler for RunRecorder {
    fn name(&self) -> &str {
        "run_recorder"
    }

    fn on_event(&mut self, event: &Event) -> Result<()> {
        let kind = event.kind();
        let buffer = self.buffers.entry(kind).or_default();
        buffer.push(event.clone());
        self.recorded += 1;
        if buffer.len() >= self.batch_size {
            self.flush_kind(kind)?;
        }
        Ok(())
    }

    fn on_error(&mut self, error: anyhow::Error, event: &Event) {
        // A failed flush keeps the buffer intact; the rows retry on the
        // next flush or at cleanup.
        warn!(
            run_id = %self.run_id,
            kind = event.kind().as_str(),
            error = %error,
            "recorder write failed; will retry at next flush"
        );
    }

    fn cleanup(&mut self) {
        if let Err(error) = self.flush_all() {
            tracing::error!(run_id = %self.run_id, error = %error, "final recorder flush failed");
            return;
        }
        info!(
            run_id = %self.run_id,
            recorded = self.recorded,
            flushes = self.flushes,
            "recorder flushed and closed"
        );
    }
}
