//! Strategy Runtime
//!
//! User trading logic implements the `Strategy` trait; the same
//! implementation runs unchanged against the simulated broker and a live
//! one. The runtime subscribes to bars and order responses, drives the
//! indicators, publishes processed bars, and keeps the authoritative order
//! dictionaries and per-symbol positions.

pub mod orders;
pub mod params;
pub mod position;
pub mod runner;


pub use orders::{OrderDraft, OrderTracker, TrackedOrder};
pub use params::{ParamKind, ParamSpec, ParamValue, StrategyParams};
pub use position::Position;
pub use runner::StrategyRunner;

use crate::engine::bus::EventBus;
use crate::engine::events::{
    BarPeriod, BarProcessed, Event, OrderCancellationRequest, OrderModificationRequest,
    OrderSubmissionRequest, RejectReason,
};
use crate::engine::time::{now_ns, Nanos};
use crate::indicators::{Indicator, IndicatorSlot};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Handle to an indicator registered on a strategy, returned by
/// `SetupContext::add_indicator` and used for history reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorId(pub(crate) usize);

/// The five identity indicators every strategy carries, in slot order.
pub const IND_OPEN: IndicatorId = IndicatorId(0);
pub const IND_HIGH: IndicatorId = IndicatorId(1);
pub const IND_LOW: IndicatorId = IndicatorId(2);
pub const IND_CLOSE: IndicatorId = IndicatorId(3);
pub const IND_VOLUME: IndicatorId = IndicatorId(4);

/// Static definition of a strategy: identity, universe, and parameter
/// schema. The schema is plain data so external tooling can render and
/// override it.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub name: String,
    pub symbols: Vec<String>,
    pub period: BarPeriod,
    pub params: Vec<ParamSpec>,
}

impl StrategyConfig {
    pub fn new(name: &str, symbols: &[&str], period: BarPeriod) -> Self {
        Self {
            name: name.into(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            period,
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<ParamSpec>) -> Self {
        self.params = params;
        self
    }
}

/// User trading logic. `setup` runs once after parameter resolution and is
/// the only place additional indicators may be registered; `on_bar` runs
/// for every accepted bar after the indicators have been updated and the
/// processed bar published.
pub trait Strategy: Send {
    fn setup(&mut self, _ctx: &mut SetupContext) {}

    fn on_bar(&mut self, ctx: &mut StrategyContext, bar: &BarProcessed);
}

/// Construction-time context: indicator registration and resolved
/// parameters.
pub struct SetupContext<'a> {
    pub(crate) slots: &'a mut Vec<IndicatorSlot>,
    pub params: &'a StrategyParams,
}

impl SetupContext<'_> {
    /// Register an indicator and get back its read handle.
    pub fn add_indicator(&mut self, indicator: Box<dyn Indicator>) -> IndicatorId {
        self.slots.push(IndicatorSlot::new(indicator));
        IndicatorId(self.slots.len() - 1)
    }
}

/// Per-bar context handed to `Strategy::on_bar`. Order submissions with no
/// explicit symbol target the active bar's symbol.
pub struct StrategyContext<'a> {
    pub(crate) strategy_name: &'a str,
    pub(crate) active_symbol: &'a str,
    pub(crate) ts: Nanos,
    pub(crate) params: &'a StrategyParams,
    pub(crate) indicators: &'a [IndicatorSlot],
    pub(crate) positions: &'a HashMap<String, Position>,
    pub(crate) orders: &'a mut OrderTracker,
    pub(crate) bus: &'a EventBus,
}

impl StrategyContext<'_> {
    /// Symbol of the bar being processed.
    pub fn symbol(&self) -> &str {
        self.active_symbol
    }

    /// `ts_event` of the bar being processed.
    pub fn ts(&self) -> Nanos {
        self.ts
    }

    pub fn params(&self) -> &StrategyParams {
        self.params
    }

    /// Position in the active symbol.
    pub fn position(&self) -> Position {
        self.position_for(self.active_symbol)
    }

    /// Position in any symbol of the strategy's universe.
    pub fn position_for(&self, symbol: &str) -> Position {
        self.positions.get(symbol).copied().unwrap_or_default()
    }

    /// Latest value of an indicator for the active symbol; NAN if empty.
    pub fn indicator(&self, id: IndicatorId) -> f64 {
        self.indicators[id.0].latest(self.active_symbol)
    }

    /// Negative-indexed indicator read for the active symbol (-1 latest).
    pub fn indicator_at(&self, id: IndicatorId, index: i64) -> f64 {
        self.indicators[id.0].get(self.active_symbol, index)
    }

    /// Indicator read for an explicit symbol.
    pub fn indicator_for(&self, id: IndicatorId, symbol: &str, index: i64) -> f64 {
        self.indicators[id.0].get(symbol, index)
    }

    /// Orders currently pending at the broker.
    pub fn pending_orders(&self) -> Vec<TrackedOrder> {
        self.orders.pending().values().cloned().collect()
    }

    /// Publish an `OrderSubmissionRequest` for `draft` and record it in the
    /// submitted dictionary. Returns the fresh `system_order_id`.
    pub fn submit_order(&mut self, draft: OrderDraft) -> Uuid {
        let system_order_id = Uuid::new_v4();
        let symbol = draft
            .symbol
            .unwrap_or_else(|| self.active_symbol.to_string());
        self.orders.record_submitted(TrackedOrder {
            system_order_id,
            symbol: symbol.clone(),
            order_type: draft.order_type,
            side: draft.side,
            quantity: draft.quantity,
            limit_price: draft.limit_price,
            stop_price: draft.stop_price,
        });
        debug!(
            strategy = self.strategy_name,
            order = %system_order_id,
            symbol = %symbol,
            order_type = draft.order_type.as_str(),
            side = draft.side.as_str(),
            quantity = draft.quantity,
            "submitting order"
        );
        self.bus.publish(Event::OrderSubmissionRequest(
            OrderSubmissionRequest {
                system_order_id,
                symbol,
                order_type: draft.order_type,
                side: draft.side,
                quantity: draft.quantity,
                limit_price: draft.limit_price,
                stop_price: draft.stop_price,
                action: draft.action,
                signal: draft.signal,
                ts_event: self.ts,
                ts_created: now_ns(),
            },
        ));
        system_order_id
    }

    /// Publish a modification for a pending order. A no-op error when the
    /// id is not currently pending.
    pub fn submit_modification(
        &mut self,
        id: Uuid,
        quantity: Option<f64>,
        limit_price: Option<f64>,
        stop_price: Option<f64>,
    ) -> Result<(), RejectReason> {
        let proposed = self
            .orders
            .request_modification(id, quantity, limit_price, stop_price)?;
        self.bus
            .publish(Event::OrderModificationRequest(
                OrderModificationRequest {
                    system_order_id: id,
                    symbol: proposed.symbol,
                    quantity,
                    limit_price,
                    stop_price,
                    ts_event: self.ts,
                    ts_created: now_ns(),
                },
            ));
        Ok(())
    }

    /// Publish a cancellation for a pending order. A no-op error when the
    /// id is not currently pending.
    pub fn submit_cancellation(&mut self, id: Uuid) -> Result<(), RejectReason> {
        let order = self.orders.request_cancellation(id)?;
        self.bus
            .publish(Event::OrderCancellationRequest(
                OrderCancellationRequest {
                    system_order_id: id,
                    symbol: order.symbol,
                    ts_event: self.ts,
                    ts_created: now_ns(),
                },
            ));
        Ok(())
    }
}
