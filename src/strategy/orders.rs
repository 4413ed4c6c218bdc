//! Strategy-Side Order State
//!
//! Authoritative dictionaries tracking every order a strategy has in
//! flight, keyed by `system_order_id`. Orders move between the four
//! dictionaries strictly in response to published requests and received
//! broker responses; the runner's worker thread is the only writer.

use crate::engine::events::{OrderType, RejectReason, Side};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// What the strategy wants the broker to do. Built through the
/// constructors; `symbol` defaults to the active bar's symbol at submit
/// time.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub action: Option<String>,
    pub signal: Option<String>,
    pub symbol: Option<String>,
}

impl OrderDraft {
    pub fn market(side: Side, quantity: f64) -> Self {
        Self {
            order_type: OrderType::Market,
            side,
            quantity,
            limit_price: None,
            stop_price: None,
            action: None,
            signal: None,
            symbol: None,
        }
    }

    pub fn limit(side: Side, quantity: f64, limit_price: f64) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(side, quantity)
        }
    }

    pub fn stop(side: Side, quantity: f64, stop_price: f64) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price: Some(stop_price),
            ..Self::market(side, quantity)
        }
    }

    pub fn stop_limit(side: Side, quantity: f64, stop_price: f64, limit_price: f64) -> Self {
        Self {
            order_type: OrderType::StopLimit,
            stop_price: Some(stop_price),
            limit_price: Some(limit_price),
            ..Self::market(side, quantity)
        }
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_signal(mut self, signal: &str) -> Self {
        self.signal = Some(signal.into());
        self
    }

    pub fn for_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.into());
        self
    }
}

/// An order as the strategy last knew it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedOrder {
    pub system_order_id: Uuid,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
}

/// A modification in flight: the broker will confirm either the proposed
/// fields or a rollback to the prior ones.
#[derive(Debug, Clone)]
struct InFlightModification {
    prior: TrackedOrder,
    proposed: TrackedOrder,
}

/// The four order dictionaries of one strategy.
///
/// Responses for unknown ids are ignored: with several strategies on one
/// bus, every strategy sees every broker response and claims only its own.
#[derive(Default)]
pub struct OrderTracker {
    submitted: HashMap<Uuid, TrackedOrder>,
    pending: HashMap<Uuid, TrackedOrder>,
    modifications: HashMap<Uuid, InFlightModification>,
    cancellations: HashMap<Uuid, TrackedOrder>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly published submission.
    pub fn record_submitted(&mut self, order: TrackedOrder) {
        self.submitted.insert(order.system_order_id, order);
    }

    /// `OrderAccepted`: submitted -> pending.
    pub fn on_accepted(&mut self, id: Uuid) -> bool {
        match self.submitted.remove(&id) {
            Some(order) => {
                self.pending.insert(id, order);
                true
            }
            None => false,
        }
    }

    /// `OrderRejected`: submitted entry is dropped.
    pub fn on_rejected(&mut self, id: Uuid) -> bool {
        self.submitted.remove(&id).is_some()
    }

    /// Move a pending order into the modification-in-flight dictionary,
    /// returning the proposed order to publish. Unknown or non-pending ids
    /// are a no-op error.
    pub fn request_modification(
        &mut self,
        id: Uuid,
        quantity: Option<f64>,
        limit_price: Option<f64>,
        stop_price: Option<f64>,
    ) -> Result<TrackedOrder, RejectReason> {
        let prior = self.pending.remove(&id).ok_or(RejectReason::UnknownOrder)?;
        let proposed = TrackedOrder {
            quantity: quantity.unwrap_or(prior.quantity),
            limit_price: limit_price.or(prior.limit_price),
            stop_price: stop_price.or(prior.stop_price),
            ..prior.clone()
        };
        self.modifications.insert(
            id,
            InFlightModification {
                prior,
                proposed: proposed.clone(),
            },
        );
        Ok(proposed)
    }

    /// `ModificationAccepted`: in-flight -> pending with the proposed
    /// fields.
    pub fn on_modification_accepted(&mut self, id: Uuid) -> bool {
        match self.modifications.remove(&id) {
            Some(m) => {
                self.pending.insert(id, m.proposed);
                true
            }
            None => false,
        }
    }

    /// `ModificationRejected`: in-flight -> pending with the prior fields.
    pub fn on_modification_rejected(&mut self, id: Uuid) -> bool {
        match self.modifications.remove(&id) {
            Some(m) => {
                self.pending.insert(id, m.prior);
                true
            }
            None => false,
        }
    }

    /// Move a pending order into the cancellation-in-flight dictionary.
    pub fn request_cancellation(&mut self, id: Uuid) -> Result<TrackedOrder, RejectReason> {
        let order = self.pending.remove(&id).ok_or(RejectReason::UnknownOrder)?;
        self.cancellations.insert(id, order.clone());
        Ok(order)
    }

    /// `CancellationAccepted`: the order is gone.
    pub fn on_cancellation_accepted(&mut self, id: Uuid) -> bool {
        self.cancellations.remove(&id).is_some()
    }

    /// `CancellationRejected`: back to pending.
    pub fn on_cancellation_rejected(&mut self, id: Uuid) -> bool {
        match self.cancellations.remove(&id) {
            Some(order) => {
                self.pending.insert(id, order);
                true
            }
            None => false,
        }
    }

    /// `FillEvent`: terminal. A fill may race a modification or
    /// cancellation we have in flight, so the order is claimed from
    /// whichever dictionary currently holds it.
    pub fn on_fill(&mut self, id: Uuid) -> Option<TrackedOrder> {
        self.pending
            .remove(&id)
            .or_else(|| self.modifications.remove(&id).map(|m| m.prior))
            .or_else(|| self.cancellations.remove(&id))
    }

    /// `OrderExpired`: terminal, same race rules as fills.
    pub fn on_expired(&mut self, id: Uuid) -> Option<TrackedOrder> {
        self.on_fill(id)
    }

    pub fn pending(&self) -> &HashMap<Uuid, TrackedOrder> {
        &self.pending
    }

    pub fn pending_for(&self, symbol: &str) -> Vec<&TrackedOrder> {
        self.pending.values().filter(|o| o.symbol == symbol).collect()
    }

    pub fn is_pending(&self, id: Uuid) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn open_order_count(&self) -> usize {
        self.submitted.len() + self.pending.len() + self.modifications.len()
            + self.cancellations.len()
    }
}
