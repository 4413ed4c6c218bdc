//! Bar-Rule Matching Simulator
//!
//! Pending orders are matched against OHLC bars, not an order book. The
//! per-bar scan runs in a fixed class order (MARKET, STOP, STOP_LIMIT,
//! LIMIT; insertion order within a class) so that a run is deterministic
//! across machines and thread schedules.
//!
//! A MARKET order can never fill on the bar it was submitted on: the
//! broker's FIFO queue delivers that bar before the submission request, so
//! the first bar a pending MARKET order sees is strictly later.

use crate::engine::bus::EventBus;
use crate::engine::events::{
    BarReceived, CancellationAccepted, CancellationRejected, Event, EventKind, FillEvent,
    ModificationAccepted, ModificationRejected, OrderAccepted, OrderCancellationRequest,
    OrderExpired, OrderModificationRequest, OrderRejected, OrderSubmissionRequest, OrderType,
    RejectReason, Side,
};
use crate::engine::subscriber::EventHandler;
use crate::engine::time::{now_ns, Nanos};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Fixed matching configuration for one run.
#[derive(Debug, Clone)]
pub struct SimBrokerConfig {
    /// Commission charged per unit of quantity.
    pub commission_per_unit: f64,
    /// Floor commission per order.
    pub min_commission: f64,
    /// Exchange identifier stamped on fills.
    pub exchange: String,
    /// When set, pending orders older than this expire. Default is
    /// good-till-cancelled within the run.
    pub time_in_force: Option<Nanos>,
}

impl Default for SimBrokerConfig {
    fn default() -> Self {
        Self {
            commission_per_unit: 0.005,
            min_commission: 1.0,
            exchange: "SIM".into(),
            time_in_force: None,
        }
    }
}

/// An accepted order waiting to match.
#[derive(Debug, Clone)]
struct PendingOrder {
    system_order_id: Uuid,
    symbol: String,
    order_type: OrderType,
    side: Side,
    quantity: f64,
    limit_price: Option<f64>,
    stop_price: Option<f64>,
    /// Acceptance tick for insertion ordering and expiry.
    accepted_ts: Nanos,
    seq: u64,
}

fn class_rank(order_type: OrderType) -> u8 {
    match order_type {
        OrderType::Market => 0,
        OrderType::Stop => 1,
        OrderType::StopLimit => 2,
        OrderType::Limit => 3,
    }
}

pub struct SimBroker {
    config: SimBrokerConfig,
    bus: Arc<EventBus>,
    /// Pending orders per symbol.
    pending: HashMap<String, Vec<PendingOrder>>,
    /// Every order id ever accepted or rejected; ids are never reused.
    known_ids: HashSet<Uuid>,
    next_seq: u64,
}

impl SimBroker {
    pub fn new(config: SimBrokerConfig, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            bus,
            pending: HashMap::new(),
            known_ids: HashSet::new(),
            next_seq: 0,
        }
    }

    /// Event kinds the broker subscribes to: the three request kinds plus
    /// raw bars.
    pub fn subscriptions() -> Vec<EventKind> {
        let mut kinds = EventKind::REQUESTS.to_vec();
        kinds.push(EventKind::BarReceived);
        kinds
    }

    fn validate_submission(&self, req: &OrderSubmissionRequest) -> Option<RejectReason> {
        if !(req.quantity > 0.0) {
            return Some(RejectReason::NonPositiveQuantity);
        }
        if req.order_type.requires_limit_price() && req.limit_price.is_none() {
            return Some(RejectReason::MissingLimitPrice);
        }
        if req.order_type.requires_stop_price() && req.stop_price.is_none() {
            return Some(RejectReason::MissingStopPrice);
        }
        if self.known_ids.contains(&req.system_order_id) {
            return Some(RejectReason::DuplicateOrderId);
        }
        None
    }

    fn handle_submission(&mut self, req: &OrderSubmissionRequest) {
        let invalid = self.validate_submission(req);
        self.known_ids.insert(req.system_order_id);
        if let Some(reason) = invalid {
            debug!(order = %req.system_order_id, reason = reason.as_str(), "submission rejected");
            self.bus.publish(Event::OrderRejected(OrderRejected {
                system_order_id: req.system_order_id,
                reason,
                message: format!("{} order rejected: {}", req.order_type.as_str(), reason.as_str()),
                ts_broker: req.ts_event,
                ts_event: req.ts_event,
                ts_created: now_ns(),
            }));
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending
            .entry(req.symbol.clone())
            .or_default()
            .push(PendingOrder {
                system_order_id: req.system_order_id,
                symbol: req.symbol.clone(),
                order_type: req.order_type,
                side: req.side,
                quantity: req.quantity,
                limit_price: req.limit_price,
                stop_price: req.stop_price,
                accepted_ts: req.ts_event,
                seq,
            });
        self.bus.publish(Event::OrderAccepted(OrderAccepted {
            system_order_id: req.system_order_id,
            broker_order_id: Some(format!("{}-{}", self.config.exchange, seq)),
            ts_broker: req.ts_event,
            ts_event: req.ts_event,
            ts_created: now_ns(),
        }));
    }

    fn find_pending(&mut self, symbol: &str, id: Uuid) -> Option<&mut PendingOrder> {
        self.pending
            .get_mut(symbol)?
            .iter_mut()
            .find(|o| o.system_order_id == id)
    }

    fn handle_modification(&mut self, req: &OrderModificationRequest) {
        let reject = |reason: RejectReason| {
            Event::ModificationRejected(ModificationRejected {
                system_order_id: req.system_order_id,
                reason,
                message: format!("modification rejected: {}", reason.as_str()),
                ts_broker: req.ts_event,
                ts_event: req.ts_event,
                ts_created: now_ns(),
            })
        };

        if matches!(req.quantity, Some(q) if !(q > 0.0)) {
            self.bus.publish(reject(RejectReason::NonPositiveQuantity));
            return;
        }
        let applied = match self.find_pending(&req.symbol, req.system_order_id) {
            None => false,
            Some(order) => {
                if let Some(quantity) = req.quantity {
                    order.quantity = quantity;
                }
                if let Some(limit) = req.limit_price {
                    order.limit_price = Some(limit);
                }
                if let Some(stop) = req.stop_price {
                    order.stop_price = Some(stop);
                }
                true
            }
        };
        if applied {
            self.bus
                .publish(Event::ModificationAccepted(ModificationAccepted {
                    system_order_id: req.system_order_id,
                    ts_broker: req.ts_event,
                    ts_event: req.ts_event,
                    ts_created: now_ns(),
                }));
        } else {
            self.bus.publish(reject(RejectReason::UnknownOrder));
        }
    }

    fn handle_cancellation(&mut self, req: &OrderCancellationRequest) {
        let removed = self.pending.get_mut(&req.symbol).and_then(|orders| {
            let idx = orders
                .iter()
                .position(|o| o.system_order_id == req.system_order_id)?;
            Some(orders.remove(idx))
        });
        match removed {
            Some(_) => self
                .bus
                .publish(Event::CancellationAccepted(CancellationAccepted {
                    system_order_id: req.system_order_id,
                    ts_broker: req.ts_event,
                    ts_event: req.ts_event,
                    ts_created: now_ns(),
                })),
            None => self
                .bus
                .publish(Event::CancellationRejected(CancellationRejected {
                    system_order_id: req.system_order_id,
                    reason: RejectReason::UnknownOrder,
                    message: format!(
                        "cancellation rejected: {}",
                        RejectReason::UnknownOrder.as_str()
                    ),
                    ts_broker: req.ts_event,
                    ts_event: req.ts_event,
                    ts_created: now_ns(),
                })),
        }
    }

    /// Price at which `order` fills against `bar`, if it fires. A
    /// triggered STOP_LIMIT converts to a LIMIT and is evaluated by the
    /// limit rule on the same bar.
    fn evaluate(order: &mut PendingOrder, bar: &BarReceived) -> Option<f64> {
        match order.order_type {
            OrderType::Market => Some(bar.open),
            OrderType::Stop => {
                // Acceptance validated the price; a missing one never matches.
                let stop = order.stop_price?;
                match order.side {
                    Side::Buy if bar.high >= stop => Some(stop.max(bar.open)),
                    Side::Sell if bar.low <= stop => Some(stop.min(bar.open)),
                    _ => None,
                }
            }
            OrderType::StopLimit => {
                let stop = order.stop_price?;
                let triggered = match order.side {
                    Side::Buy => bar.high >= stop,
                    Side::Sell => bar.low <= stop,
                };
                if !triggered {
                    return None;
                }
                order.order_type = OrderType::Limit;
                Self::evaluate(order, bar)
            }
            OrderType::Limit => {
                let limit = order.limit_price?;
                match order.side {
                    Side::Buy if bar.low <= limit => Some(limit.min(bar.open)),
                    Side::Sell if bar.high >= limit => Some(limit.max(bar.open)),
                    _ => None,
                }
            }
        }
    }

    fn commission(&self, quantity: f64) -> f64 {
        (quantity * self.config.commission_per_unit).max(self.config.min_commission)
    }

    fn match_bar(&mut self, bar: &BarReceived) {
        let Some(orders) = self.pending.get_mut(&bar.symbol) else {
            return;
        };

        // Expiry first: anything that aged out never sees this bar.
        let mut expired: Vec<PendingOrder> = Vec::new();
        if let Some(tif) = self.config.time_in_force {
            orders.retain(|o| {
                if bar.ts_event - o.accepted_ts >= tif {
                    expired.push(o.clone());
                    false
                } else {
                    true
                }
            });
        }

        // Fixed processing order: class rank, then acceptance order.
        let mut scan: Vec<usize> = (0..orders.len()).collect();
        scan.sort_by_key(|&i| (class_rank(orders[i].order_type), orders[i].seq));

        let mut fills: Vec<(PendingOrder, f64)> = Vec::new();
        for i in scan {
            let order = &mut orders[i];
            if let Some(price) = Self::evaluate(order, bar) {
                fills.push((order.clone(), price));
            }
        }
        let filled_ids: HashSet<Uuid> =
            fills.iter().map(|(o, _)| o.system_order_id).collect();
        orders.retain(|o| !filled_ids.contains(&o.system_order_id));

        for order in expired {
            debug!(order = %order.system_order_id, symbol = %order.symbol, "order expired");
            self.bus.publish(Event::OrderExpired(OrderExpired {
                system_order_id: order.system_order_id,
                symbol: order.symbol,
                ts_broker: bar.ts_event,
                ts_event: bar.ts_event,
                ts_created: now_ns(),
            }));
        }

        for (order, price) in fills {
            debug!(
                order = %order.system_order_id,
                symbol = %order.symbol,
                side = order.side.as_str(),
                quantity = order.quantity,
                price,
                "fill"
            );
            self.bus.publish(Event::FillEvent(FillEvent {
                system_order_id: order.system_order_id,
                fill_id: Uuid::new_v4(),
                symbol: order.symbol,
                side: order.side,
                quantity_filled: order.quantity,
                fill_price: price,
                commission: self.commission(order.quantity),
                exchange: self.config.exchange.clone(),
                ts_broker: bar.ts_event,
                ts_event: bar.ts_event,
                ts_created: now_ns(),
            }));
        }
    }

    /// Orders still pending for a symbol (diagnostics and tests).
    pub fn pending_count(&self, symbol: &str) -> usize {
        self.pending.get(symbol).map(Vec::len).unwrap_or(0)
    }
}

impl EventHandler for SimBroker {
    fn name(&self) -> &str {
        "sim_broker"
    }

    fn on_event(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::OrderSubmissionRequest(req) => self.handle_submission(req),
            Event::OrderModificationRequest(req) => self.handle_modification(req),
            Event::OrderCancellationRequest(req) => self.handle_cancellation(req),
            Event::BarReceived(bar) => self.match_bar(bar),
            _ => {}
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        let open: usize = self.pending.values().map(Vec::len).sum();
        if open > 0 {
            info!(open, "broker shutting down with open orders");
        }
    }
}
