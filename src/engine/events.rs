//! Event Model
//!
//! Canonical event types flowing through the bus. Events are immutable once
//! constructed and are shared by reference (`Arc<Event>`) across subscribers,
//! so the same instance may be observed concurrently from several worker
//! threads.
//!
//! Every event carries two nanosecond timestamps: `ts_event` (when the
//! represented fact occurred; during replay this comes from the data source)
//! and `ts_created` (wall clock at construction).

use crate::engine::time::Nanos;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1.0 for buys, -1.0 for sells.
    #[inline]
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Order type for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Fills at the open of the next bar for the symbol.
    Market,
    /// Fills when the bar range crosses the limit price.
    Limit,
    /// Converts to an aggressive fill once the stop price trades.
    Stop,
    /// Converts to a limit order once the stop price trades.
    StopLimit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::Stop => "STOP",
            OrderType::StopLimit => "STOP_LIMIT",
        }
    }

    pub fn requires_limit_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    pub fn requires_stop_price(&self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit)
    }
}

/// Bar aggregation period. The numeric codes match the source store's
/// `rtype` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarPeriod {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl BarPeriod {
    /// Source-store `rtype` code for this period.
    pub fn rtype(&self) -> i64 {
        match self {
            BarPeriod::Second => 32,
            BarPeriod::Minute => 33,
            BarPeriod::Hour => 34,
            BarPeriod::Day => 35,
            BarPeriod::Week => 36,
        }
    }

    pub fn from_rtype(rtype: i64) -> Option<Self> {
        match rtype {
            32 => Some(BarPeriod::Second),
            33 => Some(BarPeriod::Minute),
            34 => Some(BarPeriod::Hour),
            35 => Some(BarPeriod::Day),
            36 => Some(BarPeriod::Week),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BarPeriod::Second => "SECOND",
            BarPeriod::Minute => "MINUTE",
            BarPeriod::Hour => "HOUR",
            BarPeriod::Day => "DAY",
            BarPeriod::Week => "WEEK",
        }
    }
}

/// Canonical reason codes for order-request rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    NonPositiveQuantity,
    MissingLimitPrice,
    MissingStopPrice,
    DuplicateOrderId,
    UnknownOrder,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NonPositiveQuantity => "NON_POSITIVE_QUANTITY",
            RejectReason::MissingLimitPrice => "MISSING_LIMIT_PRICE",
            RejectReason::MissingStopPrice => "MISSING_STOP_PRICE",
            RejectReason::DuplicateOrderId => "DUPLICATE_ORDER_ID",
            RejectReason::UnknownOrder => "UNKNOWN_ORDER",
        }
    }
}

/// One OHLCV observation for a single symbol, as replayed from the source
/// store or received from a live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarReceived {
    pub symbol: String,
    pub period: BarPeriod,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

/// A bar after a strategy has driven its indicators over it. The
/// `indicators` map carries one entry per visible indicator, keyed by the
/// plot-encoded name (see `indicators::plot::encode_key`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarProcessed {
    pub symbol: String,
    pub period: BarPeriod,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub indicators: BTreeMap<String, f64>,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

impl BarProcessed {
    pub fn from_bar(bar: &BarReceived, indicators: BTreeMap<String, f64>, ts_created: Nanos) -> Self {
        Self {
            symbol: bar.symbol.clone(),
            period: bar.period,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            indicators,
            ts_event: bar.ts_event,
            ts_created,
        }
    }
}

/// A strategy's intent to open an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSubmissionRequest {
    pub system_order_id: Uuid,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    /// Free-form intent tag, e.g. "ENTER_LONG".
    pub action: Option<String>,
    /// Name of the signal that produced the order, if any.
    pub signal: Option<String>,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancellationRequest {
    pub system_order_id: Uuid,
    pub symbol: String,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderModificationRequest {
    pub system_order_id: Uuid,
    pub symbol: String,
    pub quantity: Option<f64>,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub system_order_id: Uuid,
    pub broker_order_id: Option<String>,
    pub ts_broker: Nanos,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRejected {
    pub system_order_id: Uuid,
    pub reason: RejectReason,
    pub message: String,
    pub ts_broker: Nanos,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationAccepted {
    pub system_order_id: Uuid,
    pub ts_broker: Nanos,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationRejected {
    pub system_order_id: Uuid,
    pub reason: RejectReason,
    pub message: String,
    pub ts_broker: Nanos,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationAccepted {
    pub system_order_id: Uuid,
    pub ts_broker: Nanos,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationRejected {
    pub system_order_id: Uuid,
    pub reason: RejectReason,
    pub message: String,
    pub ts_broker: Nanos,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

/// Execution of an order. The engine emits single full fills; the
/// `quantity_filled` field keeps the schema open for venues that report
/// partials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub system_order_id: Uuid,
    pub fill_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub quantity_filled: f64,
    pub fill_price: f64,
    pub commission: f64,
    pub exchange: String,
    pub ts_broker: Nanos,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExpired {
    pub system_order_id: Uuid,
    pub symbol: String,
    pub ts_broker: Nanos,
    pub ts_event: Nanos,
    pub ts_created: Nanos,
}

/// The tagged sum of everything that can flow through the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    BarReceived(BarReceived),
    BarProcessed(BarProcessed),
    OrderSubmissionRequest(OrderSubmissionRequest),
    OrderCancellationRequest(OrderCancellationRequest),
    OrderModificationRequest(OrderModificationRequest),
    OrderAccepted(OrderAccepted),
    OrderRejected(OrderRejected),
    CancellationAccepted(CancellationAccepted),
    CancellationRejected(CancellationRejected),
    ModificationAccepted(ModificationAccepted),
    ModificationRejected(ModificationRejected),
    FillEvent(FillEvent),
    OrderExpired(OrderExpired),
}

/// Field-less tag mirroring `Event`, used as the subscription key.
/// Dispatch is by exact kind; there is no subtype matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    BarReceived,
    BarProcessed,
    OrderSubmissionRequest,
    OrderCancellationRequest,
    OrderModificationRequest,
    OrderAccepted,
    OrderRejected,
    CancellationAccepted,
    CancellationRejected,
    ModificationAccepted,
    ModificationRejected,
    FillEvent,
    OrderExpired,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [EventKind; 13] = [
        EventKind::BarReceived,
        EventKind::BarProcessed,
        EventKind::OrderSubmissionRequest,
        EventKind::OrderCancellationRequest,
        EventKind::OrderModificationRequest,
        EventKind::OrderAccepted,
        EventKind::OrderRejected,
        EventKind::CancellationAccepted,
        EventKind::CancellationRejected,
        EventKind::ModificationAccepted,
        EventKind::ModificationRejected,
        EventKind::FillEvent,
        EventKind::OrderExpired,
    ];

    /// The three request kinds handled by a broker.
    pub const REQUESTS: [EventKind; 3] = [
        EventKind::OrderSubmissionRequest,
        EventKind::OrderCancellationRequest,
        EventKind::OrderModificationRequest,
    ];

    /// The eight response/outcome kinds consumed by a strategy.
    pub const RESPONSES: [EventKind; 8] = [
        EventKind::OrderAccepted,
        EventKind::OrderRejected,
        EventKind::CancellationAccepted,
        EventKind::CancellationRejected,
        EventKind::ModificationAccepted,
        EventKind::ModificationRejected,
        EventKind::FillEvent,
        EventKind::OrderExpired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BarReceived => "BarReceived",
            EventKind::BarProcessed => "BarProcessed",
            EventKind::OrderSubmissionRequest => "OrderSubmissionRequest",
            EventKind::OrderCancellationRequest => "OrderCancellationRequest",
            EventKind::OrderModificationRequest => "OrderModificationRequest",
            EventKind::OrderAccepted => "OrderAccepted",
            EventKind::OrderRejected => "OrderRejected",
            EventKind::CancellationAccepted => "CancellationAccepted",
            EventKind::CancellationRejected => "CancellationRejected",
            EventKind::ModificationAccepted => "ModificationAccepted",
            EventKind::ModificationRejected => "ModificationRejected",
            EventKind::FillEvent => "FillEvent",
            EventKind::OrderExpired => "OrderExpired",
        }
    }
}

impl Event {
    /// Exact kind of this event.
    #[inline]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::BarReceived(_) => EventKind::BarReceived,
            Event::BarProcessed(_) => EventKind::BarProcessed,
            Event::OrderSubmissionRequest(_) => EventKind::OrderSubmissionRequest,
            Event::OrderCancellationRequest(_) => EventKind::OrderCancellationRequest,
            Event::OrderModificationRequest(_) => EventKind::OrderModificationRequest,
            Event::OrderAccepted(_) => EventKind::OrderAccepted,
            Event::OrderRejected(_) => EventKind::OrderRejected,
            Event::CancellationAccepted(_) => EventKind::CancellationAccepted,
            Event::CancellationRejected(_) => EventKind::CancellationRejected,
            Event::ModificationAccepted(_) => EventKind::ModificationAccepted,
            Event::ModificationRejected(_) => EventKind::ModificationRejected,
            Event::FillEvent(_) => EventKind::FillEvent,
            Event::OrderExpired(_) => EventKind::OrderExpired,
        }
    }

    /// Fact timestamp of this event.
    pub fn ts_event(&self) -> Nanos {
        match self {
            Event::BarReceived(e) => e.ts_event,
            Event::BarProcessed(e) => e.ts_event,
            Event::OrderSubmissionRequest(e) => e.ts_event,
            Event::OrderCancellationRequest(e) => e.ts_event,
            Event::OrderModificationRequest(e) => e.ts_event,
            Event::OrderAccepted(e) => e.ts_event,
            Event::OrderRejected(e) => e.ts_event,
            Event::CancellationAccepted(e) => e.ts_event,
            Event::CancellationRejected(e) => e.ts_event,
            Event::ModificationAccepted(e) => e.ts_event,
            Event::ModificationRejected(e) => e.ts_event,
            Event::FillEvent(e) => e.ts_event,
            Event::OrderExpired(e) => e.ts_event,
        }
    }

    /// The symbol this event concerns, if it is symbol-specific.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Event::BarReceived(e) => Some(&e.symbol),
            Event::BarProcessed(e) => Some(&e.symbol),
            Event::OrderSubmissionRequest(e) => Some(&e.symbol),
            Event::OrderCancellationRequest(e) => Some(&e.symbol),
            Event::OrderModificationRequest(e) => Some(&e.symbol),
            Event::FillEvent(e) => Some(&e.symbol),
            Event::OrderExpired(e) => Some(&e.symbol),
            _ => None,
        }
    }

    /// The order id this event concerns, if it is order-related.
    pub fn system_order_id(&self) -> Option<Uuid> {
        match self {
            Event::OrderSubmissionRequest(e) => Some(e.system_order_id),
            Event::OrderCancellationRequest(e) => Some(e.system_order_id),
            Event::OrderModificationRequest(e) => Some(e.system_order_id),
            Event::OrderAccepted(e) => Some(e.system_order_id),
            Event::OrderRejected(e) => Some(e.system_order_id),
            Event::CancellationAccepted(e) => Some(e.system_order_id),
            Event::CancellationRejected(e) => Some(e.system_order_id),
            Event::ModificationAccepted(e) => Some(e.system_order_id),
            Event::ModificationRejected(e) => Some(e.system_order_id),
            Event::FillEvent(e) => Some(e.system_order_id),
            Event::OrderExpired(e) => Some(e.system_order_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(symbol: &str, ts: Nanos) -> BarReceived {
        BarReceived {
            symbol: symbol.into(),
            period: BarPeriod::Minute,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10,
            ts_event: ts,
            ts_created: ts,
        }
    }

    #[test]
    fn test_kind_roundtrip() {
        let e = Event::BarReceived(bar("AAA", 1));
        assert_eq!(e.kind(), EventKind::BarReceived);
        assert_eq!(e.symbol(), Some("AAA"));
        assert_eq!(e.ts_event(), 1);
        assert!(e.system_order_id().is_none());
    }

    #[test]
    fn test_rtype_codes() {
        for period in [
            BarPeriod::Second,
            BarPeriod::Minute,
            BarPeriod::Hour,
            BarPeriod::Day,
            BarPeriod::Week,
        ] {
            assert_eq!(BarPeriod::from_rtype(period.rtype()), Some(period));
        }
        assert_eq!(BarPeriod::from_rtype(31), None);
    }

    #[test]
    fn test_order_type_price_requirements() {
        assert!(OrderType::Limit.requires_limit_price());
        assert!(OrderType::StopLimit.requires_limit_price());
        assert!(OrderType::StopLimit.requires_stop_price());
        assert!(OrderType::Stop.requires_stop_price());
        assert!(!OrderType::Market.requires_limit_price());
        assert!(!OrderType::Market.requires_stop_price());
    }

    #[test]
    fn test_kind_sets_cover_taxonomy() {
        assert_eq!(EventKind::ALL.len(), 13);
        for kind in EventKind::REQUESTS {
            assert!(EventKind::ALL.contains(&kind));
        }
        for kind in EventKind::RESPONSES {
            assert!(EventKind::ALL.contains(&kind));
        }
    }
}
