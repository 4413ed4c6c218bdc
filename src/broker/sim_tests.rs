use crate::broker::sim::{SimBroker, SimBrokerConfig};
use crate::engine::bus::EventBus;
use crate::engine::events::{
    BarPeriod, BarReceived, Event, EventKind, OrderSubmissionRequest, OrderType, RejectReason,
    Side,
};
use crate::engine::subscriber::{EventHandler, Subscriber};
use anyhow::Result;
use std::sync::{Arc, Mutex as StdMutex};
use uuid::Uuid;

fn bar(symbol: &str, ohlc: (f64, f64, f64, f64), ts: i64) -> BarReceived {
    BarReceived {
        symbol: symbol.into(),
        period: BarPeriod::Minute,
        open: ohlc.0,
        high: ohlc.1,
        low: ohlc.2,
        close: ohlc.3,
        volume: 10,
        ts_event: ts,
        ts_created: ts,
    }
}

fn submission(
    order_type: OrderType,
    side: Side,
    quantity: f64,
    limit_price: Option<f64>,
    stop_price: Option<f64>,
    ts: i64,
) -> OrderSubmissionRequest {
    OrderSubmissionRequest {
        system_order_id: Uuid::new_v4(),
        symbol: "AAA".into(),
        order_type,
        side,
        quantity,
        limit_price,
        stop_price,
        action: None,
        signal: None,
        ts_event: ts,
        ts_created: ts,
    }
}

struct Cap {
    seen: Arc<StdMutex<Vec<Event>>>,
}

impl EventHandler for Cap {
    fn name(&self) -> &str {
        "capture"
    }

    fn on_event(&mut self, event: &Event) -> Result<()> {
        self.seen.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Broker driven directly, with every response captured off the bus.
fn harness(config: SimBrokerConfig) -> (Arc<EventBus>, SimBroker, Arc<StdMutex<Vec<Event>>>) {
    let bus = Arc::new(EventBus::new());
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let cap = Subscriber::spawn(Box::new(Cap {
        seen: Arc::clone(&seen),
    }));
    let mut kinds = EventKind::RESPONSES.to_vec();
    kinds.push(EventKind::BarReceived);
    bus.subscribe_all(&kinds, &cap);
    let broker = SimBroker::new(config, Arc::clone(&bus));
    (bus, broker, seen)
}

fn drain(bus: &EventBus, seen: &Arc<StdMutex<Vec<Event>>>) -> Vec<Event> {
    bus.wait_until_system_idle();
    std::mem::take(&mut *seen.lock().unwrap())
}

fn fills(events: &[Event]) -> Vec<(Uuid, f64, f64)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::FillEvent(f) => Some((f.system_order_id, f.fill_price, f.commission)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_market_fills_next_bar_at_open() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());

    broker
        .on_event(&Event::BarReceived(bar("AAA", (100.0, 101.0, 99.0, 100.5), 1)))
        .unwrap();
    let req = submission(OrderType::Market, Side::Buy, 1.0, None, None, 1);
    let id = req.system_order_id;
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();

    let events = drain(&bus, &seen);
    assert!(matches!(events.last(), Some(Event::OrderAccepted(a)) if a.system_order_id == id && a.ts_broker == 1));
    assert!(fills(&events).is_empty(), "no fill on the submission bar");

    broker
        .on_event(&Event::BarReceived(bar("AAA", (102.0, 103.0, 101.0, 102.5), 2)))
        .unwrap();
    let events = drain(&bus, &seen);
    let fills = fills(&events);
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].0, id);
    assert_eq!(fills[0].1, 102.0);
    assert_eq!(broker.pending_count("AAA"), 0);
    bus.shutdown();
}

#[test]
fn test_submission_validation_rejects() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());

    let cases = [
        (
            submission(OrderType::Market, Side::Buy, 0.0, None, None, 1),
            RejectReason::NonPositiveQuantity,
        ),
        (
            submission(OrderType::Limit, Side::Buy, 1.0, None, None, 1),
            RejectReason::MissingLimitPrice,
        ),
        (
            submission(OrderType::Stop, Side::Buy, 1.0, None, None, 1),
            RejectReason::MissingStopPrice,
        ),
        (
            submission(OrderType::StopLimit, Side::Buy, 1.0, Some(10.0), None, 1),
            RejectReason::MissingStopPrice,
        ),
    ];
    for (req, expected) in cases {
        let id = req.system_order_id;
        broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
        let events = drain(&bus, &seen);
        assert!(
            matches!(
                &events[..],
                [Event::OrderRejected(r)] if r.system_order_id == id && r.reason == expected
            ),
            "expected {expected:?}, got {events:?}"
        );
    }
    assert_eq!(broker.pending_count("AAA"), 0);
    bus.shutdown();
}

#[test]
fn test_duplicate_order_id_rejected() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(OrderType::Market, Side::Buy, 1.0, None, None, 1);
    let dup = req.clone();
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    broker.on_event(&Event::OrderSubmissionRequest(dup)).unwrap();
    let events = drain(&bus, &seen);
    assert!(matches!(&events[0], Event::OrderAccepted(_)));
    assert!(
        matches!(&events[1], Event::OrderRejected(r) if r.reason == RejectReason::DuplicateOrderId)
    );
    assert_eq!(broker.pending_count("AAA"), 1);
    bus.shutdown();
}

#[test]
fn test_limit_buy_fills_at_better_of_limit_and_open() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(OrderType::Limit, Side::Buy, 1.0, Some(97.0), None, 1);
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    drain(&bus, &seen);

    // Low above the limit: no trigger.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (100.0, 101.0, 98.0, 99.0), 2)))
        .unwrap();
    assert!(fills(&drain(&bus, &seen)).is_empty());

    // Low touches the limit; open above it, so the limit price is better.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (98.0, 99.0, 96.0, 97.0), 3)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f.len(), 1);
    assert_eq!(f[0].1, 97.0);
    bus.shutdown();
}

#[test]
fn test_limit_buy_fills_at_open_when_open_is_inside() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(OrderType::Limit, Side::Buy, 1.0, Some(97.0), None, 1);
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    drain(&bus, &seen);

    // Gap down through the limit: the open is already better than 97.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (95.0, 96.0, 94.0, 95.5), 2)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f[0].1, 95.0);
    bus.shutdown();
}

#[test]
fn test_limit_sell_fills_at_better_of_limit_and_open() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(OrderType::Limit, Side::Sell, 1.0, Some(103.0), None, 1);
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    drain(&bus, &seen);

    broker
        .on_event(&Event::BarReceived(bar("AAA", (102.0, 104.0, 101.0, 103.5), 2)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f[0].1, 103.0);

    // Gap up: open better than the limit.
    let req = submission(OrderType::Limit, Side::Sell, 1.0, Some(103.0), None, 2);
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    broker
        .on_event(&Event::BarReceived(bar("AAA", (105.0, 106.0, 104.0, 105.5), 3)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f[0].1, 105.0);
    bus.shutdown();
}

#[test]
fn test_stop_buy_gap_through_fills_at_open() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(OrderType::Stop, Side::Buy, 1.0, None, Some(102.0), 1);
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    drain(&bus, &seen);

    // Gap over the stop: adverse slippage, fill at the open.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (105.0, 106.0, 104.0, 105.5), 2)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f[0].1, 105.0);
    bus.shutdown();
}

#[test]
fn test_stop_buy_intrabar_trigger_fills_at_stop() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(OrderType::Stop, Side::Buy, 1.0, None, Some(102.0), 1);
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    drain(&bus, &seen);

    broker
        .on_event(&Event::BarReceived(bar("AAA", (100.0, 103.0, 99.0, 102.5), 2)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f[0].1, 102.0);
    bus.shutdown();
}

#[test]
fn test_stop_sell_rules() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(OrderType::Stop, Side::Sell, 1.0, None, Some(98.0), 1);
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    drain(&bus, &seen);

    // No trigger while the low stays above the stop.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (100.0, 101.0, 99.0, 100.0), 2)))
        .unwrap();
    assert!(fills(&drain(&bus, &seen)).is_empty());

    // Gap down through the stop: fill at the (worse) open.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (95.0, 96.0, 94.0, 95.0), 3)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f[0].1, 95.0);
    bus.shutdown();
}

#[test]
fn test_stop_limit_triggers_and_fills_same_bar() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(
        OrderType::StopLimit,
        Side::Buy,
        1.0,
        Some(104.0),
        Some(102.0),
        1,
    );
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    drain(&bus, &seen);

    // High crosses the stop; the bar's low is under the limit, so the
    // converted LIMIT fills on the same bar at min(limit, open).
    broker
        .on_event(&Event::BarReceived(bar("AAA", (101.0, 103.0, 100.0, 102.5), 2)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f.len(), 1);
    assert_eq!(f[0].1, 101.0);
    bus.shutdown();
}

#[test]
fn test_stop_limit_persists_as_limit_when_unfilled() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(
        OrderType::StopLimit,
        Side::Buy,
        1.0,
        Some(100.0),
        Some(102.0),
        1,
    );
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    drain(&bus, &seen);

    // Triggers (high >= 102) but the bar never trades down to the 100
    // limit: stays pending as a plain LIMIT.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (101.0, 103.0, 101.0, 102.5), 2)))
        .unwrap();
    assert!(fills(&drain(&bus, &seen)).is_empty());
    assert_eq!(broker.pending_count("AAA"), 1);

    // A later bar touching 100 fills it under the limit rule.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (101.0, 102.0, 99.5, 100.0), 3)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f[0].1, 100.0);
    bus.shutdown();
}

#[test]
fn test_modification_changes_match_outcome() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(OrderType::Limit, Side::Buy, 1.0, Some(90.0), None, 1);
    let id = req.system_order_id;
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    drain(&bus, &seen);

    broker
        .on_event(&Event::OrderModificationRequest(
            crate::engine::events::OrderModificationRequest {
                system_order_id: id,
                symbol: "AAA".into(),
                quantity: Some(2.0),
                limit_price: Some(97.0),
                stop_price: None,
                ts_event: 2,
                ts_created: 2,
            },
        ))
        .unwrap();
    let events = drain(&bus, &seen);
    assert!(matches!(&events[..], [Event::ModificationAccepted(m)] if m.system_order_id == id));

    broker
        .on_event(&Event::BarReceived(bar("AAA", (98.0, 99.0, 96.0, 97.0), 3)))
        .unwrap();
    let events = drain(&bus, &seen);
    match &events[..] {
        [Event::FillEvent(f)] => {
            assert_eq!(f.fill_price, 97.0);
            assert_eq!(f.quantity_filled, 2.0);
        }
        other => panic!("unexpected {other:?}"),
    }
    bus.shutdown();
}

#[test]
fn test_modification_and_cancellation_of_unknown_order_rejected() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let id = Uuid::new_v4();
    broker
        .on_event(&Event::OrderModificationRequest(
            crate::engine::events::OrderModificationRequest {
                system_order_id: id,
                symbol: "AAA".into(),
                quantity: None,
                limit_price: Some(1.0),
                stop_price: None,
                ts_event: 1,
                ts_created: 1,
            },
        ))
        .unwrap();
    broker
        .on_event(&Event::OrderCancellationRequest(
            crate::engine::events::OrderCancellationRequest {
                system_order_id: id,
                symbol: "AAA".into(),
                ts_event: 1,
                ts_created: 1,
            },
        ))
        .unwrap();
    let events = drain(&bus, &seen);
    assert!(
        matches!(&events[0], Event::ModificationRejected(r) if r.reason == RejectReason::UnknownOrder)
    );
    assert!(
        matches!(&events[1], Event::CancellationRejected(r) if r.reason == RejectReason::UnknownOrder)
    );
    bus.shutdown();
}

#[test]
fn test_cancellation_removes_pending_order() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    let req = submission(OrderType::Limit, Side::Buy, 1.0, Some(97.0), None, 1);
    let id = req.system_order_id;
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    broker
        .on_event(&Event::OrderCancellationRequest(
            crate::engine::events::OrderCancellationRequest {
                system_order_id: id,
                symbol: "AAA".into(),
                ts_event: 2,
                ts_created: 2,
            },
        ))
        .unwrap();
    let events = drain(&bus, &seen);
    assert!(matches!(events.last(), Some(Event::CancellationAccepted(c)) if c.system_order_id == id));
    assert_eq!(broker.pending_count("AAA"), 0);

    // The bar that would have filled it produces nothing.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (96.0, 97.0, 95.0, 96.0), 3)))
        .unwrap();
    assert!(fills(&drain(&bus, &seen)).is_empty());
    bus.shutdown();
}

#[test]
fn test_time_in_force_expiry() {
    let config = SimBrokerConfig {
        time_in_force: Some(10),
        ..SimBrokerConfig::default()
    };
    let (bus, mut broker, seen) = harness(config);
    let req = submission(OrderType::Limit, Side::Buy, 1.0, Some(97.0), None, 0);
    let id = req.system_order_id;
    broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    drain(&bus, &seen);

    // Young enough to live, no trigger.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (100.0, 101.0, 99.0, 100.0), 5)))
        .unwrap();
    assert!(drain(&bus, &seen).iter().all(|e| !matches!(e, Event::OrderExpired(_))));

    // Aged out; expires even though the bar would have filled it.
    broker
        .on_event(&Event::BarReceived(bar("AAA", (96.0, 97.0, 95.0, 96.0), 10)))
        .unwrap();
    let events = drain(&bus, &seen);
    assert!(matches!(&events[..], [Event::OrderExpired(e)] if e.system_order_id == id));
    assert_eq!(broker.pending_count("AAA"), 0);
    bus.shutdown();
}

#[test]
fn test_commission_floor_and_per_unit() {
    let config = SimBrokerConfig {
        commission_per_unit: 0.005,
        min_commission: 1.0,
        ..SimBrokerConfig::default()
    };
    let (bus, mut broker, seen) = harness(config);

    for quantity in [10.0, 1000.0] {
        let req = submission(OrderType::Market, Side::Buy, quantity, None, None, 1);
        broker.on_event(&Event::OrderSubmissionRequest(req)).unwrap();
    }
    drain(&bus, &seen);
    broker
        .on_event(&Event::BarReceived(bar("AAA", (100.0, 101.0, 99.0, 100.0), 2)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f.len(), 2);
    assert_eq!(f[0].2, 1.0); // 10 * 0.005 under the floor
    assert_eq!(f[1].2, 5.0); // 1000 * 0.005
    bus.shutdown();
}

#[test]
fn test_fixed_processing_order_market_before_limit() {
    let (bus, mut broker, seen) = harness(SimBrokerConfig::default());
    // Submit a limit first, then a market: the market must still match
    // first on the next bar.
    let limit = submission(OrderType::Limit, Side::Buy, 1.0, Some(100.0), None, 1);
    let market = submission(OrderType::Market, Side::Buy, 1.0, None, None, 1);
    let market_id = market.system_order_id;
    broker.on_event(&Event::OrderSubmissionRequest(limit)).unwrap();
    broker.on_event(&Event::OrderSubmissionRequest(market)).unwrap();
    drain(&bus, &seen);

    broker
        .on_event(&Event::BarReceived(bar("AAA", (99.0, 100.0, 98.0, 99.0), 2)))
        .unwrap();
    let f = fills(&drain(&bus, &seen));
    assert_eq!(f.len(), 2);
    assert_eq!(f[0].0, market_id);
    bus.shutdown();
}
