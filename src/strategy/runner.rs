//! Strategy Runner
//!
//! The subscriber that hosts one strategy instance: filters incoming bars
//! to the configured universe, drives the indicators, publishes the
//! processed bar, invokes the user logic, and applies broker responses to
//! the order dictionaries and positions. All state here is touched only by
//! the runner's own worker thread.

use crate::engine::bus::EventBus;
use crate::engine::events::{BarProcessed, BarReceived, Event, EventKind};
use crate::engine::subscriber::EventHandler;
use crate::engine::time::now_ns;
use crate::indicators::{IndicatorSlot, PriceIdentity};
use crate::strategy::orders::OrderTracker;
use crate::strategy::params::StrategyParams;
use crate::strategy::position::Position;
use crate::strategy::{SetupContext, Strategy, StrategyConfig, StrategyContext};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

pub struct StrategyRunner {
    config: StrategyConfig,
    params: StrategyParams,
    strategy: Option<Box<dyn Strategy>>,
    indicators: Vec<IndicatorSlot>,
    positions: HashMap<String, Position>,
    orders: OrderTracker,
    bus: Arc<EventBus>,
}

impl StrategyRunner {
    /// Resolve parameters, install the identity indicators, and run the
    /// strategy's `setup` hook.
    pub fn new(
        config: StrategyConfig,
        overrides: &BTreeMap<String, String>,
        mut strategy: Box<dyn Strategy>,
        bus: Arc<EventBus>,
    ) -> Result<Self> {
        let params = StrategyParams::resolve(&config.params, overrides)?;

        let mut indicators: Vec<IndicatorSlot> = PriceIdentity::ohlcv()
            .into_iter()
            .map(|identity| IndicatorSlot::new(Box::new(identity)))
            .collect();

        strategy.setup(&mut SetupContext {
            slots: &mut indicators,
            params: &params,
        });

        Ok(Self {
            config,
            params,
            strategy: Some(strategy),
            indicators,
            positions: HashMap::new(),
            orders: OrderTracker::new(),
            bus,
        })
    }

    /// Event kinds a strategy subscribes to: bars plus every broker
    /// response. Processed bars are published, never consumed.
    pub fn subscriptions() -> Vec<EventKind> {
        let mut kinds = vec![EventKind::BarReceived];
        kinds.extend(EventKind::RESPONSES);
        kinds
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn accepts(&self, bar: &BarReceived) -> bool {
        bar.period == self.config.period && self.config.symbols.iter().any(|s| s == &bar.symbol)
    }

    fn handle_bar(&mut self, bar: &BarReceived) {
        if !self.accepts(bar) {
            return;
        }

        // Drive every indicator, collecting the visible ones into the
        // processed-bar mapping.
        let mut mapping = BTreeMap::new();
        for slot in &mut self.indicators {
            let value = slot.update(bar);
            if let Some(key) = slot.encoded_key() {
                mapping.insert(key, value);
            }
        }

        let processed = BarProcessed::from_bar(bar, mapping, now_ns());
        self.bus
            .publish(Event::BarProcessed(processed.clone()));

        let mut strategy = self
            .strategy
            .take()
            .expect("strategy present outside on_bar");
        let mut ctx = StrategyContext {
            strategy_name: &self.config.name,
            active_symbol: &bar.symbol,
            ts: bar.ts_event,
            params: &self.params,
            indicators: &self.indicators,
            positions: &self.positions,
            orders: &mut self.orders,
            bus: &self.bus,
        };
        strategy.on_bar(&mut ctx, &processed);
        self.strategy = Some(strategy);
    }

    fn apply_fill(&mut self, fill: &crate::engine::events::FillEvent) {
        if self.orders.on_fill(fill.system_order_id).is_none() {
            return; // another strategy's order
        }
        let position = self.positions.entry(fill.symbol.clone()).or_default();
        position.apply_fill(fill.side, fill.quantity_filled, fill.fill_price);
        debug!(
            strategy = %self.config.name,
            order = %fill.system_order_id,
            symbol = %fill.symbol,
            quantity = position.quantity,
            avg_price = position.avg_price,
            "fill applied"
        );
    }
}

impl EventHandler for StrategyRunner {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn on_event(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::BarReceived(bar) => self.handle_bar(bar),
            Event::OrderAccepted(e) => {
                self.orders.on_accepted(e.system_order_id);
            }
            Event::OrderRejected(e) => {
                if self.orders.on_rejected(e.system_order_id) {
                    debug!(
                        strategy = %self.config.name,
                        order = %e.system_order_id,
                        reason = e.reason.as_str(),
                        "order rejected"
                    );
                }
            }
            Event::ModificationAccepted(e) => {
                self.orders.on_modification_accepted(e.system_order_id);
            }
            Event::ModificationRejected(e) => {
                self.orders.on_modification_rejected(e.system_order_id);
            }
            Event::CancellationAccepted(e) => {
                self.orders.on_cancellation_accepted(e.system_order_id);
            }
            Event::CancellationRejected(e) => {
                self.orders.on_cancellation_rejected(e.system_order_id);
            }
            Event::FillEvent(e) => self.apply_fill(e),
            Event::OrderExpired(e) => {
                self.orders.on_expired(e.system_order_id);
            }
            // Not subscribed; exact-kind dispatch keeps these away.
            Event::BarProcessed(_)
            | Event::OrderSubmissionRequest(_)
            | Event::OrderCancellationRequest(_)
            | Event::OrderModificationRequest(_) => {}
        }
        Ok(())
    }
}
