//! SMA Crossover Strategy
//!
//! Long-only demonstration strategy: enter when the fast moving average
//! crosses above the slow one, exit when it crosses back below. Exercises
//! indicator registration, order submission, and position tracking end to
//! end.

use crate::engine::events::{BarProcessed, Side};
use crate::indicators::{BarField, SimpleMovingAverage};
use crate::strategy::{
    IndicatorId, OrderDraft, ParamSpec, SetupContext, Strategy, StrategyContext,
};

pub struct SmaCross {
    fast: Option<IndicatorId>,
    slow: Option<IndicatorId>,
}

impl SmaCross {
    pub fn new() -> Self {
        Self {
            fast: None,
            slow: None,
        }
    }

    /// Parameter schema exposed to run configuration.
    pub fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("fast", 10).with_range(1.0, 200.0).with_step(1.0),
            ParamSpec::int("slow", 30).with_range(2.0, 500.0).with_step(1.0),
            ParamSpec::float("quantity", 1.0).with_range(0.0, 1_000_000.0),
        ]
    }
}

impl Default for SmaCross {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for SmaCross {
    fn setup(&mut self, ctx: &mut SetupContext) {
        let fast = ctx.params.i64_or("fast", 10) as usize;
        let slow = ctx.params.i64_or("slow", 30) as usize;
        self.fast = Some(ctx.add_indicator(Box::new(SimpleMovingAverage::new(
            fast,
            BarField::Close,
        ))));
        self.slow = Some(ctx.add_indicator(Box::new(SimpleMovingAverage::new(
            slow,
            BarField::Close,
        ))));
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext, _bar: &BarProcessed) {
        let (fast, slow) = (self.fast.unwrap(), self.slow.unwrap());
        let fast_now = ctx.indicator_at(fast, -1);
        let fast_prev = ctx.indicator_at(fast, -2);
        let slow_now = ctx.indicator_at(slow, -1);
        let slow_prev = ctx.indicator_at(slow, -2);
        if fast_prev.is_nan() || slow_prev.is_nan() {
            return;
        }

        let quantity = ctx.params().f64_or("quantity", 1.0);
        let position = ctx.position();

        let crossed_up = fast_prev <= slow_prev && fast_now > slow_now;
        let crossed_down = fast_prev >= slow_prev && fast_now < slow_now;

        if crossed_up && position.is_flat() {
            ctx.submit_order(
                OrderDraft::market(Side::Buy, quantity)
                    .with_action("ENTER_LONG")
                    .with_signal("sma_cross_up"),
            );
        } else if crossed_down && position.is_long() {
            ctx.submit_order(
                OrderDraft::market(Side::Sell, position.quantity)
                    .with_action("EXIT_LONG")
                    .with_signal("sma_cross_down"),
            );
        }
    }
}
