//! Position Tracking
//!
//! Signed quantity plus weighted-average entry price, per strategy per
//! symbol. Positive quantity is long, negative is short. A flat position
//! always carries an average price of exactly zero.

use crate::engine::events::Side;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub quantity: f64,
    pub avg_price: f64,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    /// Apply one full fill.
    ///
    /// With `q_old` the prior signed quantity and `q_fill` the signed fill
    /// quantity (negative for sells):
    /// - flat before: average = fill price
    /// - same direction: quantity-weighted average of old and fill
    /// - reduction (|q_fill| < |q_old|): average unchanged
    /// - flat after: average resets to zero
    /// - direction flip: average = fill price
    pub fn apply_fill(&mut self, side: Side, quantity: f64, price: f64) {
        let q_old = self.quantity;
        let q_fill = side.sign() * quantity;
        let q_new = q_old + q_fill;

        self.avg_price = if q_new == 0.0 {
            0.0
        } else if q_old == 0.0 {
            price
        } else if q_old.signum() == q_fill.signum() {
            (q_old.abs() * self.avg_price + q_fill.abs() * price) / (q_old.abs() + q_fill.abs())
        } else if q_fill.abs() < q_old.abs() {
            self.avg_price
        } else {
            // Flip: the residual position was opened entirely at the fill
            // price.
            price
        };
        self.quantity = q_new;
    }
}
