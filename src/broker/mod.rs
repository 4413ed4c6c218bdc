//! Simulated Matching Engine
//!
//! Accepts, modifies, and cancels orders synchronously against the request
//! stream and evaluates pending orders against each incoming bar with fixed
//! deterministic rules. A live broker adapter replaces this subscriber and
//! must emit the same response and outcome events.

pub mod sim;

#[cfg(test)]
mod sim_tests;

pub use sim::{SimBroker, SimBrokerConfig};
