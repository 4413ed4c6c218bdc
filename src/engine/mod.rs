//! Engine Core
//!
//! The event model, the exact-kind dispatch bus, and the per-subscriber
//! worker runtime. Everything else in the crate is a subscriber on this
//! foundation.

pub mod bus;
pub mod events;
pub mod subscriber;
pub mod time;

pub use bus::EventBus;
pub use events::{Event, EventKind};
pub use subscriber::{EventHandler, Subscriber};
pub use time::Nanos;
