//! Typed in-process event bus.
//!
//! One broadcast channel per event kind, a global sequence stamp so
//! subscribers can deduplicate on `(kind, seq)`, and overflow accounting
//! for slow subscribers on droppable channels.

pub mod bus;

pub use bus::{BusConfig, BusReceiver, BusStats, BusStatsSnapshot, EventBus, Sequenced};
