//! Messaging adapters.
//!
//! The live NATS event bus and broker monitor, the disabled broker
//! selected at boot when eventing is off, and an in-process bus for
//! local runs and tests.

pub mod in_memory;
pub mod nats;
pub mod noop;

pub use in_memory::InMemoryEventBus;
pub use nats::{NatsBrokerMonitor, NatsEventBus};
pub use noop::DisabledBroker;
