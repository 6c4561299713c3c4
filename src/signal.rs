//! Signal domain: typed host signals, the in-process bus, and the adapter that
//! turns raw host output into signals.

pub mod adapter;
pub mod bus;
pub mod events;

pub use adapter::LogLineAdapter;
pub use bus::{SignalBus, SignalReceiver};
pub use events::{Signal, SignalEnvelope};
