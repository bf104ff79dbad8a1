//! Ports: the seams between the engine and its hosts.

pub mod event_sink;

pub use event_sink::{EventSink, EventSinkError};
