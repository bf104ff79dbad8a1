//! EventSink implementations.

pub mod channel_sink;
pub mod fn_sink;
pub mod tracing_sink;

pub use channel_sink::ChannelEventSink;
pub use fn_sink::FnEventSink;
pub use tracing_sink::TracingEventSink;
