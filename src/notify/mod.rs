pub mod gate;
pub mod sink;

pub use gate::{GateOutcome, NotificationGate, LOOKUP_TIMEOUT};
pub use sink::{ChannelSink, FanoutSink, HistorySink, NotificationSink};
