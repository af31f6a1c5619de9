mod bridge;
mod sink;

pub use bridge::DatafeedBridge;
pub use sink::{ChartSink, LoadMoreHook};
