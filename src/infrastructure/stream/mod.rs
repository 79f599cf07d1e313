//! Streaming infrastructure - channel-backed sinks

mod channel;

pub use channel::ChannelSink;
