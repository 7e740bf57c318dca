//! Channel hub and viewer fanout.

pub mod channels;
pub mod fanout;

pub use channels::{ChannelGroup, ChannelId, FrameReceiver, Hub};
pub use fanout::Fanout;
