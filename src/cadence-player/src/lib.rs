mod adapter;
mod events;
mod registry;
mod task;

pub use adapter::{PlayerAdapter, PlayerState, DURATION_UNKNOWN};
pub use events::{ChannelSink, ErrorCode, EventSink, PlayerEvent, RecordingSink, TaggedEvent};
pub use registry::PlayerRegistry;
pub use task::{Command, PlayerError, PlayerHandle, PlayerResult};
