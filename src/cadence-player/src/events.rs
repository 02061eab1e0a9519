//! Outbound events and the sink they are delivered to.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cadence_audio::NativeErrorCode;
use tokio::sync::mpsc;

/// Why an adapter reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The locator could not be resolved or opened.
    DataSource,
    /// The command needs loaded media and there is none.
    InvalidState,
    /// The command argument is out of its domain.
    InvalidArgument,
    /// The native player failed while loading or playing.
    Native(NativeErrorCode),
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DataSource => "datasource",
            ErrorCode::InvalidState => "invalid_state",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Native(code) => code.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Buffering { percent: u8 },
    /// A preloaded item finished preparing.
    Ready { duration: Option<Duration> },
    Started { duration: Option<Duration> },
    Paused,
    /// `completed` separates end of media from a caller-requested stop.
    Stopped { completed: bool },
    Position { position: Duration },
    Error { code: ErrorCode, message: String },
}

impl PlayerEvent {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        PlayerEvent::Error {
            code,
            message: message.into(),
        }
    }
}

/// An event routed to the host, tagged with the identifier of the adapter that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub uid: String,
    pub event: PlayerEvent,
}

/// Outbound half of the channel shared by every adapter.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaggedEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: TaggedEvent) {
        (**self).emit(event)
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TaggedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaggedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<TaggedEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TaggedEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Forwards events into a tokio channel; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaggedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: TaggedEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}
