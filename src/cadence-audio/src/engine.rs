use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use thiserror::Error;

/// Audio playback errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("audio backend unavailable: {0}")]
    Backend(String),
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid session state: {0}")]
    InvalidState(String),
}

impl AudioError {
    /// Classification reported to the host when a load fails after it was accepted.
    pub fn native_code(&self) -> NativeErrorCode {
        match self {
            AudioError::Io(_) => NativeErrorCode::Io,
            AudioError::UnsupportedSource(_) => NativeErrorCode::Unsupported,
            AudioError::Decode(_) => NativeErrorCode::Malformed,
            AudioError::Backend(_) | AudioError::InvalidState(_) => NativeErrorCode::Unknown,
        }
    }
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Abstract media locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A URL with a scheme other than `file://`. Backends may support a subset.
    Url(String),
    /// A local file path.
    File(PathBuf),
}

impl MediaSource {
    pub fn parse(locator: &str) -> AudioResult<Self> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(AudioError::UnsupportedSource("empty locator".into()));
        }
        if let Some(path) = locator.strip_prefix("file://") {
            return Ok(MediaSource::File(PathBuf::from(path)));
        }
        if locator.contains("://") {
            return Ok(MediaSource::Url(locator.to_string()));
        }
        Ok(MediaSource::File(PathBuf::from(locator)))
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Url(url) => f.write_str(url),
            MediaSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Identifies one load. Every notification a session emits carries the token it was
/// opened with, which lets the owner recognise notifications from a replaced session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LoadToken(u64);

impl LoadToken {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Failure categories a native player reports while loading or playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeErrorCode {
    Io,
    ServerDied,
    NotValidForProgressivePlayback,
    Malformed,
    Unsupported,
    TimedOut,
    Unknown,
}

impl NativeErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NativeErrorCode::Io => "io",
            NativeErrorCode::ServerDied => "server_died",
            NativeErrorCode::NotValidForProgressivePlayback => "not_valid_for_progressive_playback",
            NativeErrorCode::Malformed => "malformed",
            NativeErrorCode::Unsupported => "unsupported",
            NativeErrorCode::TimedOut => "timed_out",
            NativeErrorCode::Unknown => "unknown",
        }
    }
}

/// Asynchronous state changes reported by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    Buffering { percent: u8 },
    /// Item is prepared; playback may start. Duration is `None` for live or unknown media.
    Ready { duration: Option<Duration> },
    DurationChanged(Duration),
    /// Playback reached the end of the media.
    Completed,
    Failed {
        code: NativeErrorCode,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeNotification {
    pub token: LoadToken,
    pub event: NativeEvent,
}

pub type NotificationCallback = Arc<dyn Fn(NativeNotification) + Send + Sync>;

/// Handed to a backend on `open`; stamps everything it forwards with the load token.
/// May be called from any thread.
#[derive(Clone)]
pub struct Notifier {
    token: LoadToken,
    callback: NotificationCallback,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(token: LoadToken, callback: NotificationCallback) -> Self {
        Self { token, callback }
    }

    pub fn token(&self) -> LoadToken {
        self.token
    }

    pub fn notify(&self, event: NativeEvent) {
        (self.callback)(NativeNotification {
            token: self.token,
            event,
        });
    }

    pub fn buffering(&self, percent: u8) {
        self.notify(NativeEvent::Buffering {
            percent: percent.min(100),
        });
    }

    pub fn ready(&self, duration: Option<Duration>) {
        self.notify(NativeEvent::Ready { duration });
    }

    pub fn completed(&self) {
        self.notify(NativeEvent::Completed);
    }

    pub fn failed(&self, code: NativeErrorCode, message: impl Into<String>) {
        self.notify(NativeEvent::Failed {
            code,
            message: message.into(),
        });
    }
}

/// One native player bound to one media item.
///
/// Loading starts on [`MediaBackend::open`] and completes asynchronously with a
/// `Ready` or `Failed` notification. Control calls are fire-and-forget; none of them
/// waits on media I/O.
pub trait MediaSession: Send {
    fn play(&mut self) -> AudioResult<()>;
    fn pause(&mut self) -> AudioResult<()>;
    /// Halt playback and rewind to the start. The item stays loaded.
    fn stop(&mut self) -> AudioResult<()>;
    fn seek(&mut self, position: Duration) -> AudioResult<()>;
    /// Current playback position, `None` while the item is still loading.
    fn position(&self) -> Option<Duration>;
    /// Tear down the player and its item. No notification is emitted afterwards.
    fn release(self: Box<Self>) -> AudioResult<()>;
}

/// Audio backend interface.
pub trait MediaBackend: Send + Sync {
    /// Resolve `source` and start loading it without starting playback.
    ///
    /// Errors returned here mean the locator could not be resolved at all; failures
    /// discovered while loading arrive later through `notifier`.
    fn open(&self, source: &MediaSource, notifier: Notifier)
        -> AudioResult<Box<dyn MediaSession>>;
}

impl<B: MediaBackend + ?Sized> MediaBackend for Arc<B> {
    fn open(
        &self,
        source: &MediaSource,
        notifier: Notifier,
    ) -> AudioResult<Box<dyn MediaSession>> {
        (**self).open(source, notifier)
    }
}
