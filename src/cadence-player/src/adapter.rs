use std::sync::Arc;
use std::time::Duration;

use cadence_audio::{
    LoadToken, MediaBackend, MediaSession, MediaSource, NativeEvent, NativeNotification,
    NotificationCallback, Notifier,
};

use crate::events::{ErrorCode, EventSink, PlayerEvent, TaggedEvent};

/// Reported by [`PlayerAdapter::player_duration_ms`] when no duration is known.
pub const DURATION_UNKNOWN: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Empty,
    /// A session is loading; `play_when_ready` is set when `play` asked for it.
    Preparing {
        play_when_ready: bool,
    },
    Ready,
    Playing,
    Paused,
    Stopped,
    Failed,
}

/// Binds one native session to one identifier.
///
/// Commands and native notifications must be delivered from a single context, one at a
/// time; [`crate::PlayerHandle`] does that with a task queue. Every event the adapter
/// raises is tagged with its identifier.
pub struct PlayerAdapter {
    uid: String,
    sink: Arc<dyn EventSink>,
    backend: Arc<dyn MediaBackend>,
    notifications: NotificationCallback,
    forward_buffering: bool,
    state: PlayerState,
    current_source: Option<String>,
    session: Option<Box<dyn MediaSession>>,
    is_preloaded: bool,
    token: LoadToken,
    duration: Option<Duration>,
}

impl std::fmt::Debug for PlayerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerAdapter")
            .field("uid", &self.uid)
            .field("state", &self.state)
            .field("current_source", &self.current_source)
            .field("is_preloaded", &self.is_preloaded)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl PlayerAdapter {
    /// `notifications` receives everything the native sessions report; the owner must
    /// route it back into [`PlayerAdapter::handle_notification`].
    pub fn new(
        uid: impl Into<String>,
        sink: Arc<dyn EventSink>,
        backend: Arc<dyn MediaBackend>,
        notifications: NotificationCallback,
    ) -> Self {
        Self {
            uid: uid.into(),
            sink,
            backend,
            notifications,
            forward_buffering: false,
            state: PlayerState::Empty,
            current_source: None,
            session: None,
            is_preloaded: false,
            token: LoadToken::default(),
            duration: None,
        }
    }

    pub fn with_buffering_forwarded(mut self, forward: bool) -> Self {
        self.forward_buffering = forward;
        self
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn current_source(&self) -> Option<&str> {
        self.current_source.as_deref()
    }

    pub fn is_preloaded(&self) -> bool {
        self.is_preloaded
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    /// Prepare `source` without starting it. Silent unless the source cannot be opened.
    pub fn preload(&mut self, source: &str) {
        if self.is_preloaded && self.current_source.as_deref() == Some(source) {
            tracing::debug!(uid = %self.uid, source, "already preloaded");
            return;
        }
        self.load(source, false);
    }

    /// Start `source`, reusing the live session when it already holds that source.
    pub fn play(&mut self, source: &str) {
        if self.current_source.as_deref() == Some(source) {
            match self.state {
                PlayerState::Playing | PlayerState::Preparing { play_when_ready: true } => {
                    tracing::debug!(uid = %self.uid, source, "play ignored, already started");
                    return;
                }
                PlayerState::Preparing {
                    play_when_ready: false,
                } => {
                    self.is_preloaded = false;
                    self.state = PlayerState::Preparing {
                        play_when_ready: true,
                    };
                    return;
                }
                PlayerState::Ready | PlayerState::Paused | PlayerState::Stopped => {
                    self.is_preloaded = false;
                    self.start_playback();
                    return;
                }
                PlayerState::Empty | PlayerState::Failed => {}
            }
        }
        self.load(source, true);
    }

    pub fn pause(&mut self) {
        match self.state {
            PlayerState::Playing => {
                if let Some(session) = self.session.as_mut() {
                    if let Err(err) = session.pause() {
                        tracing::warn!(uid = %self.uid, %err, "native pause failed");
                    }
                }
                self.state = PlayerState::Paused;
                self.emit(PlayerEvent::Paused);
            }
            PlayerState::Preparing {
                play_when_ready: true,
            } => {
                self.state = PlayerState::Preparing {
                    play_when_ready: false,
                };
                self.is_preloaded = true;
            }
            _ => tracing::debug!(uid = %self.uid, state = ?self.state, "pause ignored"),
        }
    }

    /// Halt and rewind. Always reports exactly one `Stopped` event.
    pub fn stop(&mut self, completed: bool) {
        match self.state {
            PlayerState::Playing
            | PlayerState::Paused
            | PlayerState::Ready
            | PlayerState::Stopped => {
                if let Some(session) = self.session.as_mut() {
                    if let Err(err) = session.stop() {
                        tracing::warn!(uid = %self.uid, %err, "native stop failed");
                    }
                }
                self.state = PlayerState::Stopped;
            }
            PlayerState::Preparing {
                play_when_ready: true,
            } => {
                self.state = PlayerState::Preparing {
                    play_when_ready: false,
                };
                self.is_preloaded = true;
            }
            PlayerState::Preparing {
                play_when_ready: false,
            }
            | PlayerState::Empty
            | PlayerState::Failed => {}
        }
        self.emit(PlayerEvent::Stopped { completed });
    }

    /// Move to `position` seconds, clamped to the known duration.
    pub fn seek(&mut self, position: f64) {
        if !position.is_finite() || position < 0.0 {
            self.emit(PlayerEvent::error(
                ErrorCode::InvalidArgument,
                format!("seek position must be a non-negative number of seconds, got {position}"),
            ));
            return;
        }
        let target = match (Duration::try_from_secs_f64(position), self.duration) {
            (Ok(target), Some(duration)) => target.min(duration),
            (Ok(target), None) => target,
            (Err(_), Some(duration)) => duration,
            (Err(_), None) => {
                self.emit(PlayerEvent::error(
                    ErrorCode::InvalidArgument,
                    format!("seek position {position} is out of range"),
                ));
                return;
            }
        };
        if matches!(self.state, PlayerState::Preparing { .. }) {
            self.emit(PlayerEvent::error(
                ErrorCode::InvalidState,
                "cannot seek while media is loading",
            ));
            return;
        }
        let Some(session) = self.session.as_mut() else {
            self.emit(PlayerEvent::error(
                ErrorCode::InvalidState,
                "cannot seek, no media loaded",
            ));
            return;
        };
        match session.seek(target) {
            Ok(()) => self.emit(PlayerEvent::Position { position: target }),
            Err(err) => {
                let code = ErrorCode::Native(err.native_code());
                self.emit(PlayerEvent::error(code, err.to_string()));
            }
        }
    }

    /// Release every native resource and return to the post-construction state.
    pub fn release_player(&mut self) {
        self.teardown();
        self.current_source = None;
        self.is_preloaded = false;
        self.state = PlayerState::Empty;
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Duration in whole milliseconds, or [`DURATION_UNKNOWN`].
    pub fn player_duration_ms(&self) -> i64 {
        self.duration
            .and_then(|d| i64::try_from(d.as_millis()).ok())
            .unwrap_or(DURATION_UNKNOWN)
    }

    pub fn position(&self) -> Option<Duration> {
        self.session.as_ref().and_then(|s| s.position())
    }

    /// Emit the current position if playing.
    pub fn report_position(&mut self) {
        if !self.is_playing() {
            return;
        }
        if let Some(position) = self.position() {
            self.emit(PlayerEvent::Position { position });
        }
    }

    pub fn handle_notification(&mut self, notification: NativeNotification) {
        if notification.token != self.token || self.session.is_none() {
            tracing::trace!(
                uid = %self.uid,
                token = %notification.token,
                current = %self.token,
                "dropping notification from superseded load"
            );
            return;
        }

        match notification.event {
            NativeEvent::Buffering { percent } => {
                if self.forward_buffering {
                    self.emit(PlayerEvent::Buffering { percent });
                }
            }
            NativeEvent::Ready { duration } => {
                self.duration = duration;
                match self.state {
                    PlayerState::Preparing {
                        play_when_ready: true,
                    } => self.start_playback(),
                    PlayerState::Preparing {
                        play_when_ready: false,
                    } => {
                        self.state = PlayerState::Ready;
                        if self.forward_buffering {
                            self.emit(PlayerEvent::Ready { duration });
                        }
                    }
                    _ => {}
                }
            }
            NativeEvent::DurationChanged(duration) => self.duration = Some(duration),
            NativeEvent::Completed => {
                if self.is_playing() {
                    self.stop(true);
                }
            }
            NativeEvent::Failed { code, message } => {
                tracing::warn!(uid = %self.uid, code = code.as_str(), %message, "native player failed");
                self.fail(ErrorCode::Native(code), message);
            }
        }
    }

    fn load(&mut self, source: &str, play_when_ready: bool) {
        self.teardown();
        self.current_source = Some(source.to_string());
        self.is_preloaded = false;

        let notifier = Notifier::new(self.token, self.notifications.clone());
        let opened = MediaSource::parse(source).and_then(|s| self.backend.open(&s, notifier));
        match opened {
            Ok(session) => {
                tracing::debug!(uid = %self.uid, source, token = %self.token, play_when_ready, "loading");
                self.session = Some(session);
                self.is_preloaded = !play_when_ready;
                self.state = PlayerState::Preparing { play_when_ready };
            }
            Err(err) => {
                tracing::error!(uid = %self.uid, source, %err, "invalid data source");
                self.state = PlayerState::Failed;
                self.emit(PlayerEvent::error(
                    ErrorCode::DataSource,
                    format!("Failed to play audio, invalid data source: {err}"),
                ));
            }
        }
    }

    fn start_playback(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.play() {
            Ok(()) => {
                self.state = PlayerState::Playing;
                self.emit(PlayerEvent::Started {
                    duration: self.duration,
                });
            }
            Err(err) => self.fail(ErrorCode::Native(err.native_code()), err.to_string()),
        }
    }

    fn fail(&mut self, code: ErrorCode, message: String) {
        self.teardown();
        self.is_preloaded = false;
        self.state = PlayerState::Failed;
        self.emit(PlayerEvent::error(code, message));
    }

    /// The only path that releases a session. Advancing the token turns anything the
    /// released session still has in flight into a stale notification.
    fn teardown(&mut self) {
        self.token = self.token.next();
        self.duration = None;
        if let Some(session) = self.session.take() {
            if let Err(err) = session.release() {
                tracing::warn!(uid = %self.uid, %err, "failed to release native session");
            }
        }
    }

    fn emit(&self, event: PlayerEvent) {
        tracing::trace!(uid = %self.uid, ?event, "emit");
        self.sink.emit(TaggedEvent {
            uid: self.uid.clone(),
            event,
        });
    }
}

impl Drop for PlayerAdapter {
    fn drop(&mut self) {
        self.teardown();
    }
}
