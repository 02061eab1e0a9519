//! Runs one adapter on its own task so host commands and native notifications are
//! applied strictly one after another.

use std::sync::Arc;
use std::time::Duration;

use cadence_audio::{MediaBackend, NativeNotification};
use cadence_core::PlayerSettings;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::adapter::PlayerAdapter;
use crate::events::EventSink;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player {uid} has shut down")]
    Closed { uid: String },
}

pub type PlayerResult<T> = Result<T, PlayerError>;

/// Commands accepted by a player task.
#[derive(Debug)]
pub enum Command {
    /// `interval_ms` overrides the position report interval; `Some(0)` disables it.
    Preload {
        source: String,
        interval_ms: Option<u64>,
    },
    Play {
        source: String,
        interval_ms: Option<u64>,
    },
    Pause,
    Stop {
        completed: bool,
    },
    /// Position in seconds.
    Seek {
        position: f64,
    },
    Release,
    Duration {
        respond_to: oneshot::Sender<i64>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

#[derive(Debug)]
enum Envelope {
    Command(Command),
    Native(NativeNotification),
}

/// Cheap, cloneable handle to a running player task.
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    uid: Arc<str>,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl PlayerHandle {
    /// Spawn the task on the current tokio runtime.
    pub fn spawn(
        uid: impl Into<String>,
        sink: Arc<dyn EventSink>,
        backend: Arc<dyn MediaBackend>,
        settings: &PlayerSettings,
    ) -> Self {
        let uid: String = uid.into();
        let (tx, rx) = mpsc::unbounded_channel();

        // Weak so the task ends once every handle is gone.
        let weak = tx.downgrade();
        let adapter = PlayerAdapter::new(
            uid.clone(),
            sink,
            backend,
            Arc::new(move |notification| {
                if let Some(tx) = weak.upgrade() {
                    let _ = tx.send(Envelope::Native(notification));
                }
            }),
        )
        .with_buffering_forwarded(settings.forward_buffering);

        tokio::spawn(run(adapter, rx, settings.position_interval()));
        tracing::debug!(uid = %uid, "player task started");

        Self {
            uid: uid.into(),
            tx,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn send(&self, command: Command) -> PlayerResult<()> {
        self.tx
            .send(Envelope::Command(command))
            .map_err(|_| PlayerError::Closed {
                uid: self.uid.to_string(),
            })
    }

    pub fn preload(&self, source: impl Into<String>, interval_ms: Option<u64>) -> PlayerResult<()> {
        self.send(Command::Preload {
            source: source.into(),
            interval_ms,
        })
    }

    pub fn play(&self, source: impl Into<String>, interval_ms: Option<u64>) -> PlayerResult<()> {
        self.send(Command::Play {
            source: source.into(),
            interval_ms,
        })
    }

    pub fn pause(&self) -> PlayerResult<()> {
        self.send(Command::Pause)
    }

    pub fn stop(&self, completed: bool) -> PlayerResult<()> {
        self.send(Command::Stop { completed })
    }

    pub fn seek(&self, position: f64) -> PlayerResult<()> {
        self.send(Command::Seek { position })
    }

    pub fn release_player(&self) -> PlayerResult<()> {
        self.send(Command::Release)
    }

    /// Duration in milliseconds, `-1` when unknown. Answered after every command sent
    /// before it has been applied.
    pub async fn player_duration_ms(&self) -> PlayerResult<i64> {
        let (respond_to, rx) = oneshot::channel();
        self.send(Command::Duration { respond_to })?;
        rx.await.map_err(|_| PlayerError::Closed {
            uid: self.uid.to_string(),
        })
    }

    /// Stop the task and release its native resources.
    pub async fn shutdown(&self) -> PlayerResult<()> {
        let (respond_to, rx) = oneshot::channel();
        self.send(Command::Shutdown { respond_to })?;
        rx.await.map_err(|_| PlayerError::Closed {
            uid: self.uid.to_string(),
        })
    }
}

fn position_ticker(period: Option<Duration>) -> Option<Interval> {
    period.map(|period| {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    })
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run(
    mut adapter: PlayerAdapter,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    default_interval: Option<Duration>,
) {
    let mut ticker = position_ticker(default_interval);
    let mut shutdown_ack = None;

    loop {
        tokio::select! {
            envelope = rx.recv() => match envelope {
                Some(Envelope::Command(command)) => {
                    if let Command::Play { interval_ms: Some(ms), .. }
                    | Command::Preload { interval_ms: Some(ms), .. } = &command
                    {
                        ticker = position_ticker((*ms > 0).then(|| Duration::from_millis(*ms)));
                    }
                    if let Some(respond_to) = apply(&mut adapter, command) {
                        shutdown_ack = Some(respond_to);
                        break;
                    }
                }
                Some(Envelope::Native(notification)) => adapter.handle_notification(notification),
                None => break,
            },
            _ = next_tick(&mut ticker), if adapter.is_playing() => adapter.report_position(),
        }
    }

    // Refuse further commands before acknowledging, so a shut-down handle reports closed.
    drop(rx);
    adapter.release_player();
    tracing::debug!(uid = %adapter.uid(), "player task stopped");
    if let Some(ack) = shutdown_ack {
        let _ = ack.send(());
    }
}

/// Returns the shutdown acknowledgement when the command ends the task.
fn apply(adapter: &mut PlayerAdapter, command: Command) -> Option<oneshot::Sender<()>> {
    tracing::debug!(uid = %adapter.uid(), ?command, "command");
    match command {
        Command::Preload { source, .. } => adapter.preload(&source),
        Command::Play { source, .. } => adapter.play(&source),
        Command::Pause => adapter.pause(),
        Command::Stop { completed } => adapter.stop(completed),
        Command::Seek { position } => adapter.seek(position),
        Command::Release => adapter.release_player(),
        Command::Duration { respond_to } => {
            let _ = respond_to.send(adapter.player_duration_ms());
        }
        Command::Shutdown { respond_to } => return Some(respond_to),
    }
    None
}
