use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    AudioError, AudioResult, MediaBackend, MediaSession, MediaSource, NativeEvent, Notifier,
};

/// Locators with this scheme fail resolution, which lets hosts exercise error paths.
const FAILING_SCHEME: &str = "fail://";

/// Backend that plays nothing but behaves like a native player: items take
/// `load_delay` to prepare and run for `duration` once started.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    load_delay: Duration,
    duration: Duration,
    tick: Duration,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::with_timing(Duration::from_millis(100), Duration::from_millis(1000))
    }
}

impl SimulatedBackend {
    pub fn with_timing(load_delay: Duration, duration: Duration) -> Self {
        Self {
            load_delay,
            duration,
            tick: Duration::from_millis(10),
        }
    }
}

impl MediaBackend for SimulatedBackend {
    fn open(
        &self,
        source: &MediaSource,
        notifier: Notifier,
    ) -> AudioResult<Box<dyn MediaSession>> {
        if let MediaSource::Url(url) = source {
            if url.starts_with(FAILING_SCHEME) {
                return Err(AudioError::UnsupportedSource(url.clone()));
            }
        }
        tracing::debug!(%source, token = %notifier.token(), "opening simulated session");
        Ok(Box::new(SimulatedSession::spawn(
            self.load_delay,
            self.duration,
            self.tick,
            notifier,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Loading { elapsed: Duration },
    Ready,
    Playing,
    Paused,
    Stopped,
    Finished,
}

#[derive(Debug)]
struct SimState {
    phase: Phase,
    position: Duration,
}

struct SimulatedSession {
    state: Arc<Mutex<SimState>>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    duration: Duration,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedSession {
    fn spawn(load_delay: Duration, duration: Duration, tick: Duration, notifier: Notifier) -> Self {
        let state = Arc::new(Mutex::new(SimState {
            phase: Phase::Loading {
                elapsed: Duration::ZERO,
            },
            position: Duration::ZERO,
        }));
        let shutdown = Arc::new(AtomicBool::new(false));
        let state_clone = state.clone();
        let shutdown_clone = shutdown.clone();

        let join = thread::spawn(move || {
            notifier.buffering(0);
            while !shutdown_clone.load(Ordering::SeqCst) {
                thread::sleep(tick);
                let event = {
                    let mut guard = lock(&state_clone);
                    advance(&mut guard, tick, load_delay, duration)
                };
                // A release racing this tick must not see a late notification.
                if shutdown_clone.load(Ordering::SeqCst) {
                    break;
                }
                if let Some(event) = event {
                    if matches!(event, NativeEvent::Ready { .. }) {
                        notifier.buffering(100);
                    }
                    notifier.notify(event);
                }
            }
        });

        Self {
            state,
            shutdown,
            join: Some(join),
            duration,
        }
    }

    fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn advance(
    state: &mut SimState,
    tick: Duration,
    load_delay: Duration,
    duration: Duration,
) -> Option<NativeEvent> {
    match state.phase {
        Phase::Loading { elapsed } => {
            let elapsed = elapsed + tick;
            if elapsed >= load_delay {
                state.phase = Phase::Ready;
                Some(NativeEvent::Ready {
                    duration: Some(duration),
                })
            } else {
                state.phase = Phase::Loading { elapsed };
                None
            }
        }
        Phase::Playing => {
            state.position = (state.position + tick).min(duration);
            if state.position >= duration {
                state.phase = Phase::Finished;
                Some(NativeEvent::Completed)
            } else {
                None
            }
        }
        Phase::Ready | Phase::Paused | Phase::Stopped | Phase::Finished => None,
    }
}

impl MediaSession for SimulatedSession {
    fn play(&mut self) -> AudioResult<()> {
        let mut guard = lock(&self.state);
        match guard.phase {
            Phase::Loading { .. } => Err(AudioError::InvalidState("item is still loading".into())),
            Phase::Finished => {
                guard.position = Duration::ZERO;
                guard.phase = Phase::Playing;
                Ok(())
            }
            _ => {
                guard.phase = Phase::Playing;
                Ok(())
            }
        }
    }

    fn pause(&mut self) -> AudioResult<()> {
        let mut guard = lock(&self.state);
        if guard.phase == Phase::Playing {
            guard.phase = Phase::Paused;
        }
        Ok(())
    }

    fn stop(&mut self) -> AudioResult<()> {
        let mut guard = lock(&self.state);
        if !matches!(guard.phase, Phase::Loading { .. }) {
            guard.phase = Phase::Stopped;
        }
        guard.position = Duration::ZERO;
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> AudioResult<()> {
        let mut guard = lock(&self.state);
        guard.position = position.min(self.duration);
        Ok(())
    }

    fn position(&self) -> Option<Duration> {
        let guard = lock(&self.state);
        match guard.phase {
            Phase::Loading { .. } => None,
            _ => Some(guard.position),
        }
    }

    fn release(mut self: Box<Self>) -> AudioResult<()> {
        self.shutdown();
        Ok(())
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LoadToken, NativeNotification};
    use std::sync::mpsc;

    fn notifier() -> (Notifier, mpsc::Receiver<NativeNotification>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let notifier = Notifier::new(
            LoadToken::new(1),
            Arc::new(move |n| {
                let _ = tx.lock().unwrap().send(n);
            }),
        );
        (notifier, rx)
    }

    fn wait_for(
        rx: &mpsc::Receiver<NativeNotification>,
        pred: impl Fn(&NativeEvent) -> bool,
    ) -> NativeEvent {
        loop {
            let n = rx
                .recv_timeout(Duration::from_secs(2))
                .expect("notification should arrive");
            if pred(&n.event) {
                return n.event;
            }
        }
    }

    #[test]
    fn session_becomes_ready_then_completes() {
        let backend =
            SimulatedBackend::with_timing(Duration::from_millis(30), Duration::from_millis(60));
        let (notifier, rx) = notifier();
        let mut session = backend
            .open(&MediaSource::parse("a.mp3").unwrap(), notifier)
            .expect("simulated backend should open");

        assert!(session.position().is_none());
        let ready = wait_for(&rx, |e| matches!(e, NativeEvent::Ready { .. }));
        assert_eq!(
            ready,
            NativeEvent::Ready {
                duration: Some(Duration::from_millis(60))
            }
        );

        session.play().unwrap();
        wait_for(&rx, |e| matches!(e, NativeEvent::Completed));
        assert_eq!(session.position(), Some(Duration::from_millis(60)));
        session.release().unwrap();
    }

    #[test]
    fn play_while_loading_is_rejected() {
        let backend =
            SimulatedBackend::with_timing(Duration::from_secs(5), Duration::from_secs(5));
        let (notifier, _rx) = notifier();
        let mut session = backend
            .open(&MediaSource::parse("a.mp3").unwrap(), notifier)
            .unwrap();
        assert!(matches!(session.play(), Err(AudioError::InvalidState(_))));
    }

    #[test]
    fn failing_scheme_is_unresolvable() {
        let backend = SimulatedBackend::default();
        let (notifier, _rx) = notifier();
        let result = backend.open(&MediaSource::parse("fail://nope").unwrap(), notifier);
        assert!(matches!(result, Err(AudioError::UnsupportedSource(_))));
    }

    #[test]
    fn seek_clamps_and_stop_rewinds() {
        let backend =
            SimulatedBackend::with_timing(Duration::from_millis(10), Duration::from_secs(3));
        let (notifier, rx) = notifier();
        let mut session = backend
            .open(&MediaSource::parse("a.mp3").unwrap(), notifier)
            .unwrap();
        wait_for(&rx, |e| matches!(e, NativeEvent::Ready { .. }));

        session.seek(Duration::from_secs(10)).unwrap();
        assert_eq!(session.position(), Some(Duration::from_secs(3)));
        session.stop().unwrap();
        assert_eq!(session.position(), Some(Duration::ZERO));
    }
}
