//! Identifier-keyed population of player tasks sharing one sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cadence_audio::MediaBackend;
use cadence_core::PlayerSettings;

use crate::events::EventSink;
use crate::task::PlayerHandle;

pub struct PlayerRegistry {
    players: Mutex<HashMap<String, PlayerHandle>>,
    sink: Arc<dyn EventSink>,
    backend: Arc<dyn MediaBackend>,
    settings: PlayerSettings,
}

impl std::fmt::Debug for PlayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerRegistry")
            .field("players", &self.identifiers())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PlayerRegistry {
    pub fn new(
        sink: Arc<dyn EventSink>,
        backend: Arc<dyn MediaBackend>,
        settings: PlayerSettings,
    ) -> Self {
        Self {
            players: Mutex::new(HashMap::new()),
            sink,
            backend,
            settings,
        }
    }

    fn players(&self) -> MutexGuard<'_, HashMap<String, PlayerHandle>> {
        self.players.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle for `uid`, spawning its player on first use. Must run inside a tokio runtime.
    pub fn get_or_create(&self, uid: &str) -> PlayerHandle {
        let mut players = self.players();
        if let Some(handle) = players.get(uid) {
            if !handle.is_closed() {
                return handle.clone();
            }
            tracing::warn!(uid, "player task had exited, replacing it");
        }
        let handle = PlayerHandle::spawn(
            uid,
            self.sink.clone(),
            self.backend.clone(),
            &self.settings,
        );
        players.insert(uid.to_string(), handle.clone());
        tracing::info!(uid, live = players.len(), "player created");
        handle
    }

    pub fn get(&self, uid: &str) -> Option<PlayerHandle> {
        self.players().get(uid).cloned()
    }

    /// Dispose of `uid`: its task stops and its native resources are released.
    /// Returns `false` when no such player exists.
    pub async fn remove(&self, uid: &str) -> bool {
        let Some(handle) = self.players().remove(uid) else {
            return false;
        };
        if let Err(err) = handle.shutdown().await {
            tracing::debug!(uid, %err, "player already stopped");
        }
        tracing::info!(uid, "player disposed");
        true
    }

    pub async fn shutdown_all(&self) {
        let handles: Vec<_> = self.players().drain().map(|(_, handle)| handle).collect();
        for handle in handles {
            let _ = handle.shutdown().await;
        }
    }

    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.players().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.players().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cadence_audio::SimulatedBackend;

    use super::*;
    use crate::events::{PlayerEvent, RecordingSink};

    fn registry(sink: Arc<RecordingSink>) -> PlayerRegistry {
        PlayerRegistry::new(
            sink,
            Arc::new(SimulatedBackend::with_timing(
                Duration::from_millis(10),
                Duration::from_secs(5),
            )),
            PlayerSettings {
                position_interval_ms: 0,
                ..PlayerSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn players_are_created_once_per_identifier() {
        let registry = registry(Arc::new(RecordingSink::new()));
        let first = registry.get_or_create("p1");
        let again = registry.get_or_create("p1");
        registry.get_or_create("p2");

        assert_eq!(first.uid(), again.uid());
        assert_eq!(registry.identifiers(), vec!["p1", "p2"]);
        assert!(registry.get("p3").is_none());
    }

    #[tokio::test]
    async fn events_are_tagged_per_player() {
        let sink = Arc::new(RecordingSink::new());
        let registry = registry(sink.clone());

        registry.get_or_create("p1").stop(false).unwrap();
        registry.get_or_create("p2").stop(true).unwrap();
        // Round trip through both queues so the stops are applied.
        registry.get_or_create("p1").player_duration_ms().await.unwrap();
        registry.get_or_create("p2").player_duration_ms().await.unwrap();

        let mut events: Vec<_> = sink
            .events()
            .into_iter()
            .map(|e| (e.uid, e.event))
            .collect();
        events.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            events,
            vec![
                ("p1".to_string(), PlayerEvent::Stopped { completed: false }),
                ("p2".to_string(), PlayerEvent::Stopped { completed: true }),
            ]
        );
    }

    #[tokio::test]
    async fn remove_disposes_player() {
        let registry = registry(Arc::new(RecordingSink::new()));
        let handle = registry.get_or_create("p1");
        handle.play("a.mp3", None).unwrap();

        assert!(registry.remove("p1").await);
        assert!(!registry.remove("p1").await);
        assert!(registry.is_empty());
        assert!(handle.is_closed());

        let fresh = registry.get_or_create("p1");
        assert_eq!(fresh.player_duration_ms().await.unwrap(), -1);
    }

    #[tokio::test]
    async fn shutdown_all_empties_registry() {
        let registry = registry(Arc::new(RecordingSink::new()));
        let handle = registry.get_or_create("p1");
        registry.get_or_create("p2");
        registry.shutdown_all().await;
        assert_eq!(registry.len(), 0);
        assert!(handle.is_closed());
    }
}
