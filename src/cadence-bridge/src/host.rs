//! Serves the method channel over a byte stream, typically stdin/stdout of a host process.

use std::io::Write;
use std::sync::Arc;

use cadence_audio::MediaBackend;
use cadence_core::PlayerSettings;
use cadence_player::PlayerRegistry;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::dispatcher::MethodDispatcher;
use crate::protocol::{MethodCall, MethodError, MethodResponse, MethodResult};
use crate::sink::JsonLineWriter;
use crate::BridgeError;

pub struct BridgeHost {
    dispatcher: MethodDispatcher,
    writer: JsonLineWriter,
}

impl BridgeHost {
    /// Build a host whose players report events on the same writer that carries responses.
    pub fn new<W: Write + Send + 'static>(
        writer: W,
        backend: Arc<dyn MediaBackend>,
        settings: PlayerSettings,
    ) -> Result<Self, BridgeError> {
        let writer = JsonLineWriter::spawn(writer)?;
        let registry = PlayerRegistry::new(Arc::new(writer.clone()), backend, settings);
        Ok(Self {
            dispatcher: MethodDispatcher::new(Arc::new(registry)),
            writer,
        })
    }

    pub fn dispatcher(&self) -> &MethodDispatcher {
        &self.dispatcher
    }

    /// Handle calls until `reader` reaches end of stream, then dispose every player.
    ///
    /// Calls are applied one at a time in arrival order, which keeps the per-player
    /// command order the host issued.
    pub async fn serve<R: AsyncBufRead + Unpin>(&self, reader: R) -> Result<(), BridgeError> {
        let mut lines = reader.lines();
        let outcome = self.serve_lines(&mut lines).await;
        self.dispatcher.registry().shutdown_all().await;
        let flushed = self.writer.flush().await;
        tracing::info!("bridge stopped");
        outcome.and(flushed)
    }

    async fn serve_lines<R: AsyncBufRead + Unpin>(
        &self,
        lines: &mut tokio::io::Lines<R>,
    ) -> Result<(), BridgeError> {
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<MethodCall>(line) {
                Ok(call) => {
                    tracing::debug!(id = call.id, method = %call.method, uid = ?call.uid, "method call");
                    self.dispatcher.dispatch(call).await
                }
                Err(err) => {
                    let err = BridgeError::Parse(err);
                    tracing::warn!(%err, "rejecting malformed line");
                    MethodResponse {
                        id: recover_id(line),
                        result: MethodResult::Error(MethodError::from(&err)),
                    }
                }
            };
            self.writer.write_message(&response)?;
        }
        Ok(())
    }
}

/// Best-effort id of a call that failed to decode, `0` when there is none.
fn recover_id(line: &str) -> u64 {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|value| value.get("id").and_then(Value::as_u64))
        .unwrap_or(0)
}
