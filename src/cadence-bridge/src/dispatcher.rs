//! Routes method calls to the player registered for their uid.

use std::sync::Arc;

use cadence_player::PlayerRegistry;
use serde_json::Value;

use crate::protocol::{MethodCall, MethodError, MethodResponse, MethodResult, PlayerMethod};
use crate::BridgeError;

#[derive(Debug, Clone)]
pub struct MethodDispatcher {
    registry: Arc<PlayerRegistry>,
}

impl MethodDispatcher {
    pub fn new(registry: Arc<PlayerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PlayerRegistry> {
        &self.registry
    }

    /// Apply `call` and build its response. Playback failures are not reported here;
    /// they reach the host as player events.
    pub async fn dispatch(&self, call: MethodCall) -> MethodResponse {
        let result = match self.handle(&call).await {
            Ok(Some(value)) => MethodResult::Success { value },
            Ok(None) => {
                tracing::debug!(method = %call.method, "method not implemented");
                MethodResult::NotImplemented
            }
            Err(err) => {
                tracing::warn!(id = call.id, method = %call.method, %err, "method call failed");
                MethodResult::Error(MethodError::from(&err))
            }
        };
        MethodResponse {
            id: call.id,
            result,
        }
    }

    async fn handle(&self, call: &MethodCall) -> Result<Option<Value>, BridgeError> {
        let Some(method) = PlayerMethod::from_call(call)? else {
            return Ok(None);
        };
        let uid = call
            .uid
            .as_deref()
            .ok_or_else(|| BridgeError::MissingUid {
                method: call.method.clone(),
            })?;

        let player = || self.registry.get_or_create(uid);
        match method {
            PlayerMethod::Play {
                url,
                position_interval,
            } => player().play(url, position_interval)?,
            PlayerMethod::Preload {
                url,
                position_interval,
            } => player().preload(url, position_interval)?,
            PlayerMethod::Pause => player().pause()?,
            PlayerMethod::Stop { completed } => player().stop(completed)?,
            PlayerMethod::Seek { position } => player().seek(position)?,
            PlayerMethod::Release => player().release_player()?,
            PlayerMethod::Duration => {
                let duration = player().player_duration_ms().await?;
                return Ok(Some(Value::from(duration)));
            }
            PlayerMethod::Dispose => {
                return Ok(Some(Value::Bool(self.registry.remove(uid).await)));
            }
        }
        Ok(Some(Value::Null))
    }
}
