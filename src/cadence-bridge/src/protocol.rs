//! Wire types for the `audio` method channel.
//!
//! Method calls, their responses and player events travel as one JSON object per line.

use std::time::Duration;

use cadence_player::{PlayerEvent, TaggedEvent};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::BridgeError;

/// Name hosts use to address this channel.
pub const CHANNEL_NAME: &str = "audio";

pub mod methods {
    pub const PLAY: &str = "player.play";
    pub const PRELOAD: &str = "player.preload";
    pub const PAUSE: &str = "player.pause";
    pub const STOP: &str = "player.stop";
    pub const SEEK: &str = "player.seek";
    pub const RELEASE: &str = "player.release";
    pub const DURATION: &str = "player.duration";
    pub const DISPOSE: &str = "player.dispose";
}

pub mod events {
    pub const BUFFERING: &str = "player.onBuffering";
    pub const READY: &str = "player.onReady";
    pub const PLAY: &str = "player.onPlay";
    pub const PAUSE: &str = "player.onPause";
    pub const STOP: &str = "player.onStop";
    pub const POSITION: &str = "player.onCurrentPosition";
    pub const ERROR: &str = "player.onError";
}

/// Request sent from the host to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Correlates the call with its [`MethodResponse`].
    pub id: u64,
    pub method: String,
    /// Identifier of the player the call targets.
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub args: Value,
}

/// Reply to exactly one [`MethodCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResponse {
    pub id: u64,
    pub result: MethodResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResult {
    Success {
        #[serde(default)]
        value: Value,
    },
    NotImplemented,
    Error(MethodError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodError {
    pub code: String,
    pub message: String,
}

/// Event pushed from a player to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub method: String,
    pub uid: String,
    pub argument: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadArgs {
    url: String,
    #[serde(default)]
    position_interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SeekArgs {
    position: f64,
}

#[derive(Debug, Default, Deserialize)]
struct StopArgs {
    #[serde(default)]
    completed: bool,
}

/// Typed form of the methods this bridge implements.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerMethod {
    Play {
        url: String,
        position_interval: Option<u64>,
    },
    Preload {
        url: String,
        position_interval: Option<u64>,
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
    Duration,
    Dispose,
}

impl PlayerMethod {
    /// `Ok(None)` for method names this bridge does not implement.
    pub fn from_call(call: &MethodCall) -> Result<Option<Self>, BridgeError> {
        let method = match call.method.as_str() {
            methods::PLAY => {
                let args: LoadArgs = parse_args(call)?;
                PlayerMethod::Play {
                    url: args.url,
                    position_interval: args.position_interval,
                }
            }
            methods::PRELOAD => {
                let args: LoadArgs = parse_args(call)?;
                PlayerMethod::Preload {
                    url: args.url,
                    position_interval: args.position_interval,
                }
            }
            methods::PAUSE => PlayerMethod::Pause,
            methods::STOP => {
                let args: StopArgs = if call.args.is_null() {
                    StopArgs::default()
                } else {
                    parse_args(call)?
                };
                PlayerMethod::Stop {
                    completed: args.completed,
                }
            }
            methods::SEEK => {
                let args: SeekArgs = parse_args(call)?;
                PlayerMethod::Seek {
                    position: args.position,
                }
            }
            methods::RELEASE => PlayerMethod::Release,
            methods::DURATION => PlayerMethod::Duration,
            methods::DISPOSE => PlayerMethod::Dispose,
            _ => return Ok(None),
        };
        Ok(Some(method))
    }
}

fn parse_args<T: DeserializeOwned>(call: &MethodCall) -> Result<T, BridgeError> {
    serde_json::from_value(call.args.clone()).map_err(|source| BridgeError::InvalidArguments {
        method: call.method.clone(),
        source,
    })
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn millis_or_unknown(duration: Option<Duration>) -> Value {
    match duration {
        Some(duration) => Value::from(millis(duration)),
        None => Value::from(cadence_player::DURATION_UNKNOWN),
    }
}

impl From<&TaggedEvent> for EventMessage {
    fn from(tagged: &TaggedEvent) -> Self {
        let (method, argument) = match &tagged.event {
            PlayerEvent::Buffering { percent } => (events::BUFFERING, Value::from(*percent)),
            PlayerEvent::Ready { duration } => (events::READY, millis_or_unknown(*duration)),
            PlayerEvent::Started { duration } => (events::PLAY, millis_or_unknown(*duration)),
            PlayerEvent::Paused => (events::PAUSE, Value::Null),
            PlayerEvent::Stopped { completed } => (events::STOP, Value::Bool(*completed)),
            PlayerEvent::Position { position } => (events::POSITION, Value::from(millis(*position))),
            PlayerEvent::Error { code, message } => (
                events::ERROR,
                serde_json::json!({ "code": code.as_str(), "message": message }),
            ),
        };
        Self {
            method: method.to_string(),
            uid: tagged.uid.clone(),
            argument,
        }
    }
}

impl From<&BridgeError> for MethodError {
    fn from(err: &BridgeError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_player::ErrorCode;

    fn call(method: &str, args: Value) -> MethodCall {
        MethodCall {
            id: 1,
            method: method.to_string(),
            uid: Some("p1".into()),
            args,
        }
    }

    #[test]
    fn call_deserializes_with_optional_fields() {
        let json = r#"{"id":4,"method":"player.pause","uid":"p1"}"#;
        let call: MethodCall = serde_json::from_str(json).unwrap();
        assert_eq!(call.id, 4);
        assert_eq!(call.uid.as_deref(), Some("p1"));
        assert!(call.args.is_null());
        assert_eq!(
            PlayerMethod::from_call(&call).unwrap(),
            Some(PlayerMethod::Pause)
        );
    }

    #[test]
    fn play_arguments_use_camel_case() {
        let parsed = PlayerMethod::from_call(&call(
            methods::PLAY,
            serde_json::json!({"url": "a.mp3", "positionInterval": 250}),
        ))
        .unwrap();
        assert_eq!(
            parsed,
            Some(PlayerMethod::Play {
                url: "a.mp3".into(),
                position_interval: Some(250)
            })
        );
    }

    #[test]
    fn missing_arguments_are_reported() {
        let err = PlayerMethod::from_call(&call(methods::SEEK, Value::Null)).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArguments { ref method, .. } if method == methods::SEEK));
    }

    #[test]
    fn unknown_methods_are_not_implemented() {
        let parsed = PlayerMethod::from_call(&call("player.setVolume", Value::Null)).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn response_serializes_with_status_tag() {
        let response = MethodResponse {
            id: 9,
            result: MethodResult::Success { value: Value::Null },
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"id":9,"result":{"status":"success","value":null}}"#);

        let not_implemented = serde_json::to_string(&MethodResult::NotImplemented).unwrap();
        assert_eq!(not_implemented, r#"{"status":"not_implemented"}"#);
    }

    #[test]
    fn events_map_to_channel_methods() {
        let stop = EventMessage::from(&TaggedEvent {
            uid: "p1".into(),
            event: PlayerEvent::Stopped { completed: true },
        });
        assert_eq!(stop.method, events::STOP);
        assert_eq!(stop.argument, Value::Bool(true));

        let started = EventMessage::from(&TaggedEvent {
            uid: "p1".into(),
            event: PlayerEvent::Started { duration: None },
        });
        assert_eq!(started.method, events::PLAY);
        assert_eq!(started.argument, Value::from(-1));

        let error = EventMessage::from(&TaggedEvent {
            uid: "p2".into(),
            event: PlayerEvent::error(ErrorCode::DataSource, "nope"),
        });
        assert_eq!(error.uid, "p2");
        assert_eq!(
            error.argument,
            serde_json::json!({"code": "datasource", "message": "nope"})
        );
    }
}
