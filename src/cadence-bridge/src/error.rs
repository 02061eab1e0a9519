use cadence_player::PlayerError;
use thiserror::Error;

/// Errors from decoding, dispatching or answering method calls.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to parse method call: {0}")]
    Parse(serde_json::Error),
    #[error("invalid arguments for {method}: {source}")]
    InvalidArguments {
        method: String,
        source: serde_json::Error,
    },
    #[error("{method} requires a uid")]
    MissingUid { method: String },
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error("failed to encode message: {0}")]
    Encode(serde_json::Error),
    #[error("channel io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("channel writer has stopped")]
    WriterClosed,
}

impl BridgeError {
    /// Stable code reported in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Parse(_) => "parse_error",
            BridgeError::InvalidArguments { .. } => "invalid_arguments",
            BridgeError::MissingUid { .. } => "missing_uid",
            BridgeError::Player(PlayerError::Closed { .. }) => "player_closed",
            BridgeError::Encode(_) | BridgeError::Io(_) | BridgeError::WriterClosed => "internal",
        }
    }
}
