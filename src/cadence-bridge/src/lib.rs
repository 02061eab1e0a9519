//! Method-channel bridge for Cadence players.
//!
//! This crate provides:
//! - A JSON-lines protocol for method calls, their responses and player events
//! - A dispatcher that routes each call to the player registered for its `uid`
//! - A host that serves the channel over any async byte stream
//!
//! # Channel Protocol
//!
//! Every message is one JSON object on its own line:
//! - the host sends [`MethodCall`] messages and receives one [`MethodResponse`] per call
//! - players push [`EventMessage`] messages, tagged with their `uid`, whenever their
//!   state changes
//!
//! ```text
//! -> {"id":1,"method":"player.preload","uid":"p1","args":{"url":"a.mp3"}}
//! <- {"id":1,"result":{"status":"success","value":null}}
//! -> {"id":2,"method":"player.play","uid":"p1","args":{"url":"a.mp3","positionInterval":200}}
//! <- {"id":2,"result":{"status":"success","value":null}}
//! <- {"method":"player.onPlay","uid":"p1","argument":184000}
//! <- {"method":"player.onCurrentPosition","uid":"p1","argument":200}
//! -> {"id":3,"method":"player.duration","uid":"p1"}
//! <- {"id":3,"result":{"status":"success","value":184000}}
//! ```
//!
//! Durations and positions in events are milliseconds; `player.seek` takes seconds.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cadence_bridge::BridgeHost;
//!
//! let host = BridgeHost::new(std::io::stdout(), backend, config.player.clone())?;
//! host.serve(tokio::io::BufReader::new(tokio::io::stdin())).await?;
//! ```

mod dispatcher;
mod error;
mod host;
pub mod protocol;
mod sink;

pub use dispatcher::MethodDispatcher;
pub use error::BridgeError;
pub use host::BridgeHost;
pub use protocol::{
    EventMessage, MethodCall, MethodError, MethodResponse, MethodResult, PlayerMethod,
    CHANNEL_NAME,
};
pub use sink::JsonLineWriter;
