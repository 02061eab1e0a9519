mod engine;
#[cfg(feature = "cpal-backend")]
mod real;
mod simulated;

pub use engine::{
    AudioError, AudioResult, LoadToken, MediaBackend, MediaSession, MediaSource, NativeErrorCode,
    NativeEvent, NativeNotification, NotificationCallback, Notifier,
};
#[cfg(feature = "cpal-backend")]
pub use real::CpalBackend;
pub use simulated::SimulatedBackend;
