pub mod config;
pub mod logging;
pub mod paths;

pub use config::{
    BackendKind, Config, ConfigError, LogLevel, LoggingConfig, PlayerSettings, ValidationError,
};
pub use logging::{init_logging, LoggingError, LoggingGuard, LOG_ENV};
pub use paths::{AppDirs, DirsError};

pub const APP_NAME: &str = "cadence";
pub const APP_AUTHOR: &str = "Cadence";
pub const APP_QUALIFIER: &str = "io";
