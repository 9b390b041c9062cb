mod settings;

pub use settings::{LogFormat, LoggingConfig, RealtimeConfig, SessionConfig, Settings};
