// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Wire formats and transports
pub mod protocol;
pub mod transport;

// Connection management
pub mod realtime;
