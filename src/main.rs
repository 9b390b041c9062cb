use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;

use storefront_realtime::config::Settings;
use storefront_realtime::realtime::{
    ConnectionManager, EventName, InboundEvent, OutboundEvent, StateDispatcher,
};
use storefront_realtime::telemetry::init_telemetry;

/// Mirrors lifecycle events into the log as a stand-in for an application store
struct LoggingDispatcher;

impl StateDispatcher for LoggingDispatcher {
    fn dispatch(&self, event: &InboundEvent) {
        tracing::debug!(event = %event.name(), "Realtime state update");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("failed to load configuration")?;
    init_telemetry(&settings.logging)?;
    tracing::info!(url = %settings.realtime.url, "Configuration loaded");

    let token = settings
        .session
        .token
        .clone()
        .context("APP__SESSION__TOKEN must be set")?;

    let manager = ConnectionManager::from_config(&settings.realtime)?;
    manager.initialize(Some(Arc::new(LoggingDispatcher)));

    let handle = manager.connect(&token);

    // Rejoin after every (re)connect
    if let Some(conversation) = settings.session.conversation.clone() {
        let weak = Arc::downgrade(&handle);
        handle.on(
            EventName::Connect,
            Arc::new(move |_: &InboundEvent| {
                if let Some(handle) = weak.upgrade() {
                    handle.emit(OutboundEvent::join_conversation(conversation.clone()));
                }
            }),
        );
    }

    handle.on(
        EventName::Custom("new_message".to_string()),
        Arc::new(|event: &InboundEvent| {
            if let InboundEvent::Server { payload, .. } = event {
                tracing::info!(payload = %payload, "New message");
            }
        }),
    );

    shutdown_signal().await;

    manager.disconnect();
    tracing::info!(stats = ?manager.stats(), "Realtime client stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down");
        }
    }
}
