//! voice-wake-daemon: hands-free wake word and session controller
//!
//! This daemon keeps a speech recognizer listening for a wake phrase and
//! provides:
//! - Passive wake phrase detection with layered recovery
//! - An explicit Idle / Listening / Thinking / Speaking session machine
//! - An event bus coupling the two and any UI observers
//! - IPC for status queries, mute toggling and event subscription
//!
//! Without a device the recognizer reads lines from stdin and speech,
//! haptics and navigation go to the log.

mod capability;
mod config;
mod events;
mod ipc;
mod lifecycle;
mod runtime;
mod state;
mod timer;
mod wake;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::capability::console::{ConsoleRecognizer, ConsoleRouter, LogHaptics, LogSpeaker};
use crate::config::Config;
use crate::events::{AssistantEvent, EventKind};
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::runtime::{Capabilities, InputChannel, VoiceAssistant};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voice-wake-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, phrases = ?config.wake_phrases, "configuration loaded");

    // Create shutdown signal handler
    let mut shutdown = ShutdownSignal::new()?;

    // Recognizer callbacks feed the controller's input queue
    let channel = InputChannel::new();
    let recognizer = Arc::new(ConsoleRecognizer::new(channel.callbacks()));
    let console_input = recognizer.feed(BufReader::new(tokio::io::stdin()));

    let socket_path = config.socket_path.clone();
    let mut assistant = VoiceAssistant::new(
        config,
        Capabilities {
            recognizer,
            tts: Arc::new(LogSpeaker::default()),
            haptics: Arc::new(LogHaptics),
            router: Arc::new(ConsoleRouter),
        },
        channel,
    );

    // Controller -> IPC server (UI-facing events for subscribed clients)
    let (event_tx, _event_rx) = broadcast::channel::<AssistantEvent>(64);
    let ui_events = event_tx.clone();
    let ui_kinds: Vec<EventKind> = EventKind::ALL
        .into_iter()
        .filter(|kind| kind.is_ui_facing())
        .collect();
    let bus = assistant.bus();
    bus.on_each(&ui_kinds, move |event| {
        debug!(%event, "ui event");
        // No subscribers is fine
        let _ = ui_events.send(event.clone());
    });
    // There is no screen to open in console mode
    bus.on(EventKind::Navigate, |event| info!(%event, "navigation requested"));

    // Create IPC server
    let handle = assistant.handle();
    let server = Server::new(&socket_path, handle.clone(), event_tx)?;

    // Run the controller (recognizer callbacks, timers, bus events)
    let mut controller = tokio::spawn(async move {
        assistant.run().await;
        assistant.shutdown().await;
    });

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        _ = &mut controller => {
            info!("voice assistant exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    console_input.abort();
    // The controller releases the recognizer before its task ends
    if handle.shutdown().is_ok() {
        if let Err(e) = controller.await {
            error!(?e, "voice assistant task failed");
        }
    }
    server.shutdown().await;

    info!("voice-wake-daemon stopped");

    Ok(())
}
