//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! UI-facing assistant events to subscribed clients.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::AsyncRead;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::AssistantEvent;
use crate::runtime::AssistantHandle;

use super::protocol::{read_frame, write_frame, DaemonStatus, Notification, Request, Response};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    assistant: AssistantHandle,
    events: broadcast::Sender<AssistantEvent>,
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

/// What a client connection needs from the server
#[derive(Clone)]
struct Session {
    assistant: AssistantHandle,
    events: broadcast::Sender<AssistantEvent>,
    start_time: Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        assistant: AssistantHandle,
        events: broadcast::Sender<AssistantEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            assistant,
            events,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let session = Session {
            assistant: self.assistant.clone(),
            events: self.events.clone(),
            start_time: self.start_time,
        };

        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let session = session.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, session) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection
async fn handle_client(stream: UnixStream, session: Session) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let (request_tx, mut requests) = mpsc::channel(16);
    let reader_task = tokio::spawn(read_requests(reader, request_tx));

    let mut subscription: Option<broadcast::Receiver<AssistantEvent>> = None;

    let result: Result<()> = loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else {
                    debug!("client disconnected");
                    break Ok(());
                };

                let response = match request {
                    Ok(Request::Subscribe) => {
                        if subscription.is_none() {
                            subscription = Some(session.events.subscribe());
                            debug!("client subscribed to notifications");
                        }
                        Response::Subscribed
                    }
                    Ok(request) => {
                        debug!(?request, "received request");
                        process_request(request, &session).await
                    }
                    Err(message) => Response::error("bad_request", message),
                };

                if let Err(e) = write_frame(&mut writer, &response).await {
                    break Err(e.into());
                }
            }

            event = next_event(&mut subscription) => {
                match event {
                    Ok(event) => {
                        if let Err(e) = write_frame(&mut writer, &Notification::Event(event)).await {
                            break Err(e.into());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        subscription = None;
                    }
                }
            }
        }
    };

    reader_task.abort();
    result
}

/// Parse frames off the socket. Malformed JSON is reported back to the
/// client; a broken or oversized frame ends the connection.
async fn read_requests<R>(mut reader: R, requests: mpsc::Sender<Result<Request, String>>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let body = match read_frame(&mut reader).await {
            Ok(Some(body)) => body,
            Ok(None) => return,
            Err(e) => {
                warn!(%e, "dropping client");
                return;
            }
        };

        let request = serde_json::from_slice::<Request>(&body).map_err(|e| e.to_string());
        if requests.send(request).await.is_err() {
            return;
        }
    }
}

async fn next_event(
    subscription: &mut Option<broadcast::Receiver<AssistantEvent>>,
) -> Result<AssistantEvent, broadcast::error::RecvError> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Process a request and return a response
async fn process_request(request: Request, session: &Session) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::GetStatus => match session.assistant.status().await {
            Ok(assistant) => Response::Status(DaemonStatus {
                assistant,
                uptime_secs: session.start_time.elapsed().as_secs(),
                ..DaemonStatus::default()
            }),
            Err(e) => Response::error("unavailable", e.to_string()),
        },

        Request::ToggleMute => match session.assistant.toggle_mute().await {
            Ok(muted) => {
                info!(muted, "mute toggled via IPC");
                Response::MuteChanged { muted }
            }
            Err(e) => Response::error("unavailable", e.to_string()),
        },

        Request::Subscribe => Response::Subscribed,
    }
}
