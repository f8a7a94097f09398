use crate::config::Config;
use crate::local::LocalClient;
use anyhow::{Result, bail};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use http_relay_common::{
    RequestEnvelope, ResponseEnvelope, TunnelError,
    constants::{PING_FRAME, TUNNEL_OUTBOUND_BUFFER},
    is_pong,
};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message as WsMessage,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use tracing::{debug, error, info, warn};

type WebSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection state tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected {
        connected_at: Instant,
    },
    Reconnecting {
        attempt: usize,
        next_delay: Duration,
    },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

/// Daemon side of the tunnel: keeps one outbound connection to the gateway
/// open, serves request envelopes from the local service and reconnects with
/// exponential backoff when the connection drops.
pub struct TunnelEndpoint {
    config: Config,
    local: LocalClient,
    state_tx: watch::Sender<ConnectionState>,
}

impl TunnelEndpoint {
    pub fn new(config: Config) -> Result<Self> {
        let local = LocalClient::new(config.local_address.clone(), config.request_timeout)?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            config,
            local,
            state_tx,
        })
    }

    /// Subscribe to connection state changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Main run loop with automatic reconnection
    ///
    /// Only returns once `max_attempts` consecutive connection attempts fail.
    /// A connection that was established and later dropped resets the count.
    pub async fn run(&self) -> Result<()> {
        let reconnect = &self.config.reconnect_config;
        let mut reconnect_delay = reconnect.min_delay;
        let mut attempt = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            match self.establish_connection().await {
                Ok(ws_stream) => {
                    info!("Tunnel established: {}", self.config.websocket_url);

                    // Handle the connection until it drops
                    self.handle_connection(ws_stream).await;

                    reconnect_delay = reconnect.min_delay;
                    attempt = 0;
                }
                Err(e) => {
                    error!("Failed to connect: {}", e);

                    attempt += 1;
                    if reconnect.is_exhausted(attempt) {
                        self.set_state(ConnectionState::Disconnected);
                        bail!("Giving up after {} failed connection attempts", attempt);
                    }
                }
            }

            // Reconnection backoff

            self.set_state(ConnectionState::Reconnecting {
                attempt,
                next_delay: reconnect_delay,
            });

            info!(
                "Reconnecting in {:?} (attempt {})",
                reconnect_delay, attempt
            );
            tokio::time::sleep(reconnect_delay).await;

            reconnect_delay = reconnect.next_delay(reconnect_delay);
        }
    }

    /// Open the WebSocket with the bearer credential
    async fn establish_connection(&self) -> Result<WebSocket, TunnelError> {
        debug!("Connecting to {}", self.config.websocket_url);

        let mut request = self
            .config
            .websocket_url
            .as_str()
            .into_client_request()
            .map_err(|e| TunnelError::ConnectionError(format!("Invalid URL: {}", e)))?;

        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.token))
                .map_err(|e| TunnelError::ConnectionError(format!("Invalid token: {}", e)))?,
        );

        let (ws_stream, _) = tokio::time::timeout(self.config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| TunnelError::ConnectionError("Connection handshake timeout".to_string()))?
            .map_err(|e| TunnelError::ConnectionError(e.to_string()))?;

        self.set_state(ConnectionState::Connected {
            connected_at: Instant::now(),
        });

        Ok(ws_stream)
    }

    /// Handle active WebSocket connection with split read/write tasks
    async fn handle_connection(&self, ws_stream: WebSocket) {
        let (write, read) = ws_stream.split();

        // Create channels for internal communication
        let (outgoing_tx, outgoing_rx) = mpsc::channel(TUNNEL_OUTBOUND_BUFFER);

        // Spawn concurrent tasks
        let mut write_handle = tokio::spawn(spawn_write_task(write, outgoing_rx));

        let mut read_handle = tokio::spawn(spawn_read_task(
            read,
            outgoing_tx.clone(),
            self.local.clone(),
            self.config.heartbeat_timeout,
        ));

        let mut heartbeat_handle = tokio::spawn(spawn_heartbeat_task(
            outgoing_tx,
            self.config.heartbeat_interval,
        ));

        // Wait for any task to complete (usually means connection dropped)
        tokio::select! {
            result = &mut write_handle => {
                warn!("Write task ended: {:?}", result);
            }
            result = &mut read_handle => {
                warn!("Read task ended: {:?}", result);
            }
            result = &mut heartbeat_handle => {
                warn!("Heartbeat task ended: {:?}", result);
            }
        }

        write_handle.abort();
        read_handle.abort();
        heartbeat_handle.abort();

        self.set_state(ConnectionState::Disconnected);
    }
}

/// Write task sends outgoing messages through WebSocket
async fn spawn_write_task(
    mut write: SplitSink<WebSocket, WsMessage>,
    mut outgoing_rx: mpsc::Receiver<WsMessage>,
) {
    while let Some(message) = outgoing_rx.recv().await {
        if let Err(e) = write.send(message).await {
            error!("Failed to send message: {}", e);
            break;
        }
    }

    debug!("Write task exiting");
}

/// Read task receives incoming messages and dispatches them
///
/// The gateway answers every heartbeat, so a connection that stays silent for
/// `heartbeat_timeout` is dead and the task ends.
async fn spawn_read_task(
    mut read: SplitStream<WebSocket>,
    outgoing_tx: mpsc::Sender<WsMessage>,
    local: LocalClient,
    heartbeat_timeout: Duration,
) {
    loop {
        let message = match tokio::time::timeout(heartbeat_timeout, read.next()).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(_) => {
                warn!("No frames from gateway for {:?}, dropping connection", heartbeat_timeout);
                break;
            }
        };

        match message {
            Ok(WsMessage::Text(text)) => {
                handle_text_message(text.as_str(), &outgoing_tx, &local);
            }
            Ok(WsMessage::Binary(_)) => {
                warn!("Received unexpected binary message");
            }
            Ok(WsMessage::Ping(data)) => {
                debug!("Received WebSocket ping");
                if let Err(e) = outgoing_tx.send(WsMessage::Pong(data)).await {
                    error!("Failed to send pong: {}", e);
                    break;
                }
            }
            Ok(WsMessage::Pong(_)) => {
                debug!("Received WebSocket pong");
            }
            Ok(WsMessage::Close(frame)) => {
                info!("Server closed connection: {:?}", frame);
                break;
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    debug!("Read task exiting");
}

/// Handle incoming text messages
fn handle_text_message(text: &str, outgoing_tx: &mpsc::Sender<WsMessage>, local: &LocalClient) {
    if is_pong(text) {
        debug!("Received pong");
        return;
    }

    let request = match RequestEnvelope::from_frame(text) {
        Ok(request) => request,
        Err(e) => {
            warn!("Ignoring frame: {}", e);
            return;
        }
    };

    debug!(call_id = %request.id, "Received HTTP request: {} {}", request.method, request.path);

    // Spawn a new task to handle this request concurrently
    let local = local.clone();
    let outgoing_tx = outgoing_tx.clone();

    tokio::spawn(async move {
        let response = local.deliver(request).await;
        if let Err(e) = send_response(&outgoing_tx, &response).await {
            error!(call_id = %response.id, "Failed to send response: {}", e);
        }
    });
}

async fn send_response(
    outgoing_tx: &mpsc::Sender<WsMessage>,
    response: &ResponseEnvelope,
) -> Result<(), TunnelError> {
    let frame = response.to_frame()?;
    outgoing_tx
        .send(WsMessage::Text(frame.into()))
        .await
        .map_err(|e| TunnelError::WebSocketError(e.to_string()))
}

/// Heartbeat task sends periodic ping frames
async fn spawn_heartbeat_task(outgoing_tx: mpsc::Sender<WsMessage>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if let Err(e) = outgoing_tx.send(WsMessage::Text(PING_FRAME.into())).await {
            error!("Failed to send heartbeat: {}", e);
            break;
        }

        debug!("Sent heartbeat");
    }

    debug!("Heartbeat task exiting");
}
