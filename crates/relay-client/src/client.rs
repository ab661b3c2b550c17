use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use relay_core::{ClientEnvelope, ServerEnvelope};

use crate::errors::ClientError;
use crate::fsm::{ConnState, ReconnectAction, ReconnectFsm, TransportEvent, MAX_RECONNECT_ATTEMPTS};
use crate::session::SessionState;
use crate::transport::{Connector, SocketEvent, Transport};

pub struct ClientConfig {
    /// WebSocket endpoint of the chat server.
    pub url: String,
    pub max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".into(),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Point-in-time view of the client, published on every change.
#[derive(Clone, Debug)]
pub struct ClientSnapshot {
    pub conn_state: ConnState,
    pub session: SessionState,
}

enum Command {
    Join(String),
    Chat(String),
    Disconnect,
}

/// Handle to a client that owns one logical connection and reconnects on
/// its own. All state transitions happen on the driver task; the handle
/// only sends commands and reads snapshots.
pub struct ReconnectingClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ClientSnapshot>,
    _task: tokio::task::JoinHandle<()>,
}

impl ReconnectingClient {
    /// Spawn the driver; it starts connecting immediately.
    pub fn connect(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientSnapshot {
            conn_state: ConnState::Disconnected,
            session: SessionState::default(),
        });

        let driver = Driver {
            connector,
            url: config.url,
            fsm: ReconnectFsm::with_max_attempts(config.max_attempts),
            session: SessionState::default(),
            cmd_rx,
            state_tx,
        };

        Self {
            cmd_tx,
            state_rx,
            _task: tokio::spawn(driver.run()),
        }
    }

    pub fn state(&self) -> ClientSnapshot {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientSnapshot> {
        self.state_rx.clone()
    }

    /// Send the join envelope. Rejected unless currently connected.
    pub fn join(&self, username: &str) -> Result<(), ClientError> {
        if self.state_rx.borrow().conn_state != ConnState::Connected {
            warn!(username = %username, "join while not connected, ignoring");
            return Err(ClientError::NotConnected);
        }
        self.cmd_tx
            .send(Command::Join(username.to_owned()))
            .map_err(|_| ClientError::Stopped)
    }

    /// Send a chat message. Rejected unless currently connected.
    pub fn chat(&self, text: &str) -> Result<(), ClientError> {
        if self.state_rx.borrow().conn_state != ConnState::Connected {
            warn!("chat while not connected, ignoring");
            return Err(ClientError::NotConnected);
        }
        self.cmd_tx
            .send(Command::Chat(text.to_owned()))
            .map_err(|_| ClientError::Stopped)
    }

    /// Explicit user disconnect: cancels any pending reconnect, closes the
    /// transport, and resets the session. Safe to call in any state.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }
}

enum LinkOutcome {
    /// The socket dropped or never opened; the retry budget decides what's next.
    Dropped,
    /// The user asked to disconnect; no reconnect.
    Disconnected,
    /// The handle was dropped; stop the driver.
    Shutdown,
}

enum BackoffOutcome {
    Elapsed,
    Disconnected,
    Shutdown,
}

struct Driver {
    connector: Arc<dyn Connector>,
    url: String,
    fsm: ReconnectFsm,
    session: SessionState,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ClientSnapshot>,
}

impl Driver {
    fn publish(&self) {
        let _ = self.state_tx.send(ClientSnapshot {
            conn_state: self.fsm.state(),
            session: self.session.clone(),
        });
    }

    async fn run(mut self) {
        loop {
            self.fsm.begin_connect();
            self.publish();

            let connected = self.connector.connect(&self.url).await;
            let outcome = match connected {
                Ok(transport) => self.drive_link(transport).await,
                Err(err) => {
                    warn!(error = %err, "connect failed");
                    LinkOutcome::Dropped
                }
            };

            match outcome {
                LinkOutcome::Dropped => {
                    match self.fsm.handle_transport_event(TransportEvent::Closed) {
                        ReconnectAction::Retry { delay } => {
                            info!(
                                attempt = self.fsm.attempts(),
                                delay_secs = delay.as_secs(),
                                "scheduling reconnect"
                            );
                            self.publish();
                            match self.backoff(delay).await {
                                BackoffOutcome::Elapsed => continue,
                                BackoffOutcome::Disconnected => {
                                    self.idle().await;
                                    return;
                                }
                                BackoffOutcome::Shutdown => return,
                            }
                        }
                        ReconnectAction::GiveUp => {
                            warn!("max reconnect attempts reached, giving up");
                            self.publish();
                            self.idle().await;
                            return;
                        }
                        ReconnectAction::None => {
                            self.idle().await;
                            return;
                        }
                    }
                }
                LinkOutcome::Disconnected => {
                    self.idle().await;
                    return;
                }
                LinkOutcome::Shutdown => return,
            }
        }
    }

    /// Run one live connection until it drops or the user leaves.
    async fn drive_link(&mut self, transport: Transport) -> LinkOutcome {
        self.fsm.handle_transport_event(TransportEvent::Opened);
        self.session.connected = true;
        self.publish();
        info!("connected");

        let Transport {
            outbound,
            mut inbound,
        } = transport;

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Join(username)) => {
                        let frame = ClientEnvelope::Join { username: username.clone() }.encode();
                        if outbound.send(frame).await.is_err() {
                            warn!(username = %username, "join lost, socket closing");
                        } else {
                            self.session.username = Some(username);
                            self.session.in_room = true;
                            self.publish();
                        }
                    }
                    Some(Command::Chat(text)) => {
                        let frame = ClientEnvelope::Chat { text }.encode();
                        if outbound.send(frame).await.is_err() {
                            warn!("chat lost, socket closing");
                        }
                    }
                    Some(Command::Disconnect) => {
                        // Dropping `outbound` closes the socket.
                        self.fsm.disconnect();
                        self.session.reset();
                        self.publish();
                        info!("disconnected by user");
                        return LinkOutcome::Disconnected;
                    }
                    None => return LinkOutcome::Shutdown,
                },
                event = inbound.recv() => match event {
                    Some(SocketEvent::Frame(raw)) => {
                        match serde_json::from_str::<ServerEnvelope>(&raw) {
                            Ok(envelope) => {
                                self.session.apply(envelope);
                                self.publish();
                            }
                            Err(err) => debug!(error = %err, "dropping undecodable frame"),
                        }
                    }
                    Some(SocketEvent::Error(detail)) => {
                        warn!(error = %detail, "transport error");
                    }
                    None => {
                        self.session.connected = false;
                        self.publish();
                        return LinkOutcome::Dropped;
                    }
                },
            }
        }
    }

    /// Wait out one backoff delay. At most one of these is ever pending, and
    /// a user disconnect cancels it deterministically.
    async fn backoff(&mut self, delay: Duration) -> BackoffOutcome {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return BackoffOutcome::Elapsed,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Disconnect) => {
                        self.fsm.disconnect();
                        self.session.reset();
                        self.publish();
                        info!("pending reconnect cancelled by user");
                        return BackoffOutcome::Disconnected;
                    }
                    Some(_) => warn!("not connected, dropping command"),
                    None => return BackoffOutcome::Shutdown,
                },
            }
        }
    }

    /// Terminal states (user disconnect, gave up): no more automatic
    /// attempts, but disconnect still normalizes the state.
    async fn idle(&mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::Disconnect => {
                    self.fsm.disconnect();
                    self.session.reset();
                    self.publish();
                }
                _ => warn!("not connected, dropping command"),
            }
        }
    }
}
