//! Scripted transport for deterministic testing without sockets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::errors::ClientError;
use crate::transport::{Connector, SocketEvent, Transport};

/// Pre-programmed outcome for one connect() call.
pub enum MockOutcome {
    /// The connect attempt fails.
    Fail,
    /// The connect succeeds; `frames` are delivered immediately, then the
    /// socket closes unless `hold` keeps it open for later pushes.
    Connect { frames: Vec<String>, hold: bool },
}

impl MockOutcome {
    pub fn connect_and_hold() -> Self {
        Self::Connect {
            frames: Vec::new(),
            hold: true,
        }
    }

    pub fn connect_then_drop() -> Self {
        Self::Connect {
            frames: Vec::new(),
            hold: false,
        }
    }
}

/// Connector that replays outcomes in sequence and records everything the
/// client did: attempt count, attempt times, frames sent.
pub struct MockConnector {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    sent: Arc<Mutex<Vec<String>>>,
    attempts: AtomicUsize,
    attempt_times: Mutex<Vec<tokio::time::Instant>>,
    live: Mutex<Vec<mpsc::Sender<SocketEvent>>>,
}

impl MockConnector {
    pub fn new(outcomes: Vec<MockOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            sent: Arc::new(Mutex::new(Vec::new())),
            attempts: AtomicUsize::new(0),
            attempt_times: Mutex::new(Vec::new()),
            live: Mutex::new(Vec::new()),
        })
    }

    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Instants at which connect() was called, in order.
    pub fn attempt_times(&self) -> Vec<tokio::time::Instant> {
        self.attempt_times.lock().clone()
    }

    /// Every frame the client sent, across all connections.
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Deliver a frame on every held-open connection.
    pub fn push_frame(&self, frame: &str) {
        for tx in self.live.lock().iter() {
            let _ = tx.try_send(SocketEvent::Frame(frame.to_owned()));
        }
    }

    /// Drop every held-open connection, as if the server went away.
    pub fn close_all(&self) {
        self.live.lock().clear();
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Transport, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().push(tokio::time::Instant::now());

        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(MockOutcome::Fail);

        match outcome {
            MockOutcome::Fail => Err(ClientError::Transport("mock: connection refused".into())),
            MockOutcome::Connect { frames, hold } => {
                let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
                let (in_tx, in_rx) = mpsc::channel::<SocketEvent>(64);

                let sent = Arc::clone(&self.sent);
                tokio::spawn(async move {
                    while let Some(frame) = out_rx.recv().await {
                        sent.lock().push(frame);
                    }
                });

                for frame in frames {
                    let _ = in_tx.try_send(SocketEvent::Frame(frame));
                }
                if hold {
                    self.live.lock().push(in_tx);
                }

                Ok(Transport {
                    outbound: out_tx,
                    inbound: in_rx,
                })
            }
        }
    }
}
