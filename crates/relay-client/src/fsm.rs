use std::time::Duration;

/// Default cap on consecutive reconnect attempts.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Connection lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    GaveUp,
}

/// What the transport reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Closed,
    Failed,
}

/// What the driver should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectAction {
    None,
    /// Schedule one reconnect after `delay`, then connect again.
    Retry { delay: Duration },
    /// Retry budget exhausted; no further automatic attempts.
    GiveUp,
}

/// Delay before reconnect attempt `attempt` (1-based): 2^attempt seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt)
}

/// The reconnect state machine, free of any IO or timers.
///
/// The driver owns the socket and the backoff timer; this struct only
/// decides transitions, so the exact schedule is testable synchronously.
#[derive(Debug)]
pub struct ReconnectFsm {
    state: ConnState,
    attempts: u32,
    max_attempts: u32,
}

impl ReconnectFsm {
    pub fn new() -> Self {
        Self::with_max_attempts(MAX_RECONNECT_ATTEMPTS)
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            state: ConnState::Disconnected,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Mark the start of a connection attempt (initial or after backoff).
    pub fn begin_connect(&mut self) {
        self.state = ConnState::Connecting;
    }

    /// Single entry point for transport outcomes.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> ReconnectAction {
        match event {
            TransportEvent::Opened => {
                self.state = ConnState::Connected;
                self.attempts = 0;
                ReconnectAction::None
            }
            TransportEvent::Closed | TransportEvent::Failed => match self.state {
                ConnState::Connected | ConnState::Connecting => {
                    if self.attempts < self.max_attempts {
                        self.attempts += 1;
                        self.state = ConnState::Reconnecting;
                        ReconnectAction::Retry {
                            delay: backoff_delay(self.attempts),
                        }
                    } else {
                        self.state = ConnState::GaveUp;
                        ReconnectAction::GiveUp
                    }
                }
                // Already out of the retry loop; nothing to schedule.
                ConnState::Disconnected | ConnState::Reconnecting | ConnState::GaveUp => {
                    ReconnectAction::None
                }
            },
        }
    }

    /// Explicit user disconnect: valid from any state, always lands in
    /// Disconnected with a fresh retry budget.
    pub fn disconnect(&mut self) {
        self.state = ConnState::Disconnected;
        self.attempts = 0;
    }
}

impl Default for ReconnectFsm {
    fn default() -> Self {
        Self::new()
    }
}
