//! Live channel connection state machine.
//!
//! ```text
//! Disconnected --Connect--> Connecting --HandshakeSucceeded--> Connected
//! Connected --TransportLost--> Reconnecting --HandshakeSucceeded--> Connected
//! Connecting/Reconnecting --HandshakeFailed--> Reconnecting (next attempt)
//! Reconnecting --HandshakeFailed, attempt >= max--> Exhausted
//! any --Disconnect--> Disconnected
//! ```
//!
//! Transitions are pure: [`ConnectionState::apply`] returns the [`Effect`] the
//! driver has to carry out (open a handshake, sleep, replay subscriptions...),
//! so the whole policy can be exercised without sockets or timers.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use super::room::RoomId;

pub const INITIAL_RECONNECT_DELAY_MS: u64 = 2_000;
pub const RECONNECT_BACKOFF_MULTIPLIER: f64 = 1.5;
pub const MAX_RECONNECT_DELAY_MS: u64 = 10_000;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Backoff settings for automatic reconnection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: INITIAL_RECONNECT_DELAY_MS,
            multiplier: RECONNECT_BACKOFF_MULTIPLIER,
            max_delay_ms: MAX_RECONNECT_DELAY_MS,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-indexed), capped at `max_delay_ms`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = raw.round().min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Lifecycle status of the live channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Gave up reconnecting; only an explicit `connect()` leaves this state
    Exhausted,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

/// Inputs of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    Connect,
    HandshakeSucceeded,
    HandshakeFailed,
    TransportLost,
    Disconnect,
}

/// What the driver must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Start a handshake now
    OpenHandshake,
    /// Send every recorded subscription over the new connection
    ReplaySubscriptions,
    /// Wait `delay`, then run handshake number `attempt`
    ScheduleRetry { attempt: u32, delay: Duration },
    /// Stop retrying
    GiveUp { attempts: u32 },
    /// Cancel timers and close the connection
    Close,
    /// Transition not valid from the current status
    Ignore,
}

/// State of one live channel
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub subscriptions: BTreeSet<RoomId>,
    pub attempt: u32,
    pub next_delay_ms: u64,
    policy: ReconnectPolicy,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

impl ConnectionState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            subscriptions: BTreeSet::new(),
            attempt: 0,
            next_delay_ms: 0,
            policy,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Apply `event` and return the effect to carry out
    pub fn apply(&mut self, event: ChannelEvent) -> Effect {
        use ChannelEvent::*;
        use ConnectionStatus::*;

        match (self.status, event) {
            (Connecting | Connected, Connect) => Effect::Ignore,
            (_, Connect) => {
                self.status = Connecting;
                self.reset_backoff();
                Effect::OpenHandshake
            }
            (Connecting | Reconnecting, HandshakeSucceeded) => {
                self.status = Connected;
                self.reset_backoff();
                Effect::ReplaySubscriptions
            }
            (Connected, TransportLost) | (Connecting | Reconnecting, HandshakeFailed) => {
                self.schedule_retry()
            }
            (_, Disconnect) => {
                self.status = Disconnected;
                self.reset_backoff();
                Effect::Close
            }
            _ => Effect::Ignore,
        }
    }

    /// Record a subscription; returns `true` if the set changed
    pub fn add_subscription(&mut self, room: RoomId) -> bool {
        self.subscriptions.insert(room)
    }

    /// Forget a subscription; returns `true` if the set changed
    pub fn remove_subscription(&mut self, room: &RoomId) -> bool {
        self.subscriptions.remove(room)
    }

    fn schedule_retry(&mut self) -> Effect {
        if self.attempt >= self.policy.max_attempts {
            self.status = ConnectionStatus::Exhausted;
            self.next_delay_ms = 0;
            return Effect::GiveUp {
                attempts: self.attempt,
            };
        }

        self.attempt += 1;
        let delay = self.policy.delay_for(self.attempt);
        self.status = ConnectionStatus::Reconnecting;
        self.next_delay_ms = delay.as_millis() as u64;
        Effect::ScheduleRetry {
            attempt: self.attempt,
            delay,
        }
    }

    fn reset_backoff(&mut self) {
        self.attempt = 0;
        self.next_delay_ms = 0;
    }
}
