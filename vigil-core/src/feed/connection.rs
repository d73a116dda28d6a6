//! Live-feed connection state machine.
//!
//! Transitions are explicit functions so the machine can be driven by any
//! notification mechanism. The async driver in [`super::client`] is one
//! such caller; tests drive it directly.

use super::backoff::{RetryDecision, RetryPolicy};
use crate::error::FeedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    GivenUp,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::GivenUp => "given-up",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the state and retry policy of one subscriber's connection.
#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    policy: RetryPolicy,
    opened_at: Option<DateTime<Utc>>,
    total_opens: u64,
}

impl ConnectionManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            policy,
            opened_at: None,
            total_opens: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn attempts(&self) -> u32 {
        self.policy.attempts()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Number of successful opens over the manager's lifetime.
    pub fn total_opens(&self) -> u64 {
        self.total_opens
    }

    /// Begin a connect attempt.
    ///
    /// Returns `true` when a live connection existed and must be closed
    /// before the new one is opened. Not allowed once given up.
    pub fn begin_connect(&mut self) -> Result<bool, FeedError> {
        match self.state {
            ConnectionState::GivenUp => Err(self.invalid(ConnectionState::Connecting)),
            previous => {
                self.state = ConnectionState::Connecting;
                self.opened_at = None;
                Ok(matches!(previous, ConnectionState::Open))
            }
        }
    }

    /// The transport reported a successful open.
    pub fn on_open(&mut self) -> Result<(), FeedError> {
        if self.state != ConnectionState::Connecting {
            return Err(self.invalid(ConnectionState::Open));
        }
        self.state = ConnectionState::Open;
        self.opened_at = Some(Utc::now());
        self.total_opens += 1;
        self.policy.record_success();
        Ok(())
    }

    /// The transport failed to open or the stream dropped.
    pub fn on_failure(&mut self) -> RetryDecision {
        let decision = self.policy.record_failure();
        self.opened_at = None;
        self.state = match decision {
            RetryDecision::Retry { .. } => ConnectionState::Closed,
            RetryDecision::GiveUp { .. } | RetryDecision::Halted => ConnectionState::GivenUp,
        };
        decision
    }

    /// Teardown requested by the subscriber. Idempotent.
    pub fn on_disconnect(&mut self) {
        self.opened_at = None;
        if self.state != ConnectionState::GivenUp {
            self.state = ConnectionState::Closed;
        }
    }

    /// Explicit manual reconnect: leaves given-up and resets the budget.
    pub fn reset(&mut self) {
        self.policy.reset();
        self.opened_at = None;
        self.state = ConnectionState::Idle;
    }

    fn invalid(&self, to: ConnectionState) -> FeedError {
        FeedError::InvalidTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}
