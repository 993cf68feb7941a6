//! Error types for E2E state synchronization

use std::fmt;

use campaign_common::{Channel, DomElement};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    /// No channel observed the transition before the deadline
    #[error("{0}")]
    Timeout(Box<TimeoutDiagnostics>),

    #[error("Timed out after {timeout_ms} ms on channel '{channel}' waiting for {expected:?} ({seen} non-matching notification(s))")]
    ChannelTimeout {
        channel: Channel,
        expected: String,
        timeout_ms: u64,
        seen: usize,
    },

    #[error("Channel '{channel}' closed before a matching notification arrived")]
    ChannelClosed { channel: Channel },

    #[error("Timed out after {timeout_ms} ms polling for {condition}")]
    PollTimeout {
        condition: String,
        timeout_ms: u64,
        last_snapshot: Vec<DomElement>,
        last_error: Option<String>,
    },

    #[error("Action '{action}' did not register after {attempts} attempt(s): expected {expectation}")]
    ActionNotRegistered {
        action: String,
        expectation: String,
        attempts: u32,
    },

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Invalid wait spec: {0}")]
    InvalidWaitSpec(String),

    #[error("Unknown transition: {0}")]
    UnknownTransition(String),

    #[error("Invalid catalog entry: {0}")]
    InvalidCatalogEntry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Scenario failed: {name} - {reason}")]
    ScenarioFailed { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

impl E2eError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            E2eError::Timeout(_) | E2eError::ChannelTimeout { .. } | E2eError::PollTimeout { .. }
        )
    }

    /// Diagnostics of a coordinator timeout
    pub fn diagnostics(&self) -> Option<&TimeoutDiagnostics> {
        match self {
            E2eError::Timeout(d) => Some(d),
            _ => None,
        }
    }
}

/// Observation channel of a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Event,
    Dom,
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalSource::Event => f.write_str("event"),
            SignalSource::Dom => f.write_str("dom"),
        }
    }
}

/// State captured when a wait times out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutDiagnostics {
    /// Value the wait was filtering for
    pub target: String,

    pub channel: Channel,

    /// Payload field the rule read
    pub field: String,

    pub timeout_ms: u64,

    pub attempted: Vec<SignalSource>,

    /// A notification matched (possibly without DOM confirmation)
    pub event_matched: bool,

    /// The DOM condition held at some poll
    pub dom_matched: bool,

    /// Notifications on the channel that did not match
    pub notifications_seen: usize,

    pub dom_condition: Option<String>,

    pub last_dom_snapshot: Vec<DomElement>,

    pub last_probe_error: Option<String>,
}

impl fmt::Display for TimeoutDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attempted: Vec<String> = self.attempted.iter().map(ToString::to_string).collect();
        write!(
            f,
            "Timed out after {} ms waiting for {} {:?} on '{}' (attempted: {}; event matched: {}; dom matched: {}; {} other notification(s)",
            self.timeout_ms,
            self.field,
            self.target,
            self.channel,
            attempted.join(", "),
            self.event_matched,
            self.dom_matched,
            self.notifications_seen,
        )?;
        if let Some(condition) = &self.dom_condition {
            write!(f, "; dom condition: {}; {} element(s) located", condition, self.last_dom_snapshot.len())?;
        }
        if let Some(err) = &self.last_probe_error {
            write!(f, "; last probe error: {}", err)?;
        }
        f.write_str(")")
    }
}
