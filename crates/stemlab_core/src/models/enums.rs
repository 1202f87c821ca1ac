//! Core enums used throughout the application.

use serde::{Deserialize, Serialize};

/// Global transport state applied uniformly to all enabled tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// Nothing is playing.
    #[default]
    Idle,
    /// All enabled tracks are playing in lock-step.
    Playing,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Idle => write!(f, "idle"),
            TransportState::Playing => write!(f, "playing"),
        }
    }
}

/// State of the persistent event channel backing a job session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Channel is being established.
    Connecting,
    /// Channel is open and events may arrive.
    Open,
    /// Channel is closed; no further events are processed.
    Closed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Connecting => write!(f, "connecting"),
            ChannelState::Open => write!(f, "open"),
            ChannelState::Closed => write!(f, "closed"),
        }
    }
}

/// Server-driven state of a processing job.
///
/// Transitions are monotonic: `Submitted -> Received -> Completed`, with
/// `Errored` reachable from any state (including on channel loss).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Request submitted, nothing heard back yet.
    Submitted,
    /// Server acknowledged the request and started processing.
    Received,
    /// Server delivered the result descriptors.
    Completed,
    /// Server reported an error, sent something unrecognized, or the
    /// channel was lost.
    Errored,
}

impl JobState {
    /// Get display string for logs and UIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::Received => "Received",
            Self::Completed => "Completed",
            Self::Errored => "Errored",
        }
    }

    /// Whether this state ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_state_terminality() {
        assert!(!JobState::Submitted.is_terminal());
        assert!(!JobState::Received.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Errored.is_terminal());
    }

    #[test]
    fn transport_state_display() {
        assert_eq!(TransportState::Idle.to_string(), "idle");
        assert_eq!(TransportState::Playing.to_string(), "playing");
    }
}
