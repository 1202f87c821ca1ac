//! Wire types for the sound-tools event channel.
//!
//! Inbound messages are JSON envelopes `{event, data}`. The only outbound
//! event defined by the protocol is `stop`.

use serde::{Deserialize, Serialize};

/// Raw inbound `{event, data}` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// One result descriptor from a `complete` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFile {
    /// Result kind; [`ResultFile::ORIGINAL`] marks the caller's own input.
    #[serde(rename = "type")]
    pub kind: String,
    /// Server-relative path of the produced file.
    pub path: String,
}

impl ResultFile {
    /// Kind marking the caller's uploaded input, renamed rather than
    /// re-registered.
    pub const ORIGINAL: &'static str = "original";

    pub fn is_original(&self) -> bool {
        self.kind == Self::ORIGINAL
    }
}

/// Parsed server event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Request acknowledged; processing started.
    Received,
    /// Job finished; carries the result descriptors.
    Complete(Vec<ResultFile>),
    /// Server-side failure.
    Error(Option<String>),
    /// Anything this client does not understand. Terminal.
    Unrecognized(String),
}

impl EventEnvelope {
    /// Interpret the envelope. A malformed `complete` payload is a
    /// deserialization error; unknown event names are preserved for
    /// diagnostics.
    pub fn into_event(self) -> Result<ServerEvent, serde_json::Error> {
        match self.event.as_str() {
            "received" => Ok(ServerEvent::Received),
            "complete" => Ok(ServerEvent::Complete(serde_json::from_value(self.data)?)),
            "error" => Ok(ServerEvent::Error(
                self.data.as_str().map(str::to_string),
            )),
            other => Ok(ServerEvent::Unrecognized(other.to_string())),
        }
    }
}

/// Outbound client event.
#[derive(Debug, Clone, Serialize)]
pub struct ClientEvent {
    pub event: &'static str,
}

impl ClientEvent {
    /// Ask the server to abandon the current job.
    pub fn stop() -> Self {
        Self { event: "stop" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ServerEvent {
        serde_json::from_str::<EventEnvelope>(raw)
            .unwrap()
            .into_event()
            .unwrap()
    }

    #[test]
    fn parses_received_without_data() {
        assert_eq!(parse(r#"{"event":"received"}"#), ServerEvent::Received);
    }

    #[test]
    fn parses_complete_with_descriptors() {
        let event = parse(
            r#"{"event":"complete","data":[{"type":"original","path":"/x/renamed.wav"},{"type":"vocals","path":"/x/vocals.wav"}]}"#,
        );
        let ServerEvent::Complete(files) = event else {
            panic!("expected complete");
        };
        assert_eq!(files.len(), 2);
        assert!(files[0].is_original());
        assert_eq!(files[1].kind, "vocals");
        assert_eq!(files[1].path, "/x/vocals.wav");
    }

    #[test]
    fn malformed_complete_payload_is_an_error() {
        let envelope: EventEnvelope =
            serde_json::from_str(r#"{"event":"complete","data":"nope"}"#).unwrap();
        assert!(envelope.into_event().is_err());
    }

    #[test]
    fn unknown_events_are_preserved() {
        assert_eq!(
            parse(r#"{"event":"progress","data":42}"#),
            ServerEvent::Unrecognized("progress".to_string())
        );
    }

    #[test]
    fn stop_serializes_as_envelope() {
        let json = serde_json::to_string(&ClientEvent::stop()).unwrap();
        assert_eq!(json, r#"{"event":"stop"}"#);
    }
}
