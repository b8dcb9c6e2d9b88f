use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pack::{pack, unpack};
use crate::value::Value;

/// Which side started the conversation a frame belongs to.
///
/// Replies echo the origin of the request they answer, so a receiver can
/// tell "answer to something I asked" from "peer asking me something".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Conversation started by the driver process.
    #[serde(rename = "driver")]
    Driver,
    /// Conversation started by the display peer.
    #[serde(rename = "request")]
    Peer,
}

impl Origin {
    /// Wire tag.
    pub fn tag(self) -> &'static str {
        match self {
            Origin::Driver => "driver",
            Origin::Peer => "request",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Error carried on a reply in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: String,
    pub message: String,
}

impl Fault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// One logical message on a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Correlation id pairing a request with its reply.
    pub id: String,
    /// Session token; absent only on frames sent before a session exists.
    pub session: Option<String>,
    pub message: Value,
    pub direction: Origin,
    /// Set on error replies.
    pub error: Option<Fault>,
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session: Option<String>,
    #[serde(default)]
    message: serde_json::Value,
    direction: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<Fault>,
}

impl Envelope {
    pub fn new(id: impl Into<String>, message: Value, direction: Origin) -> Self {
        Self {
            id: id.into(),
            session: None,
            message,
            direction,
            error: None,
        }
    }

    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
    }

    pub fn with_error(mut self, fault: Fault) -> Self {
        self.error = Some(fault);
        self
    }

    /// Encode to the JSON payload carried inside a transport frame.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let wire = WireEnvelope {
            id: self.id.clone(),
            session: self.session.clone(),
            message: pack(&self.message),
            direction: self.direction,
            error: self.error.clone(),
        };
        Ok(Bytes::from(serde_json::to_vec(&wire)?))
    }

    /// Decode a transport frame payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        let wire: WireEnvelope = serde_json::from_slice(payload)?;
        Ok(Self {
            id: wire.id,
            session: wire.session,
            message: unpack(wire.message)?,
            direction: wire.direction,
            error: wire.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::array::NdArray;
    use crate::error::FrameError;

    #[test]
    fn encodes_wire_shape() {
        let envelope = Envelope::new(
            "abc",
            Value::map([("action", "ping")]),
            Origin::Peer,
        )
        .with_session(Some("S".to_string()));

        let json: serde_json::Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "abc",
                "session": "S",
                "message": { "action": "ping" },
                "direction": "request"
            })
        );
    }

    #[test]
    fn missing_session_decodes_as_none() {
        let payload = br#"{"id":"x","message":null,"direction":"driver"}"#;
        let envelope = Envelope::from_slice(payload).unwrap();
        assert_eq!(envelope.session, None);
        assert_eq!(envelope.direction, Origin::Driver);
        assert!(envelope.message.is_null());
    }

    #[test]
    fn error_reply_roundtrips() {
        let envelope = Envelope::new("x", Value::Null, Origin::Driver)
            .with_session(Some("S".to_string()))
            .with_error(Fault::new("handler_failed", "boom"));
        let decoded = Envelope::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn embedded_arrays_survive_the_envelope() {
        let plane = NdArray::from_u8(vec![1, 3], &[0, 128, 255]).unwrap();
        let envelope = Envelope::new("plane", Value::map([("pixels", plane.clone())]), Origin::Driver);
        let decoded = Envelope::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.message.get("pixels").and_then(Value::as_array), Some(&plane));
    }

    #[test]
    fn unknown_direction_is_rejected() {
        let payload = br#"{"id":"x","session":"S","message":{},"direction":"sideways"}"#;
        assert!(matches!(Envelope::from_slice(payload), Err(FrameError::Json(_))));
    }
}
