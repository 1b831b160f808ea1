//! The uniform result envelope.
//!
//! Every tool invocation, on either transport, produces exactly one
//! [`Envelope`]. On the wire a success is `{"success": true, "data": ...}`
//! and a failure is `{"success": false, "error": {...}}`; the two shapes
//! never mix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use shopfloor_core::{Error, ErrorKind};

/// Outcome of one tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEnvelope", try_from = "WireEnvelope")]
pub enum Envelope {
    /// Handler result.
    Success(Value),
    /// Structured failure.
    Failure(ToolFailure),
}

/// Failure details carried by a failure envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    /// Classification callers can match on.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Tool that was invoked (empty when the request never named one).
    pub tool: String,
    /// When the failure was produced.
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Wrap a handler result.
    pub fn success(data: Value) -> Self {
        Self::Success(data)
    }

    /// Build a failure envelope.
    pub fn failure(kind: ErrorKind, message: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::Failure(ToolFailure {
            kind,
            message: message.into(),
            tool: tool.into(),
            timestamp: Utc::now(),
        })
    }

    /// Failure envelope for an error raised while serving `tool`.
    pub fn from_error(tool: impl Into<String>, err: &Error) -> Self {
        Self::failure(err.kind(), err.to_string(), tool)
    }

    /// Failure envelope for a request frame that could not be decoded.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::failure(ErrorKind::MalformedRequest, message, "")
    }

    /// Whether this is a success envelope.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Success payload, if any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success(data) => Some(data),
            Self::Failure(_) => None,
        }
    }

    /// Failure details, if any.
    pub fn error(&self) -> Option<&ToolFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Compact JSON text, the single encoding both transports emit.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload cannot be encoded.
    pub fn encode(&self) -> shopfloor_core::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    success: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ToolFailure>,
}

/// Distinguishes `"data": null` (present) from an absent key.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        match envelope {
            Envelope::Success(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Envelope::Failure(failure) => Self {
                success: false,
                data: None,
                error: Some(failure),
            },
        }
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        match (wire.success, wire.data, wire.error) {
            (true, Some(data), None) => Ok(Self::Success(data)),
            (false, None, Some(failure)) => Ok(Self::Failure(failure)),
            (success, data, error) => Err(format!(
                "envelope must carry exactly one of data/error matching success \
                 (success={success}, data={}, error={})",
                data.is_some(),
                error.is_some()
            )),
        }
    }
}
