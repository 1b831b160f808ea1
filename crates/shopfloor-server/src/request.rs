//! The tool-call request frame shared by both transports.

use serde::Deserialize;
use serde_json::Value;
use shopfloor_tools::Envelope;

/// One `{"tool": ..., "params": ...}` request.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub tool: String,
    /// Tool parameters; absent or `null` means no parameters.
    #[serde(default)]
    pub params: Value,
}

/// Decode a request frame.
///
/// A frame that is not JSON, not an object, or lacks a string `tool` is
/// answered with a `MalformedRequest` envelope instead of a call.
pub fn parse_request(frame: &[u8]) -> Result<ToolCall, Envelope> {
    let value: Value = serde_json::from_slice(frame)
        .map_err(|e| Envelope::malformed(format!("invalid JSON request: {e}")))?;
    if !value.is_object() {
        return Err(Envelope::malformed("request must be a JSON object"));
    }
    serde_json::from_value(value)
        .map_err(|e| Envelope::malformed(format!("invalid tool call: {e}")))
}
