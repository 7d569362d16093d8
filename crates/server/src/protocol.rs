//! Wire protocol
//!
//! Newline-delimited JSON over TCP. Every frame is a flat object with a
//! `type` tag; keys are a mapping and carry no order.
//!
//! Server to client:
//! ```text
//! {"type":"connected","message":"UE4SS REPL ready!"}
//! {"type":"eval_result","success":true,"result":"42"}
//! {"type":"eval_result","success":false,"result":"Compile error: ..."}
//! ```
//!
//! Client to server:
//! ```text
//! {"type":"evaluate","expression":"2*21"}
//! ```
//!
//! Failures reuse the `result` key; `success` tells the two apart.

use serde::{Deserialize, Serialize};

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, right after a client is accepted
    Connected { message: String },
    /// Outcome of one evaluate request
    EvalResult { success: bool, result: String },
}

/// Frames accepted from the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Evaluate { expression: String },
}

impl ServerMessage {
    pub fn connected(message: impl Into<String>) -> Self {
        ServerMessage::Connected {
            message: message.into(),
        }
    }

    pub fn success(result: impl Into<String>) -> Self {
        ServerMessage::EvalResult {
            success: true,
            result: result.into(),
        }
    }

    pub fn failure(result: impl Into<String>) -> Self {
        ServerMessage::EvalResult {
            success: false,
            result: result.into(),
        }
    }
}

impl ClientMessage {
    pub fn evaluate(expression: impl Into<String>) -> Self {
        ClientMessage::Evaluate {
            expression: expression.into(),
        }
    }
}

/// Decode one request line
///
/// Anything that is not an `evaluate` object with a string `expression`
/// returns `None`; such lines are dropped without a reply.
pub fn parse(line: &str) -> Option<ClientMessage> {
    serde_json::from_str(line.trim()).ok()
}

/// Decode one server frame (console side)
pub fn parse_response(line: &str) -> Option<ServerMessage> {
    serde_json::from_str(line.trim()).ok()
}

/// Encode a frame as a single `\n`-terminated line
///
/// The JSON encoder escapes quotes, CR and LF inside strings, so the
/// payload never spans more than one line.
pub fn serialize<T: Serialize>(message: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}
