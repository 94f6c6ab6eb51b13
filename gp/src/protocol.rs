//! Wire protocol for the agent session
//!
//! Simple JSON-over-newline request/response: each message is a single line
//! of JSON followed by `\n`. The client (the coding agent's harness) sends a
//! `Request` naming a tool; the server answers with exactly one `Response`.
//!
//! The protocol has no server-initiated push. Queued instructions therefore
//! piggyback on the `instructions` side-channel field of the *next* response
//! to any tool call - every response is assembled through
//! [`Response::assemble`], which drains the coordinator's instruction queue.
//! Delivery timing is best-effort, never immediate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskcoord::TaskCoordinator;

/// A tool call from the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    /// Client-chosen id, echoed back on the response
    pub id: u64,

    /// Tool name to invoke
    pub tool: String,

    /// Tool arguments; shape is tool-specific
    #[serde(default)]
    pub args: Value,
}

/// The result half of a response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ToolOutcome {
    /// Tool succeeded
    Ok { result: Value },

    /// Tool failed; the session continues
    Error { message: String },
}

/// A response to one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    /// Echo of the request id (0 when the request could not be parsed)
    pub id: u64,

    /// Tool outcome
    pub outcome: ToolOutcome,

    /// Server-originated instructions hitching a ride on this response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Response {
    /// Assemble an outgoing response, draining any queued instructions into
    /// the side-channel field. All response construction funnels through
    /// here - skipping the drain would silently drop queued instructions.
    pub async fn assemble(id: u64, outcome: ToolOutcome, coordinator: &TaskCoordinator) -> Self {
        Self {
            id,
            outcome,
            instructions: coordinator.drain_instructions().await,
        }
    }
}
