//! Tool system for the agent protocol
//!
//! Each protocol request names a tool. Tools receive a [`ToolContext`]
//! holding the coordinator and the shared server state; selected tools
//! translate client-supplied payloads into dispatched events, which is the
//! engine's only inbound event source besides the timer loop.

mod builtin;
mod context;
mod registry;

pub use builtin::{ListGuidesTool, ReadGuideTool, ReportChangeListTool, ReportWorkflowStateTool, StatusTool};
pub use context::ToolContext;
pub use registry::{Tool, ToolRegistry};
