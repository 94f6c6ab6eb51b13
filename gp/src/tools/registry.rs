//! Tool trait and registry

use std::collections::HashMap;

use async_trait::async_trait;
use eyre::Result;
use serde_json::Value;
use tracing::debug;

use super::builtin::{ListGuidesTool, ReadGuideTool, ReportChangeListTool, ReportWorkflowStateTool, StatusTool};
use super::context::ToolContext;

/// One callable tool. Errors become protocol `Error` outcomes and never
/// abort the session.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as it appears on the wire
    fn name(&self) -> &str;

    /// One-line description for listings
    fn description(&self) -> &str;

    /// Execute with the given arguments
    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<Value>;
}

/// Manages the tools available to a session
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with the standard tool set
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.add_tool(Box::new(ReportWorkflowStateTool));
        registry.add_tool(Box::new(ReportChangeListTool));
        registry.add_tool(Box::new(ReadGuideTool));
        registry.add_tool(Box::new(ListGuidesTool));
        registry.add_tool(Box::new(StatusTool));
        registry
    }

    /// Empty registry (for testing)
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Add a tool to the registry
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolRegistry::add_tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Names of all registered tools, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Invoke `name` with `args`. Unknown tools are an error.
    pub async fn call(&self, name: &str, args: &Value, ctx: &ToolContext) -> Result<Value> {
        let Some(tool) = self.tools.get(name) else {
            return Err(eyre::eyre!(
                "Unknown tool: {}. Available: {}",
                name,
                self.names().join(", ")
            ));
        };
        debug!(tool_name = name, "ToolRegistry::call");
        tool.call(args, ctx).await
    }
}
