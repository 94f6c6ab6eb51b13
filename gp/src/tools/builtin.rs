//! Built-in tools
//!
//! The two `report_*` tools are the inbound half of the coordination engine:
//! they turn client-supplied content into dispatched events. The rest serve
//! the guidance surface (templated docs) and introspection.

use async_trait::async_trait;
use eyre::Result;
use serde_json::{Value, json};
use tracing::debug;

use taskcoord::EventType;

use super::context::ToolContext;
use super::registry::Tool;

/// Deliver the workflow state file's parsed contents to the server.
///
/// Args: `{ "state": { ... } }`. Dispatches a `WORKFLOW_STATE` event; the
/// workflow watcher diffs it against the last known state.
pub struct ReportWorkflowStateTool;

#[async_trait]
impl Tool for ReportWorkflowStateTool {
    fn name(&self) -> &str {
        "report_workflow_state"
    }

    fn description(&self) -> &str {
        "Report the current workflow state file contents"
    }

    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<Value> {
        if args.get("state").is_none() {
            return Err(eyre::eyre!("report_workflow_state requires a 'state' object"));
        }

        let delivered = ctx.coordinator.dispatch(EventType::WORKFLOW_STATE, args).await;
        debug!(delivered, "report_workflow_state dispatched");
        Ok(json!({ "delivered": delivered }))
    }
}

/// Deliver the external change-tracking tool's JSON output.
///
/// Args: `{ "changes": [ { "name", "completed", "total" }, ... ] }`.
/// Dispatches a `CHANGE_LIST` event; the change reader refreshes its cache.
pub struct ReportChangeListTool;

#[async_trait]
impl Tool for ReportChangeListTool {
    fn name(&self) -> &str {
        "report_change_list"
    }

    fn description(&self) -> &str {
        "Report the change-tracking tool's JSON output"
    }

    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<Value> {
        if args.get("changes").is_none() {
            return Err(eyre::eyre!("report_change_list requires a 'changes' array"));
        }

        let delivered = ctx.coordinator.dispatch(EventType::CHANGE_LIST, args).await;
        debug!(delivered, "report_change_list dispatched");
        Ok(json!({ "delivered": delivered }))
    }
}

/// Render one guided doc template.
///
/// Args: `{ "name": "...", "context": { ... }? }`.
pub struct ReadGuideTool;

#[async_trait]
impl Tool for ReadGuideTool {
    fn name(&self) -> &str {
        "read_guide"
    }

    fn description(&self) -> &str {
        "Render a guided documentation template"
    }

    async fn call(&self, args: &Value, ctx: &ToolContext) -> Result<Value> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| eyre::eyre!("read_guide requires a 'name' string"))?;
        let context = args.get("context").cloned().unwrap_or(Value::Null);

        let rendered = ctx.docs.render(name, &context)?;
        Ok(json!({ "name": name, "content": rendered }))
    }
}

/// List available guided docs.
pub struct ListGuidesTool;

#[async_trait]
impl Tool for ListGuidesTool {
    fn name(&self) -> &str {
        "list_guides"
    }

    fn description(&self) -> &str {
        "List available guided documentation templates"
    }

    async fn call(&self, _args: &Value, ctx: &ToolContext) -> Result<Value> {
        Ok(json!({ "guides": ctx.docs.names() }))
    }
}

/// Coordinator and cache introspection.
pub struct StatusTool;

#[async_trait]
impl Tool for StatusTool {
    fn name(&self) -> &str {
        "status"
    }

    fn description(&self) -> &str {
        "Show coordinator and cache status"
    }

    async fn call(&self, _args: &Value, ctx: &ToolContext) -> Result<Value> {
        let changes = match &ctx.changes {
            Some(reader) => json!({
                "cached-items": reader.current().await.map(|items| items.len()),
                "fetched-at": reader.fetched_at().await.map(|t| t.to_rfc3339()),
            }),
            None => Value::Null,
        };

        let workflow = match &ctx.workflow {
            Some(watcher) => json!({
                "phase": watcher.current().await.map(|s| s.phase),
            }),
            None => Value::Null,
        };

        Ok(json!({
            "subscriptions": ctx.coordinator.subscription_count().await,
            "timers": ctx.coordinator.timer_count().await,
            "pending-instructions": ctx.coordinator.pending_instruction_count().await,
            "workflow": workflow,
            "changes": changes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::consumers::{ChangesReader, WorkflowWatcher};
    use crate::docs::DocLibrary;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use taskcoord::{Subscriber, TaskCoordinator};

    async fn test_context() -> ToolContext {
        let coordinator = TaskCoordinator::new();
        let config = Config::default();

        let workflow = WorkflowWatcher::new(Arc::clone(&coordinator), HashMap::new());
        let changes = ChangesReader::new(
            Arc::clone(&coordinator),
            Duration::from_secs(300),
            Duration::from_secs(120),
        );

        coordinator
            .subscribe(
                &(Arc::clone(&workflow) as Arc<dyn Subscriber>),
                WorkflowWatcher::mask(),
                None,
            )
            .await
            .unwrap();
        coordinator
            .subscribe(
                &(Arc::clone(&changes) as Arc<dyn Subscriber>),
                ChangesReader::mask(),
                Some(ChangesReader::timer(Duration::from_secs(60))),
            )
            .await
            .unwrap();

        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("phases.md"), "Phase: {{phase}}").unwrap();
        let docs = DocLibrary::load(temp.path()).unwrap();

        ToolContext {
            config,
            coordinator,
            docs,
            workflow: Some(workflow),
            changes: Some(changes),
        }
    }

    #[tokio::test]
    async fn test_report_workflow_state_dispatches() {
        let ctx = test_context().await;

        let result = ReportWorkflowStateTool
            .call(&json!({"state": {"phase": "design"}}), &ctx)
            .await
            .unwrap();

        assert_eq!(result["delivered"], 1);
        assert_eq!(ctx.workflow.as_ref().unwrap().current().await.unwrap().phase, "design");
    }

    #[tokio::test]
    async fn test_report_workflow_state_requires_state() {
        let ctx = test_context().await;
        assert!(ReportWorkflowStateTool.call(&json!({}), &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_report_change_list_populates_cache() {
        let ctx = test_context().await;

        let result = ReportChangeListTool
            .call(&json!({"changes": [{"name": "auth", "completed": 0, "total": 5}]}), &ctx)
            .await
            .unwrap();

        assert_eq!(result["delivered"], 1);
        let items = ctx.changes.as_ref().unwrap().current().await.unwrap();
        assert!(items[0].is_in_progress);
    }

    #[tokio::test]
    async fn test_read_guide_renders() {
        let ctx = test_context().await;

        let result = ReadGuideTool
            .call(&json!({"name": "phases", "context": {"phase": "review"}}), &ctx)
            .await
            .unwrap();

        assert_eq!(result["content"], "Phase: review");
    }

    #[tokio::test]
    async fn test_list_guides() {
        let ctx = test_context().await;
        let result = ListGuidesTool.call(&Value::Null, &ctx).await.unwrap();
        assert_eq!(result["guides"], json!(["phases"]));
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let ctx = test_context().await;
        let result = StatusTool.call(&Value::Null, &ctx).await.unwrap();

        assert_eq!(result["subscriptions"], 2);
        assert_eq!(result["timers"], 1);
        assert_eq!(result["pending-instructions"], 0);
    }
}
