//! The agent protocol server
//!
//! One session per process: the agent's harness connects over stdin/stdout
//! and exchanges JSON-over-newline messages. Session assembly wires the
//! coordinator, the consumers, and the doc library together in the required
//! startup order: subscribe everything, run the one-time init hooks, start
//! the timer loop, then accept traffic.

use std::sync::Arc;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use taskcoord::{Subscriber, TaskCoordinator};

use crate::config::Config;
use crate::consumers::{ChangesReader, WorkflowWatcher};
use crate::docs::DocLibrary;
use crate::protocol::{Request, Response, ToolOutcome};
use crate::tools::{ToolContext, ToolRegistry};

/// A running agent session: the wired-up coordinator plus the tool registry.
pub struct Session {
    ctx: ToolContext,
    registry: ToolRegistry,
}

impl Session {
    /// Assemble a session from configuration.
    ///
    /// The consumers are strongly held by the session's [`ToolContext`]; the
    /// coordinator sees only weak references. `init()` runs before the timer
    /// loop starts and before any request is read, so startup hooks complete
    /// before the coordinator sees any traffic.
    pub async fn build(config: Config) -> Result<Self> {
        config.validate()?;

        let coordinator = TaskCoordinator::new();
        let docs = DocLibrary::load(&config.docs.dir)?;

        let workflow = if config.workflow.enabled {
            let watcher = WorkflowWatcher::new(Arc::clone(&coordinator), config.flags.clone());
            coordinator
                .subscribe(
                    &(Arc::clone(&watcher) as Arc<dyn Subscriber>),
                    WorkflowWatcher::mask(),
                    None,
                )
                .await?;
            Some(watcher)
        } else {
            None
        };

        let changes = if config.changes.enabled {
            let reader = ChangesReader::new(
                Arc::clone(&coordinator),
                config.changes.ttl(),
                config.changes.request_timeout(),
            );
            coordinator
                .subscribe(
                    &(Arc::clone(&reader) as Arc<dyn Subscriber>),
                    ChangesReader::mask(),
                    Some(ChangesReader::timer(config.changes.refresh_interval())),
                )
                .await?;
            Some(reader)
        } else {
            None
        };

        // Startup hooks run exactly once, before any dispatch or timer fire
        coordinator.init().await;
        coordinator.start().await?;

        info!(
            workflow = workflow.is_some(),
            changes = changes.is_some(),
            guides = docs.names().len(),
            "Session assembled"
        );

        Ok(Self {
            ctx: ToolContext {
                config,
                coordinator,
                docs,
                workflow,
                changes,
            },
            registry: ToolRegistry::standard(),
        })
    }

    /// The session's coordinator (for tests and embedding).
    pub fn coordinator(&self) -> &Arc<TaskCoordinator> {
        &self.ctx.coordinator
    }

    /// Handle one request line, producing exactly one response.
    ///
    /// Every response - success, tool error, or parse error - is assembled
    /// through [`Response::assemble`], which drains queued instructions into
    /// the side-channel field. That drain is the push mechanism; nothing
    /// else delivers instructions.
    pub async fn handle_line(&self, line: &str) -> Response {
        let request: Request = match serde_json::from_str(line.trim()) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "Failed to parse request");
                return Response::assemble(
                    0,
                    ToolOutcome::Error {
                        message: format!("Invalid request: {}", e),
                    },
                    &self.ctx.coordinator,
                )
                .await;
            }
        };

        debug!(id = request.id, tool = %request.tool, "Handling request");

        let outcome = match self.registry.call(&request.tool, &request.args, &self.ctx).await {
            Ok(result) => ToolOutcome::Ok { result },
            Err(e) => {
                warn!(id = request.id, tool = %request.tool, error = %e, "Tool call failed");
                ToolOutcome::Error { message: e.to_string() }
            }
        };

        Response::assemble(request.id, outcome, &self.ctx.coordinator).await
    }

    /// Stop the timer loop.
    pub async fn shutdown(&self) {
        self.ctx.coordinator.shutdown().await;
    }
}

/// Run the stdio protocol loop until the client closes stdin.
pub async fn serve(config: Config) -> Result<()> {
    let max_request_bytes = config.server.max_request_bytes;
    let session = Session::build(config).await?;

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    info!("Serving agent protocol on stdio");

    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }

        let response = if line.len() > max_request_bytes {
            warn!(bytes = line.len(), "Request too large");
            Response::assemble(
                0,
                ToolOutcome::Error {
                    message: format!("Request too large: {} bytes", line.len()),
                },
                session.coordinator(),
            )
            .await
        } else {
            session.handle_line(&line).await
        };

        let json = serde_json::to_string(&response).context("Failed to serialize response")?;
        stdout.write_all(json.as_bytes()).await.context("Failed to write response")?;
        stdout.write_all(b"\n").await.context("Failed to write newline")?;
        stdout.flush().await.context("Failed to flush response")?;
    }

    info!("Client closed stdin, shutting down");
    session.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn session() -> Session {
        Session::build(Config::default()).await.unwrap()
    }

    fn line(id: u64, tool: &str, args: serde_json::Value) -> String {
        serde_json::to_string(&Request {
            id,
            tool: tool.to_string(),
            args,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_response() {
        let session = session().await;
        let response = session.handle_line(&line(1, "no_such_tool", json!({}))).await;

        assert_eq!(response.id, 1);
        assert!(matches!(response.outcome, ToolOutcome::Error { .. }));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_parse_failure_is_error_response_with_id_zero() {
        let session = session().await;
        let response = session.handle_line("this is not json").await;

        assert_eq!(response.id, 0);
        assert!(matches!(response.outcome, ToolOutcome::Error { .. }));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_instructions_piggyback_on_any_response() {
        let session = session().await;

        // First delivery caches silently
        let response = session
            .handle_line(&line(1, "report_workflow_state", json!({"state": {"phase": "design"}})))
            .await;
        assert!(response.instructions.is_none());

        // Phase transition queues guidance...
        let response = session
            .handle_line(&line(
                2,
                "report_workflow_state",
                json!({"state": {"phase": "implement"}}),
            ))
            .await;
        // ...which rides out on this very response (the next one sent)
        let text = response.instructions.unwrap();
        assert!(text.contains("'implement'"));

        // And is delivered at most once
        let response = session.handle_line(&line(3, "status", json!({}))).await;
        assert!(response.instructions.is_none());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_instructions_attach_even_to_unrelated_error_responses() {
        let session = session().await;

        session
            .handle_line(&line(1, "report_workflow_state", json!({"state": {"phase": "a"}})))
            .await;
        session
            .handle_line(&line(2, "report_workflow_state", json!({"state": {"phase": "b"}})))
            .await;

        // Queue more guidance, then send a garbage line: the parse-error
        // response still carries the drained instructions
        session
            .handle_line(&line(3, "report_workflow_state", json!({"state": {"phase": "c"}})))
            .await;
        let response = session.handle_line("garbage").await;
        assert!(response.instructions.is_some());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_tool_end_to_end() {
        let session = session().await;
        let response = session.handle_line(&line(5, "status", json!({}))).await;

        match response.outcome {
            ToolOutcome::Ok { result } => {
                assert_eq!(result["subscriptions"], 2);
                assert_eq!(result["timers"], 1);
            }
            ToolOutcome::Error { message } => panic!("status failed: {}", message),
        }
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_consumers_do_not_subscribe() {
        let mut config = Config::default();
        config.workflow.enabled = false;
        config.changes.enabled = false;

        let session = Session::build(config).await.unwrap();
        assert_eq!(session.coordinator().subscription_count().await, 0);
        session.shutdown().await;
    }
}
