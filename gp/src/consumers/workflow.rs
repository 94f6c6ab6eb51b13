//! Workflow-state watcher
//!
//! Subscribes to [`EventType::WORKFLOW_STATE`] deliveries and diffs the
//! reported state against the last one it cached - semantically, field by
//! field, never echoing raw content back. Each detected difference queues a
//! distinct, context-specific instruction for the client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use taskcoord::{EventType, Subscriber, TaskCoordinator};

/// Parsed workflow state, as reported by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowState {
    /// Current workflow phase
    pub phase: String,

    /// Item the agent is currently working on
    pub active_item: Option<String>,

    /// Tracking reference (ticket, branch, change id)
    pub tracking: Option<String>,

    /// Free-form task description
    pub description: Option<String>,

    /// Queued items awaiting work
    pub queue: Vec<String>,
}

/// Watches workflow-state deliveries and queues guidance on transitions.
pub struct WorkflowWatcher {
    coordinator: Arc<TaskCoordinator>,
    flags: HashMap<String, bool>,
    last: Mutex<Option<WorkflowState>>,
}

impl WorkflowWatcher {
    /// Create a watcher. `flags` is the read-only configuration collaborator;
    /// the watcher never writes it.
    pub fn new(coordinator: Arc<TaskCoordinator>, flags: HashMap<String, bool>) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            flags,
            last: Mutex::new(None),
        })
    }

    /// Event mask this watcher subscribes with.
    pub fn mask() -> EventType {
        EventType::WORKFLOW_STATE
    }

    /// Last state seen, if any.
    pub async fn current(&self) -> Option<WorkflowState> {
        self.last.lock().await.clone()
    }

    fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    /// Diff `old` against `new`, queueing one instruction per difference.
    async fn diff_and_instruct(&self, old: &WorkflowState, new: &WorkflowState) -> usize {
        let mut queued = 0usize;

        if old.phase != new.phase {
            let mut text = format!(
                "The workflow phase changed from '{}' to '{}'. Read the '{}' phase guide before continuing.",
                old.phase, new.phase, new.phase
            );
            if self.flag("strict-phases") {
                text.push_str(" Confirm the exit checklist of the previous phase is complete.");
            }
            self.coordinator.queue_instruction(text).await;
            queued += 1;
        }

        if old.active_item != new.active_item {
            let text = match &new.active_item {
                Some(item) => format!(
                    "The active workflow item is now '{}'. Align your next steps with it.",
                    item
                ),
                None => "No workflow item is active anymore. Pick the next item from the queue.".to_string(),
            };
            self.coordinator.queue_instruction(text).await;
            queued += 1;
        }

        if old.tracking != new.tracking {
            let text = match &new.tracking {
                Some(re) => format!("The tracking reference changed to '{}'. Use it in future updates.", re),
                None => "The tracking reference was cleared. Establish a new one before recording progress.".to_string(),
            };
            self.coordinator.queue_instruction(text).await;
            queued += 1;
        }

        if old.description != new.description {
            self.coordinator
                .queue_instruction("The task description changed. Re-read it and adjust your plan if needed.")
                .await;
            queued += 1;
        }

        if old.queue != new.queue {
            self.coordinator
                .queue_instruction(format!(
                    "The workflow queue changed ({} item(s) now queued). Review the queue before choosing the next item.",
                    new.queue.len()
                ))
                .await;
            queued += 1;
        }

        queued
    }
}

#[async_trait]
impl Subscriber for WorkflowWatcher {
    async fn handle_event(&self, event: EventType, payload: &Value) -> Result<bool> {
        if !event.intersects(EventType::WORKFLOW_STATE) {
            return Ok(false);
        }

        // Malformed payloads are the subscriber's concern: ignore, don't fail
        let new: WorkflowState = match serde_json::from_value(payload.get("state").cloned().unwrap_or(Value::Null)) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "WorkflowWatcher: ignoring malformed state payload");
                return Ok(false);
            }
        };

        let mut last = self.last.lock().await;
        match last.as_ref() {
            Some(old) if old == &new => {
                debug!("WorkflowWatcher: state unchanged");
            }
            Some(old) => {
                let queued = self.diff_and_instruct(old, &new).await;
                debug!(queued, "WorkflowWatcher: state changed, queued instructions");
            }
            None => {
                // First delivery: cache silently, nothing to diff against
                debug!(phase = %new.phase, "WorkflowWatcher: initial state cached");
            }
        }
        *last = Some(new);

        Ok(true)
    }

    fn name(&self) -> &str {
        "workflow-watcher"
    }
}
