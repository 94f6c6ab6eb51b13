//! Shared context handed to every tool invocation

use std::sync::Arc;

use taskcoord::TaskCoordinator;

use crate::config::Config;
use crate::consumers::{ChangesReader, WorkflowWatcher};
use crate::docs::DocLibrary;

/// Everything a tool may need: the coordinator for event injection and
/// introspection, the doc library, and the consumers for status reporting.
///
/// The context owns the strong `Arc`s to the consumers - the coordinator
/// holds only weak references, so dropping the context (end of session)
/// implicitly unsubscribes them.
pub struct ToolContext {
    pub config: Config,
    pub coordinator: Arc<TaskCoordinator>,
    pub docs: DocLibrary,
    pub workflow: Option<Arc<WorkflowWatcher>>,
    pub changes: Option<Arc<ChangesReader>>,
}
