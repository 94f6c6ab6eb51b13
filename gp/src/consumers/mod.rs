//! Derived-state consumers
//!
//! Subscribers that keep server-side state in sync with what the client
//! reports, and turn differences into queued instructions. These validate
//! the coordination engine's contract; they are consumers of taskcoord, not
//! part of it.

pub mod changes;
pub mod workflow;

pub use changes::{ChangeItem, ChangesReader};
pub use workflow::{WorkflowState, WorkflowWatcher};
