//! The subscriber contract
//!
//! Anything that wants events implements [`Subscriber`]. The coordinator
//! stores only weak references to subscribers, so registering never extends
//! an object's lifetime - the surrounding server owns the strong `Arc`s.

use async_trait::async_trait;
use eyre::Result;
use serde_json::Value;

use crate::event::EventType;

/// A consumer of dispatched events.
///
/// `handle_event` runs as one cooperative step of the coordinator's
/// scheduler: no two dispatch passes overlap, so implementations never see
/// concurrent invocations from the same coordinator. The returned bool is
/// advisory ("someone handled this") and never stops fan-out to the other
/// matching subscribers.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Handle one dispatched event.
    ///
    /// `payload` is an arbitrary key/value mapping; interpretation belongs
    /// entirely to the subscriber. Malformed payloads should be ignored,
    /// not bubbled up - an `Err` here is logged by the dispatcher and does
    /// not abort delivery to the remaining subscribers.
    async fn handle_event(&self, event: EventType, payload: &Value) -> Result<bool>;

    /// One-time lifecycle hook, invoked when the coordinator initializes
    /// (not per-subscription). Failure is logged and does not block other
    /// subscribers from initializing.
    async fn on_init(&self) -> Result<()> {
        Ok(())
    }

    /// Name used in log lines when this subscriber misbehaves.
    fn name(&self) -> &str {
        "subscriber"
    }
}
