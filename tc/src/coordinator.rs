//! The Task Coordinator
//!
//! Single owner of the subscription registry, the instruction queue, and the
//! timer loop. Tool handlers inject events through [`TaskCoordinator::dispatch`];
//! the timer loop injects synthetic timer events through the same path; both
//! fan out to every live subscription whose mask intersects the event.
//!
//! Dispatch passes are serialized through one gate, so subscriber code never
//! sees concurrent `handle_event` invocations from the same coordinator -
//! the engine is cooperative, not multi-threaded.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CoordError;
use crate::event::EventType;
use crate::registry::{Registry, SubscriptionId, TimerConfig};
use crate::subscriber::Subscriber;

/// Separator used when joining drained instructions.
const INSTRUCTION_SEPARATOR: &str = "\n\n";

/// The coordination engine. One instance per server process, created at
/// startup and passed by `Arc` to every component that needs to subscribe
/// or dispatch.
pub struct TaskCoordinator {
    pub(crate) registry: Mutex<Registry>,
    instructions: Mutex<VecDeque<String>>,
    /// Serializes dispatch passes. Do not call `dispatch` from inside a
    /// `handle_event` callback; queue an instruction instead.
    dispatch_gate: Mutex<()>,
    pub(crate) timer_wake: Notify,
    initialized: Mutex<bool>,
    timer_task: Mutex<Option<JoinHandle<()>>>,
}

impl TaskCoordinator {
    /// Create an empty coordinator. Call [`subscribe`](Self::subscribe) for
    /// each consumer, then [`init`](Self::init), then [`start`](Self::start).
    pub fn new() -> Arc<Self> {
        debug!("TaskCoordinator::new: creating coordinator");
        Arc::new(Self {
            registry: Mutex::new(Registry::default()),
            instructions: Mutex::new(VecDeque::new()),
            dispatch_gate: Mutex::new(()),
            timer_wake: Notify::new(),
            initialized: Mutex::new(false),
            timer_task: Mutex::new(None),
        })
    }

    /// Register `subscriber` against `mask`, optionally with a timer.
    ///
    /// The coordinator holds only a weak reference: the caller keeps the
    /// strong `Arc`, and dropping it is an implicit unsubscribe (observed on
    /// the next dispatch or timer tick). Duplicate subscriptions are
    /// permitted and deliver duplicate callbacks.
    pub async fn subscribe(
        &self,
        subscriber: &Arc<dyn Subscriber>,
        mask: EventType,
        timer: Option<TimerConfig>,
    ) -> Result<SubscriptionId, CoordError> {
        if let Some(t) = &timer
            && t.interval.is_zero()
        {
            return Err(CoordError::ZeroInterval);
        }

        let id = self
            .registry
            .lock()
            .await
            .insert(subscriber, mask, timer.as_ref(), Instant::now());

        if timer.is_some() {
            // Wake the timer loop so it picks up the new schedule
            self.timer_wake.notify_one();
        }

        debug!(id, %mask, "TaskCoordinator::subscribe");
        Ok(id)
    }

    /// Remove every subscription held by `subscriber`, timer-backed ones
    /// included. Idempotent: unsubscribing an unknown subscriber is a no-op.
    pub async fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) {
        let removed = self.registry.lock().await.remove_subscriber(subscriber);
        if removed > 0 {
            self.timer_wake.notify_one();
        }
        debug!(removed, "TaskCoordinator::unsubscribe");
    }

    /// Deliver `event` to every live subscription whose mask intersects it,
    /// in registration order. Returns the number of subscribers invoked.
    ///
    /// Dead weak references encountered along the way are pruned together
    /// with their timer entries. A subscriber that returns `Err` is logged
    /// and does not abort delivery to the rest - this is fan-out, not
    /// first-match-wins, and the advisory `handled` bool never short-circuits
    /// it either.
    pub async fn dispatch(&self, event: EventType, payload: &Value) -> usize {
        let _gate = self.dispatch_gate.lock().await;

        // Snapshot matches and release the registry lock before callbacks,
        // so handlers may re-enter subscribe/unsubscribe/queue_instruction.
        let targets = self.registry.lock().await.matching(event);
        debug!(%event, targets = targets.len(), "TaskCoordinator::dispatch");

        let mut invoked = 0usize;
        for (id, subscriber) in targets {
            match subscriber.handle_event(event, payload).await {
                Ok(handled) => {
                    debug!(id, %event, handled, "TaskCoordinator::dispatch: delivered");
                }
                Err(e) => {
                    warn!(
                        id,
                        %event,
                        subscriber = subscriber.name(),
                        error = %e,
                        "Subscriber failed handling event; continuing dispatch"
                    );
                }
            }
            invoked += 1;
        }

        invoked
    }

    /// Run every live subscriber's `on_init` hook, exactly once per
    /// subscriber object (not per subscription) and exactly once per
    /// coordinator. Call before any dispatch or timer activity. One
    /// subscriber's failure is logged and does not block the rest.
    pub async fn init(&self) {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            debug!("TaskCoordinator::init: already initialized, skipping");
            return;
        }
        *initialized = true;

        let subscribers = self.registry.lock().await.live_subscribers();
        info!(count = subscribers.len(), "TaskCoordinator::init: running startup hooks");

        for subscriber in subscribers {
            if let Err(e) = subscriber.on_init().await {
                warn!(
                    subscriber = subscriber.name(),
                    error = %e,
                    "Subscriber on_init failed; continuing startup"
                );
            }
        }
    }

    /// Spawn the timer loop. Errors if already running.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoordError> {
        let mut task = self.timer_task.lock().await;
        if task.is_some() {
            return Err(CoordError::TimerLoopRunning);
        }

        let coord = Arc::clone(self);
        *task = Some(tokio::spawn(crate::timer::run(coord)));
        info!("TaskCoordinator: timer loop started");
        Ok(())
    }

    /// Stop the timer loop. Safe to call when not running.
    pub async fn shutdown(&self) {
        if let Some(task) = self.timer_task.lock().await.take() {
            task.abort();
            info!("TaskCoordinator: timer loop stopped");
        }
    }

    /// Append a textual instruction for the client. It rides out on the next
    /// outgoing protocol response, whichever tool produces it - delivery is
    /// opportunistic, at-most-once, and best-effort on timing.
    pub async fn queue_instruction(&self, text: impl Into<String>) {
        let text = text.into();
        debug!(len = text.len(), "TaskCoordinator::queue_instruction");
        self.instructions.lock().await.push_back(text);
    }

    /// Atomically empty the instruction queue, joining entries into one
    /// string. Exact duplicates are dropped, keeping first-seen order.
    /// Returns `None` when the queue is empty.
    pub async fn drain_instructions(&self) -> Option<String> {
        let mut queue = self.instructions.lock().await;
        if queue.is_empty() {
            return None;
        }

        let mut seen: Vec<String> = Vec::with_capacity(queue.len());
        for text in queue.drain(..) {
            if !seen.contains(&text) {
                seen.push(text);
            }
        }

        debug!(count = seen.len(), "TaskCoordinator::drain_instructions");
        Some(seen.join(INSTRUCTION_SEPARATOR))
    }

    /// Number of instructions waiting for the next response.
    pub async fn pending_instruction_count(&self) -> usize {
        self.instructions.lock().await.len()
    }

    /// Number of registered subscriptions (dead entries may be counted until
    /// the next dispatch or tick prunes them).
    pub async fn subscription_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Number of subscriptions carrying a timer.
    pub async fn timer_count(&self) -> usize {
        self.registry.lock().await.timer_count()
    }
}
