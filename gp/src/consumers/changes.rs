//! Cached change-list reader
//!
//! Subscribes to [`EventType::CHANGE_LIST`] deliveries (the JSON output of
//! the external change-tracking tool, run by the client) and to a recurring
//! refresh timer. Parsed items carry derived filter flags; the cache expires
//! after a TTL, after which readers see no data and the timer queues a
//! refresh-request instruction instead of serving stale items.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use taskcoord::{EventType, Subscriber, TaskCoordinator, TimerConfig};

/// Instruction queued when the cache needs refreshing.
const REFRESH_INSTRUCTION: &str = "The change list is stale. Run the change-tracking tool and report its JSON \
     output with the report_change_list tool.";

/// One change entry with derived filter flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeItem {
    /// Change identifier
    pub name: String,

    /// Completed step count
    pub completed: u64,

    /// Total step count
    pub total: u64,

    /// No steps defined yet
    pub is_draft: bool,

    /// All steps complete
    pub is_done: bool,

    /// Started or startable: some steps defined, not all complete. Includes
    /// `completed == 0` - a fresh item with zero completed steps is in
    /// progress, not invisible.
    pub is_in_progress: bool,
}

impl ChangeItem {
    /// Derive the filter flags from the raw counters.
    pub fn new(name: impl Into<String>, completed: u64, total: u64) -> Self {
        Self {
            name: name.into(),
            completed,
            total,
            is_draft: total == 0,
            is_done: total > 0 && completed == total,
            is_in_progress: total > 0 && completed < total,
        }
    }
}

/// Raw wire shape of one change entry.
#[derive(Debug, Deserialize)]
struct RawChange {
    name: String,
    #[serde(default)]
    completed: u64,
    #[serde(default)]
    total: u64,
}

struct Cached {
    items: Vec<ChangeItem>,
    fetched_instant: Instant,
    fetched_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    cache: Option<Cached>,
    /// When the outstanding refresh request was queued, if one is in flight
    outstanding_since: Option<Instant>,
    /// First-tick suppression: the first timer fire is deliberately ignored
    first_tick_seen: bool,
}

/// The change-list cache subscriber.
pub struct ChangesReader {
    coordinator: Arc<TaskCoordinator>,
    ttl: Duration,
    request_timeout: Duration,
    inner: Mutex<Inner>,
}

impl ChangesReader {
    pub fn new(coordinator: Arc<TaskCoordinator>, ttl: Duration, request_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            ttl,
            request_timeout,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Event mask this reader subscribes with: content deliveries plus its
    /// own refresh timer.
    pub fn mask() -> EventType {
        EventType::CHANGE_LIST | EventType::TIMER | EventType::CHANGES_REFRESH
    }

    /// Timer attached to the subscription.
    pub fn timer(interval: Duration) -> TimerConfig {
        TimerConfig::recurring(interval, EventType::CHANGES_REFRESH)
    }

    /// Cached items, or `None` once the cache is missing or past its TTL.
    /// Stale data is never served; staleness triggers a refresh request on
    /// the next timer tick instead.
    pub async fn current(&self) -> Option<Vec<ChangeItem>> {
        let inner = self.inner.lock().await;
        let cached = inner.cache.as_ref()?;
        if cached.fetched_instant.elapsed() >= self.ttl {
            return None;
        }
        Some(cached.items.clone())
    }

    /// Wall-clock time of the last successful fetch.
    pub async fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().await.cache.as_ref().map(|c| c.fetched_at)
    }

    async fn on_content(&self, payload: &Value) -> bool {
        let raw: Vec<RawChange> = match serde_json::from_value(payload.get("changes").cloned().unwrap_or(Value::Null))
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "ChangesReader: ignoring malformed change list payload");
                return false;
            }
        };

        let items: Vec<ChangeItem> = raw
            .into_iter()
            .map(|r| ChangeItem::new(r.name, r.completed, r.total))
            .collect();
        debug!(count = items.len(), "ChangesReader: cache refreshed");

        let mut inner = self.inner.lock().await;
        inner.cache = Some(Cached {
            items,
            fetched_instant: Instant::now(),
            fetched_at: Utc::now(),
        });
        // The outstanding request, if any, is hereby answered
        inner.outstanding_since = None;
        true
    }

    async fn on_timer(&self) -> bool {
        let mut inner = self.inner.lock().await;

        if !inner.first_tick_seen {
            // The interval doubles as the initial delay; skip the first fire
            inner.first_tick_seen = true;
            debug!("ChangesReader: suppressing first timer tick");
            return false;
        }

        // Single-active-task discipline: one refresh request at a time. An
        // expired request is logged and cleared so the reader recovers.
        if let Some(since) = inner.outstanding_since {
            if since.elapsed() < self.request_timeout {
                debug!("ChangesReader: refresh request still outstanding");
                return false;
            }
            warn!(
                elapsed_secs = since.elapsed().as_secs(),
                "ChangesReader: outstanding refresh request timed out, clearing"
            );
            inner.outstanding_since = None;
        }

        let fresh = inner
            .cache
            .as_ref()
            .is_some_and(|c| c.fetched_instant.elapsed() < self.ttl);
        if fresh {
            return false;
        }

        inner.outstanding_since = Some(Instant::now());
        drop(inner);

        debug!("ChangesReader: cache stale, queueing refresh request");
        self.coordinator.queue_instruction(REFRESH_INSTRUCTION).await;
        true
    }
}

#[async_trait]
impl Subscriber for ChangesReader {
    async fn handle_event(&self, event: EventType, payload: &Value) -> Result<bool> {
        if event.intersects(EventType::CHANGE_LIST) {
            return Ok(self.on_content(payload).await);
        }
        if event.contains(EventType::TIMER) && event.contains(EventType::CHANGES_REFRESH) {
            return Ok(self.on_timer().await);
        }
        Ok(false)
    }

    fn name(&self) -> &str {
        "changes-reader"
    }
}
