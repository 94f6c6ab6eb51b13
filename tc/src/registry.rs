//! Subscription storage and the timer schedule
//!
//! The registry maps each subscription to a weak subscriber reference, an
//! event mask, and an optional timer. It is owned by the coordinator behind
//! a single lock; the dispatcher and timer loop both prune entries whose
//! subscriber has been dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::event::EventType;
use crate::subscriber::Subscriber;

/// Opaque handle identifying one subscription.
pub type SubscriptionId = u64;

/// Caller-facing timer request, attached to a subscription.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Interval between fires.
    pub interval: Duration,

    /// Delay before the first fire. Defaults to `interval`.
    pub initial_delay: Option<Duration>,

    /// Fire repeatedly, or once and then drop the subscription's timer.
    pub recurring: bool,

    /// Extra bits carried on this timer's synthetic events, alongside
    /// [`EventType::TIMER`], so subscribers can tell timers apart.
    pub bits: EventType,
}

impl TimerConfig {
    /// A recurring timer firing every `interval`.
    pub fn recurring(interval: Duration, bits: EventType) -> Self {
        Self {
            interval,
            initial_delay: None,
            recurring: true,
            bits,
        }
    }

    /// A timer that fires once after `interval`.
    pub fn one_shot(interval: Duration, bits: EventType) -> Self {
        Self {
            interval,
            initial_delay: None,
            recurring: false,
            bits,
        }
    }

    /// Override the delay before the first fire.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }
}

/// Scheduled state for a timed subscription.
#[derive(Debug, Clone)]
pub(crate) struct TimerSpec {
    pub interval: Duration,
    pub next_fire: Instant,
    pub recurring: bool,
    pub bits: EventType,
}

impl TimerSpec {
    fn from_config(config: &TimerConfig, now: Instant) -> Self {
        let delay = config.initial_delay.unwrap_or(config.interval);
        Self {
            interval: config.interval,
            next_fire: now + delay,
            recurring: config.recurring,
            bits: config.bits,
        }
    }
}

/// One registered (subscriber, mask, timer) entry.
pub(crate) struct Subscription {
    pub id: SubscriptionId,
    pub subscriber: Weak<dyn Subscriber>,
    pub mask: EventType,
    pub timer: Option<TimerSpec>,
}

/// A timer fire collected for this tick.
pub(crate) struct DueTimer {
    pub id: SubscriptionId,
    pub event: EventType,
}

/// The subscription table. Iteration order is registration order, which is
/// also the dispatch delivery order.
#[derive(Default)]
pub(crate) struct Registry {
    subs: Vec<Subscription>,
    next_id: SubscriptionId,
}

impl Registry {
    /// Insert a subscription. Duplicates are permitted and independent:
    /// subscribing the same object twice delivers callbacks twice.
    pub fn insert(
        &mut self,
        subscriber: &Arc<dyn Subscriber>,
        mask: EventType,
        timer: Option<&TimerConfig>,
        now: Instant,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = self.next_id;

        let timer = timer.map(|t| TimerSpec::from_config(t, now));
        debug!(id, %mask, has_timer = timer.is_some(), "Registry::insert");

        self.subs.push(Subscription {
            id,
            subscriber: Arc::downgrade(subscriber),
            mask,
            timer,
        });

        id
    }

    /// Remove every subscription whose subscriber is the given object
    /// (pointer identity). Removing a timed subscription removes its timer
    /// entry with it. Idempotent: unknown or dead subscribers are a no-op.
    pub fn remove_subscriber(&mut self, subscriber: &Arc<dyn Subscriber>) -> usize {
        let target = Arc::downgrade(subscriber);
        let before = self.subs.len();
        self.subs.retain(|s| !Weak::ptr_eq(&s.subscriber, &target));
        let removed = before - self.subs.len();
        if removed > 0 {
            debug!(removed, "Registry::remove_subscriber");
        }
        removed
    }

    /// Remove one subscription by id.
    pub fn remove_id(&mut self, id: SubscriptionId) {
        self.subs.retain(|s| s.id != id);
    }

    /// Collect live subscribers matching `event`, in registration order,
    /// pruning entries whose subscriber has been dropped. This is the
    /// primary garbage-collection point for dead subscribers.
    pub fn matching(&mut self, event: EventType) -> Vec<(SubscriptionId, Arc<dyn Subscriber>)> {
        let mut out = Vec::new();
        let mut dead = 0usize;

        self.subs.retain(|s| {
            if !s.mask.intersects(event) {
                return true;
            }
            match s.subscriber.upgrade() {
                Some(strong) => {
                    out.push((s.id, strong));
                    true
                }
                None => {
                    dead += 1;
                    false
                }
            }
        });

        if dead > 0 {
            debug!(dead, %event, "Registry::matching: pruned dead subscriptions");
        }
        out
    }

    /// Unique live subscriber objects, pruning dead entries. Used by the
    /// coordinator's one-time init pass: one `on_init` per object, however
    /// many subscriptions it holds.
    pub fn live_subscribers(&mut self) -> Vec<Arc<dyn Subscriber>> {
        let mut out: Vec<Arc<dyn Subscriber>> = Vec::new();

        self.subs.retain(|s| match s.subscriber.upgrade() {
            Some(strong) => {
                if !out.iter().any(|seen| Arc::ptr_eq(seen, &strong)) {
                    out.push(strong);
                }
                true
            }
            None => false,
        });

        out
    }

    /// Earliest scheduled fire across all timer subscriptions.
    pub fn next_timer_fire(&self) -> Option<Instant> {
        self.subs
            .iter()
            .filter_map(|s| s.timer.as_ref().map(|t| t.next_fire))
            .min()
    }

    /// Collect the timers due at `now`, pruning dead timer subscriptions.
    /// Rescheduling happens separately in [`Registry::finish_fire`], after
    /// the fire has been dispatched.
    pub fn collect_due(&mut self, now: Instant) -> Vec<DueTimer> {
        let mut due = Vec::new();

        self.subs.retain(|s| {
            let Some(timer) = &s.timer else { return true };
            if timer.next_fire > now {
                return true;
            }
            if s.subscriber.strong_count() == 0 {
                debug!(id = s.id, "Registry::collect_due: pruning dead timer subscription");
                return false;
            }
            due.push(DueTimer {
                id: s.id,
                event: EventType::TIMER | timer.bits,
            });
            true
        });

        due
    }

    /// Finalize a fired timer: one-shot subscriptions are removed, recurring
    /// ones are rescheduled anchored to the scheduled fire time
    /// (`next_fire += interval`, advanced until in the future) so cadence
    /// never drifts under load and a late tick fires at most once.
    pub fn finish_fire(&mut self, id: SubscriptionId, now: Instant) {
        let Some(pos) = self.subs.iter().position(|s| s.id == id) else {
            // Unsubscribed during its own dispatch
            return;
        };

        let remove = {
            let sub = &mut self.subs[pos];
            match &mut sub.timer {
                Some(timer) if timer.recurring => {
                    timer.next_fire += timer.interval;
                    while timer.next_fire <= now {
                        timer.next_fire += timer.interval;
                    }
                    false
                }
                _ => true,
            }
        };

        if remove {
            debug!(id, "Registry::finish_fire: removing one-shot timer subscription");
            self.subs.remove(pos);
        }
    }

    /// Number of live-or-unpruned subscriptions.
    pub fn len(&self) -> usize {
        self.subs.len()
    }

    /// Number of subscriptions carrying a timer.
    pub fn timer_count(&self) -> usize {
        self.subs.iter().filter(|s| s.timer.is_some()).count()
    }
}
