//! The timer loop
//!
//! A single cooperative task that sleeps until the earliest scheduled fire,
//! synthesizes `TIMER | bits` events for everything due, and pushes them
//! through the normal dispatch path. Recurring timers are rescheduled
//! anchored to their scheduled fire time; one-shot timers are removed after
//! firing. With no timer subscriptions the loop parks until `subscribe`
//! wakes it.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use crate::coordinator::TaskCoordinator;

/// Timer loop body, spawned by [`TaskCoordinator::start`]. Runs until the
/// task is aborted by [`TaskCoordinator::shutdown`].
pub(crate) async fn run(coord: Arc<TaskCoordinator>) {
    debug!("timer loop: running");

    loop {
        let next = coord.registry.lock().await.next_timer_fire();

        let Some(next) = next else {
            // No timers scheduled - park until one is added
            coord.timer_wake.notified().await;
            continue;
        };

        tokio::select! {
            _ = sleep_until(next) => {
                fire_due(&coord).await;
            }
            _ = coord.timer_wake.notified() => {
                // Schedule changed (subscribe/unsubscribe) - recompute
                debug!("timer loop: schedule changed, recomputing");
            }
        }
    }
}

/// Dispatch every due timer, then reschedule or remove each one.
async fn fire_due(coord: &Arc<TaskCoordinator>) {
    let now = Instant::now();
    let due = coord.registry.lock().await.collect_due(now);

    if due.is_empty() {
        return;
    }
    debug!(count = due.len(), "timer loop: firing due timers");

    // Timer events carry an empty key/value payload
    let payload = Value::Object(Map::new());

    for fire in due {
        coord.dispatch(fire.event, &payload).await;
        coord.registry.lock().await.finish_fire(fire.id, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::registry::TimerConfig;
    use crate::subscriber::Subscriber;
    use async_trait::async_trait;
    use eyre::Result;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::advance;

    /// Records every event it receives.
    struct Recorder {
        events: Mutex<Vec<EventType>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn events(&self) -> Vec<EventType> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Subscriber for Recorder {
        async fn handle_event(&self, event: EventType, _payload: &Value) -> Result<bool> {
            self.events.lock().unwrap().push(event);
            Ok(true)
        }
    }

    fn as_dyn(recorder: &Arc<Recorder>) -> Arc<dyn Subscriber> {
        Arc::clone(recorder) as Arc<dyn Subscriber>
    }

    /// Let the spawned timer loop catch up with the paused clock.
    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_timer_fires_once_per_interval() {
        let coord = TaskCoordinator::new();
        let recorder = Recorder::new();

        coord
            .subscribe(
                &as_dyn(&recorder),
                EventType::TIMER | EventType::CHANGE_LIST,
                Some(TimerConfig::recurring(Duration::from_secs(60), EventType::NONE)),
            )
            .await
            .unwrap();
        coord.start().await.unwrap();
        settle().await;

        // Nothing before the interval elapses
        advance(Duration::from_secs(59)).await;
        settle().await;
        assert!(recorder.events().is_empty());

        // Exactly one fire at the interval, TIMER set, no content bit
        advance(Duration::from_secs(1)).await;
        settle().await;
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].contains(EventType::TIMER));
        assert!(!events[0].intersects(EventType::CHANGE_LIST));

        // A content event arrives as a distinct delivery
        coord.dispatch(EventType::CHANGE_LIST, &json!({"items": []})).await;
        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], EventType::CHANGE_LIST);

        // Next interval, next fire - never twice without an interval between
        advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(recorder.events().len(), 3);

        coord.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_exactly_once() {
        let coord = TaskCoordinator::new();
        let recorder = Recorder::new();

        coord
            .subscribe(
                &as_dyn(&recorder),
                EventType::TIMER,
                Some(TimerConfig::one_shot(Duration::from_secs(10), EventType::NONE)),
            )
            .await
            .unwrap();
        coord.start().await.unwrap();
        settle().await;

        advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(recorder.events().len(), 1);

        // No further fires, and the subscription is gone
        advance(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(coord.subscription_count().await, 0);

        coord.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_bits_identify_the_timer() {
        let coord = TaskCoordinator::new();
        let broad = Recorder::new();
        let specific = Recorder::new();

        // `specific` owns the refresh timer; `broad` matches any timer fire
        coord
            .subscribe(&as_dyn(&broad), EventType::TIMER, None)
            .await
            .unwrap();
        coord
            .subscribe(
                &as_dyn(&specific),
                EventType::TIMER | EventType::CHANGES_REFRESH,
                Some(TimerConfig::recurring(
                    Duration::from_secs(30),
                    EventType::CHANGES_REFRESH,
                )),
            )
            .await
            .unwrap();
        coord.start().await.unwrap();
        settle().await;

        advance(Duration::from_secs(30)).await;
        settle().await;

        // Both received the fire; the event names its timer
        assert_eq!(broad.events().len(), 1);
        assert_eq!(specific.events().len(), 1);
        assert!(specific.events()[0].contains(EventType::CHANGES_REFRESH));

        coord.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_shifts_first_fire() {
        let coord = TaskCoordinator::new();
        let recorder = Recorder::new();

        coord
            .subscribe(
                &as_dyn(&recorder),
                EventType::TIMER,
                Some(
                    TimerConfig::recurring(Duration::from_secs(10), EventType::NONE)
                        .with_initial_delay(Duration::from_secs(3)),
                ),
            )
            .await
            .unwrap();
        coord.start().await.unwrap();
        settle().await;

        advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(recorder.events().len(), 1);

        advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(recorder.events().len(), 2);

        coord.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_subscriber_pruned_on_tick() {
        let coord = TaskCoordinator::new();
        let recorder = Recorder::new();

        coord
            .subscribe(
                &as_dyn(&recorder),
                EventType::TIMER,
                Some(TimerConfig::recurring(Duration::from_secs(5), EventType::NONE)),
            )
            .await
            .unwrap();
        coord.start().await.unwrap();
        settle().await;

        drop(recorder);
        assert_eq!(coord.subscription_count().await, 1);

        // The tick observes the dead reference and prunes without dispatch
        advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(coord.subscription_count().await, 0);

        coord.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_added_while_loop_parked() {
        let coord = TaskCoordinator::new();
        let recorder = Recorder::new();

        // Start with no timers - the loop parks
        coord.start().await.unwrap();
        settle().await;

        coord
            .subscribe(
                &as_dyn(&recorder),
                EventType::TIMER,
                Some(TimerConfig::recurring(Duration::from_secs(7), EventType::NONE)),
            )
            .await
            .unwrap();
        settle().await;

        advance(Duration::from_secs(7)).await;
        settle().await;
        assert_eq!(recorder.events().len(), 1);

        coord.shutdown().await;
    }
}
