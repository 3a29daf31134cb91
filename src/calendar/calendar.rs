// SPDX-License-Identifier: GPL-2.0-or-later

//! Calendar Scheduler: polls an iCalendar feed, filters for the configured
//! location, drops events already known or already past, and arms a timer
//! for each new qualifying event's start time. The feed fetch (HTTP GET plus
//! ICS parsing) is an external collaborator; this module only consumes the
//! already-parsed events it returns.

use async_trait::async_trait;
use common::time::{Duration, UnixNano};
use common::{ArcLogger, CalendarEvent, CalendarUid, LogEntry, LogLevel};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
#[error("fetch calendar feed: {0}")]
pub struct FetchError(pub String);

#[async_trait]
pub trait CalendarFeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CalendarEvent>, FetchError>;
}

#[async_trait]
pub trait CalendarHooks: Send + Sync {
    /// Invoked once, when a newly-seen event's start time arrives.
    async fn on_event_due(&self, event: CalendarEvent);

    /// Invoked after dedup, before an event is armed and its UID recorded as
    /// known. Returning `false` skips the event without marking it known, so
    /// it may be accepted on a later poll under a changed policy.
    async fn accepts(&self, _event: &CalendarEvent) -> bool {
        true
    }
}

pub struct DummyHooks;

#[async_trait]
impl CalendarHooks for DummyHooks {
    async fn on_event_due(&self, _event: CalendarEvent) {}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarConfig {
    pub locations: Vec<String>,
    pub poll_interval: Duration,
}

/// Spawns the poll loop. `token` scopes the loop itself and every armed
/// per-event timer it spawns.
pub fn spawn(
    source: Arc<dyn CalendarFeedSource>,
    config: CalendarConfig,
    hooks: Arc<dyn CalendarHooks>,
    logger: ArcLogger,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(source, config, hooks, logger, token))
}

async fn run(
    source: Arc<dyn CalendarFeedSource>,
    config: CalendarConfig,
    hooks: Arc<dyn CalendarHooks>,
    logger: ArcLogger,
    token: CancellationToken,
) {
    let mut known: HashSet<CalendarUid> = HashSet::new();

    loop {
        let Some(events) = fetch_with_backoff(&*source, &logger, &token).await else {
            return;
        };

        let now = UnixNano::now();
        for event in events {
            if !config.locations.iter().any(|l| *l == event.location) {
                continue;
            }
            if event.end_date.before(now) {
                continue;
            }
            if known.contains(&event.uid) {
                continue;
            }
            if !hooks.accepts(&event).await {
                continue;
            }
            known.insert(event.uid.clone());

            arm(event, hooks.clone(), token.child_token());
        }

        tokio::select! {
            () = token.cancelled() => return,
            () = tokio::time::sleep(config.poll_interval.as_std().unwrap_or_default()) => {}
        }
    }
}

fn arm(event: CalendarEvent, hooks: Arc<dyn CalendarHooks>, token: CancellationToken) {
    tokio::spawn(async move {
        let wait = Duration::until(event.start_date)
            .and_then(|d| d.as_std())
            .unwrap_or_default();

        tokio::select! {
            () = token.cancelled() => return,
            () = tokio::time::sleep(wait) => {}
        }

        hooks.on_event_due(event).await;
    });
}

/// Retries `source.fetch()` with a growing delay until it succeeds, or
/// returns `None` if `token` is cancelled first.
async fn fetch_with_backoff(
    source: &dyn CalendarFeedSource,
    logger: &ArcLogger,
    token: &CancellationToken,
) -> Option<Vec<CalendarEvent>> {
    let cap = Duration::from_secs(60);
    let mut delay = Duration::from_secs(1);

    loop {
        match source.fetch().await {
            Ok(events) => return Some(events),
            Err(e) => {
                logger.log(LogEntry::new(
                    LogLevel::Warning,
                    "calendar",
                    None,
                    format!("{e}, retrying"),
                ));
                tokio::select! {
                    () = token.cancelled() => return None,
                    () = tokio::time::sleep(delay.as_std().unwrap_or_default()) => {}
                }
                delay = delay.checked_add(Duration::from_secs(1)).unwrap_or(cap).min(cap);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::DummyLogger;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    fn event(uid: &str, location: &str, start_offset_secs: i64, end_offset_secs: i64) -> CalendarEvent {
        let now = UnixNano::now();
        CalendarEvent {
            uid: uid.to_owned().try_into().unwrap(),
            summary: "test".to_owned(),
            location: location.to_owned(),
            start_date: now.add_duration(Duration::from_nanos(start_offset_secs * 1_000_000_000)).unwrap(),
            end_date: now.add_duration(Duration::from_nanos(end_offset_secs * 1_000_000_000)).unwrap(),
        }
    }

    struct FixedFeedSource {
        events: Mutex<Vec<CalendarEvent>>,
    }

    #[async_trait]
    impl CalendarFeedSource for FixedFeedSource {
        async fn fetch(&self) -> Result<Vec<CalendarEvent>, FetchError> {
            Ok(self.events.lock().unwrap().clone())
        }
    }

    struct RecordingHooks {
        notify: Arc<Notify>,
        seen: Mutex<Vec<CalendarUid>>,
    }

    #[async_trait]
    impl CalendarHooks for RecordingHooks {
        async fn on_event_due(&self, event: CalendarEvent) {
            self.seen.lock().unwrap().push(event.uid);
            self.notify.notify_one();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn arms_new_event_and_fires_at_start_time() {
        let source = Arc::new(FixedFeedSource {
            events: Mutex::new(vec![event("evt-1", "garage", 5, 3600)]),
        });
        let notify = Arc::new(Notify::new());
        let hooks = Arc::new(RecordingHooks {
            notify: notify.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let token = CancellationToken::new();

        let _handle = spawn(
            source,
            CalendarConfig {
                locations: vec!["garage".to_owned()],
                poll_interval: Duration::from_secs(300),
            },
            hooks.clone(),
            DummyLogger::new(),
            token.clone(),
        );

        notify.notified().await;
        let expected: CalendarUid = "evt-1".to_owned().try_into().unwrap();
        assert_eq!(vec![expected], *hooks.seen.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_location_is_never_armed() {
        let source = Arc::new(FixedFeedSource {
            events: Mutex::new(vec![event("evt-1", "basement", 1, 3600)]),
        });
        let notify = Arc::new(Notify::new());
        let hooks = Arc::new(RecordingHooks {
            notify,
            seen: Mutex::new(Vec::new()),
        });
        let token = CancellationToken::new();

        let _handle = spawn(
            source,
            CalendarConfig {
                locations: vec!["garage".to_owned()],
                poll_interval: Duration::from_secs(300),
            },
            hooks.clone(),
            DummyLogger::new(),
            token.clone(),
        );

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(hooks.seen.lock().unwrap().is_empty());
    }

    struct RejectOnceHooks {
        notify: Arc<Notify>,
        seen: Mutex<Vec<CalendarUid>>,
        rejected_once: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl CalendarHooks for RejectOnceHooks {
        async fn on_event_due(&self, event: CalendarEvent) {
            self.seen.lock().unwrap().push(event.uid);
            self.notify.notify_one();
        }

        async fn accepts(&self, _event: &CalendarEvent) -> bool {
            !self.rejected_once.swap(true, std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_event_is_not_recorded_and_may_be_accepted_later() {
        let source = Arc::new(FixedFeedSource {
            events: Mutex::new(vec![event("evt-1", "garage", 1, 3600)]),
        });
        let notify = Arc::new(Notify::new());
        let hooks = Arc::new(RejectOnceHooks {
            notify: notify.clone(),
            seen: Mutex::new(Vec::new()),
            rejected_once: std::sync::atomic::AtomicBool::new(false),
        });
        let token = CancellationToken::new();

        let _handle = spawn(
            source,
            CalendarConfig {
                locations: vec!["garage".to_owned()],
                poll_interval: Duration::from_secs(5),
            },
            hooks.clone(),
            DummyLogger::new(),
            token.clone(),
        );

        // First poll rejects the event; it must not be armed nor marked known.
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        assert!(hooks.seen.lock().unwrap().is_empty());

        // Second poll accepts the same event, since it was never recorded known.
        notify.notified().await;
        let expected: CalendarUid = "evt-1".to_owned().try_into().unwrap();
        assert_eq!(vec![expected], *hooks.seen.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn past_event_is_dropped() {
        let source = Arc::new(FixedFeedSource {
            events: Mutex::new(vec![event("evt-1", "garage", -7200, -3600)]),
        });
        let notify = Arc::new(Notify::new());
        let hooks = Arc::new(RecordingHooks {
            notify,
            seen: Mutex::new(Vec::new()),
        });
        let token = CancellationToken::new();

        let _handle = spawn(
            source,
            CalendarConfig {
                locations: vec!["garage".to_owned()],
                poll_interval: Duration::from_secs(300),
            },
            hooks.clone(),
            DummyLogger::new(),
            token.clone(),
        );

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(hooks.seen.lock().unwrap().is_empty());
    }
}
