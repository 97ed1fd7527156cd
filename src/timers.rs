//! Live countdown timers.
//!
//! The registry owns every entry behind a single mutex. It never sleeps: an
//! external driver calls [`TimerRegistry::tick`] once per second. Changes are
//! published to subscribers as [`TimerEvent`]s over flume channels.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use uuid::Uuid;

use crate::duration::{MAX_TIMER_SECS, format_clock};
use crate::normalize::normalize_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEntry {
    pub id: String,
    pub name: Option<String>,
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub status: TimerStatus,
    /// Set only while running
    pub deadline: Option<Instant>,
}

impl TimerEntry {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("timer")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// Every live entry, ascending by remaining time
    Updated(Vec<TimerEntry>),
    Finished(TimerEntry),
}

#[derive(Default)]
struct Inner {
    timers: Vec<TimerEntry>,
    subscribers: Vec<Sender<TimerEvent>>,
}

impl Inner {
    fn publish(&mut self, event: TimerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn publish_snapshot(&mut self) {
        let snapshot = sorted(&self.timers);
        self.publish(TimerEvent::Updated(snapshot));
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.timers.iter().position(|t| t.id == id)
    }
}

#[derive(Default)]
pub struct TimerRegistry {
    inner: Mutex<Inner>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive every future snapshot and finish notification
    pub fn subscribe(&self) -> Receiver<TimerEvent> {
        let (tx, rx) = flume::unbounded();
        self.lock().subscribers.push(tx);
        rx
    }

    pub fn add(&self, duration_secs: u64, name: Option<String>) -> TimerEntry {
        self.add_at(duration_secs, name, Instant::now())
    }

    pub fn add_at(&self, duration_secs: u64, name: Option<String>, now: Instant) -> TimerEntry {
        let duration_secs = duration_secs.clamp(1, MAX_TIMER_SECS);
        let entry = TimerEntry {
            id: Uuid::new_v4().simple().to_string(),
            name,
            duration_secs,
            remaining_secs: duration_secs,
            status: TimerStatus::Running,
            deadline: deadline_after(now, duration_secs),
        };
        log::info!(
            "Timer '{}' started for {}",
            entry.display_name(),
            format_clock(duration_secs)
        );

        let mut inner = self.lock();
        inner.timers.push(entry.clone());
        inner.publish_snapshot();
        entry
    }

    pub fn cancel(&self, id: &str) -> bool {
        let mut inner = self.lock();
        let Some(index) = inner.position(id) else {
            return false;
        };
        let entry = inner.timers.remove(index);
        log::info!("Timer '{}' cancelled", entry.display_name());
        inner.publish_snapshot();
        true
    }

    /// Cancel the first timer whose normalized name equals `name`
    pub fn cancel_by_name(&self, name: &str) -> bool {
        let wanted = normalize_text(name);
        let id = {
            let inner = self.lock();
            inner
                .timers
                .iter()
                .find(|t| normalize_text(t.name.as_deref().unwrap_or("")) == wanted)
                .map(|t| t.id.clone())
        };
        id.is_some_and(|id| self.cancel(&id))
    }

    pub fn pause(&self, id: &str) -> bool {
        self.pause_at(id, Instant::now())
    }

    pub fn pause_at(&self, id: &str, now: Instant) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.timers.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        if entry.status != TimerStatus::Running {
            return false;
        }
        if let Some(deadline) = entry.deadline.take() {
            entry.remaining_secs = remaining_until(deadline, now);
        }
        entry.status = TimerStatus::Paused;
        inner.publish_snapshot();
        true
    }

    pub fn resume(&self, id: &str) -> bool {
        self.resume_at(id, Instant::now())
    }

    pub fn resume_at(&self, id: &str, now: Instant) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.timers.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        if entry.status != TimerStatus::Paused {
            return false;
        }
        entry.deadline = deadline_after(now, entry.remaining_secs);
        entry.status = TimerStatus::Running;
        inner.publish_snapshot();
        true
    }

    pub fn tick(&self) {
        self.tick_at(Instant::now());
    }

    /// Advance running entries to `now`. Finished entries leave the live set
    /// and are reported one by one before the refreshed snapshot.
    pub fn tick_at(&self, now: Instant) {
        let mut inner = self.lock();
        if inner.timers.is_empty() {
            return;
        }

        refresh(&mut inner.timers, now);
        let (finished, live): (Vec<_>, Vec<_>) = inner
            .timers
            .drain(..)
            .partition(|t| t.status == TimerStatus::Finished);
        inner.timers = live;

        for entry in &finished {
            log::info!("Timer '{}' finished", entry.display_name());
            inner.publish(TimerEvent::Finished(entry.clone()));
        }
        if !finished.is_empty() || !inner.timers.is_empty() {
            inner.publish_snapshot();
        }
    }

    /// Live entries, ascending by remaining time
    pub fn list(&self) -> Vec<TimerEntry> {
        self.list_at(Instant::now())
    }

    /// Expired entries are left out; the next tick reports and removes them
    pub fn list_at(&self, now: Instant) -> Vec<TimerEntry> {
        let mut inner = self.lock();
        refresh(&mut inner.timers, now);
        let mut live = sorted(&inner.timers);
        live.retain(|t| t.status != TimerStatus::Finished);
        live
    }

    pub fn len(&self) -> usize {
        self.lock().timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One-line summary of the timer closest to finishing
    pub fn describe_status(&self) -> String {
        self.describe_status_at(Instant::now())
    }

    pub fn describe_status_at(&self, now: Instant) -> String {
        match self.list_at(now).first() {
            None => "No active timers".to_string(),
            Some(next) => format!(
                "{} left until {}",
                format_clock(next.remaining_secs),
                next.display_name()
            ),
        }
    }

    /// Drop every entry and disconnect subscribers
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.timers.clear();
        inner.subscribers.clear();
        log::debug!("Timer registry shut down");
    }
}

/// Recompute remaining time of running entries; mark expired ones finished
fn refresh(timers: &mut [TimerEntry], now: Instant) {
    for entry in timers.iter_mut() {
        if entry.status != TimerStatus::Running {
            continue;
        }
        let Some(deadline) = entry.deadline else {
            continue;
        };
        entry.remaining_secs = remaining_until(deadline, now);
        if entry.remaining_secs == 0 {
            entry.status = TimerStatus::Finished;
            entry.deadline = None;
        }
    }
}

fn sorted(timers: &[TimerEntry]) -> Vec<TimerEntry> {
    let mut snapshot = timers.to_vec();
    snapshot.sort_by_key(|t| t.remaining_secs);
    snapshot
}

/// `now + secs`; `None` only if the clock cannot represent it
fn deadline_after(now: Instant, secs: u64) -> Option<Instant> {
    now.checked_add(Duration::from_secs(secs))
}

/// Whole seconds left, rounded up
fn remaining_until(deadline: Instant, now: Instant) -> u64 {
    let left = deadline.saturating_duration_since(now);
    left.as_secs() + u64::from(left.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_rounds_up() {
        let now = Instant::now();
        assert_eq!(remaining_until(now + Duration::from_millis(1500), now), 2);
        assert_eq!(remaining_until(now + Duration::from_secs(3), now), 3);
        assert_eq!(remaining_until(now, now + Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_add_floors_duration() {
        let registry = TimerRegistry::new();
        let entry = registry.add(0, None);
        assert_eq!(entry.duration_secs, 1);
        assert_eq!(entry.status, TimerStatus::Running);
        assert_eq!(entry.id.len(), 32);
    }

    #[test]
    fn test_add_clamps_oversize_duration() {
        let now = Instant::now();
        let registry = TimerRegistry::new();
        let entry = registry.add_at(u64::MAX, Some("forever".into()), now);
        assert_eq!(entry.duration_secs, MAX_TIMER_SECS);
        assert_eq!(entry.deadline, Some(now + Duration::from_secs(MAX_TIMER_SECS)));

        assert!(registry.pause_at(&entry.id, now));
        assert!(registry.resume_at(&entry.id, now));
        assert_eq!(registry.list_at(now)[0].remaining_secs, MAX_TIMER_SECS);
    }

    #[test]
    fn test_expired_entry_hidden_until_tick() {
        let now = Instant::now();
        let registry = TimerRegistry::new();
        let events = registry.subscribe();
        registry.add_at(5, Some("tea".into()), now);
        registry.add_at(60, Some("soup".into()), now);

        let later = now + Duration::from_secs(6);
        let live = registry.list_at(later);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].display_name(), "soup");
        assert_eq!(registry.describe_status_at(later), "00:54 left until soup");

        events.try_iter().for_each(drop);
        registry.tick_at(later);
        let finished: Vec<_> = events
            .try_iter()
            .filter_map(|e| match e {
                TimerEvent::Finished(t) => Some(t.display_name().to_string()),
                TimerEvent::Updated(_) => None,
            })
            .collect();
        assert_eq!(finished, ["tea"]);
    }

    #[test]
    fn test_snapshot_sorted() {
        let now = Instant::now();
        let registry = TimerRegistry::new();
        registry.add_at(300, Some("tea".into()), now);
        registry.add_at(60, Some("eggs".into()), now);
        registry.add_at(120, None, now);
        let names: Vec<_> = registry
            .list_at(now)
            .iter()
            .map(|t| t.display_name().to_string())
            .collect();
        assert_eq!(names, ["eggs", "timer", "tea"]);
    }

    #[test]
    fn test_pause_resume_state_rules() {
        let now = Instant::now();
        let registry = TimerRegistry::new();
        let id = registry.add_at(10, None, now).id;

        assert!(!registry.resume_at(&id, now));
        assert!(registry.pause_at(&id, now + Duration::from_secs(4)));
        assert!(!registry.pause_at(&id, now + Duration::from_secs(5)));

        let paused = &registry.list_at(now + Duration::from_secs(100))[0];
        assert_eq!(paused.remaining_secs, 6);
        assert_eq!(paused.deadline, None);

        assert!(registry.resume_at(&id, now + Duration::from_secs(100)));
        let running = &registry.list_at(now + Duration::from_secs(102))[0];
        assert_eq!(running.remaining_secs, 4);
        assert!(!registry.pause("missing"));
    }

    #[test]
    fn test_cancel_by_name_normalizes() {
        let registry = TimerRegistry::new();
        registry.add(60, Some("Чай Ёлка".into()));
        assert!(!registry.cancel_by_name("coffee"));
        assert!(registry.cancel_by_name("  чай  елка "));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_describe_status() {
        let now = Instant::now();
        let registry = TimerRegistry::new();
        assert_eq!(registry.describe_status_at(now), "No active timers");
        registry.add_at(90, Some("pasta".into()), now);
        assert_eq!(registry.describe_status_at(now), "01:30 left until pasta");
    }
}
