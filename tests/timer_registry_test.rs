use std::time::{Duration, Instant};

use flume::Receiver;
use voicefuzzy::timers::{TimerEvent, TimerRegistry, TimerStatus};

fn drain(events: &Receiver<TimerEvent>) -> Vec<TimerEvent> {
    events.try_iter().collect()
}

fn at(t0: Instant, secs: u64) -> Instant {
    t0 + Duration::from_secs(secs)
}

#[test]
fn test_countdown_and_finish() {
    let t0 = Instant::now();
    let registry = TimerRegistry::new();
    let events = registry.subscribe();

    let tea = registry.add_at(5, Some("tea".into()), t0);
    let added = drain(&events);
    assert_eq!(added, vec![TimerEvent::Updated(vec![tea.clone()])]);

    registry.tick_at(at(t0, 2));
    match drain(&events).as_slice() {
        [TimerEvent::Updated(entries)] => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].remaining_secs, 3);
            assert_eq!(entries[0].status, TimerStatus::Running);
        }
        other => panic!("unexpected events {:?}", other),
    }

    registry.tick_at(at(t0, 5));
    match drain(&events).as_slice() {
        [TimerEvent::Finished(done), TimerEvent::Updated(entries)] => {
            assert_eq!(done.id, tea.id);
            assert_eq!(done.status, TimerStatus::Finished);
            assert_eq!(done.remaining_secs, 0);
            assert!(entries.is_empty());
        }
        other => panic!("unexpected events {:?}", other),
    }
    assert!(registry.is_empty());

    // nothing left, nothing published
    registry.tick_at(at(t0, 6));
    assert!(drain(&events).is_empty());
}

#[test]
fn test_finish_reported_once_alongside_survivors() {
    let t0 = Instant::now();
    let registry = TimerRegistry::new();
    let events = registry.subscribe();
    registry.add_at(3, Some("eggs".into()), t0);
    registry.add_at(60, Some("pasta".into()), t0);
    drain(&events);

    registry.tick_at(at(t0, 10));
    let batch = drain(&events);
    assert_eq!(batch.len(), 2);
    assert!(matches!(&batch[0], TimerEvent::Finished(e) if e.display_name() == "eggs"));
    match &batch[1] {
        TimerEvent::Updated(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].display_name(), "pasta");
            assert_eq!(entries[0].remaining_secs, 50);
        }
        other => panic!("unexpected event {:?}", other),
    }

    registry.tick_at(at(t0, 11));
    let batch = drain(&events);
    assert!(batch.iter().all(|e| matches!(e, TimerEvent::Updated(_))));
}

#[test]
fn test_paused_timer_does_not_finish() {
    let t0 = Instant::now();
    let registry = TimerRegistry::new();
    let events = registry.subscribe();
    let id = registry.add_at(10, None, t0).id;

    assert!(registry.pause_at(&id, at(t0, 4)));
    registry.tick_at(at(t0, 60));
    assert!(
        !drain(&events)
            .iter()
            .any(|e| matches!(e, TimerEvent::Finished(_)))
    );
    assert_eq!(registry.len(), 1);

    assert!(registry.resume_at(&id, at(t0, 60)));
    registry.tick_at(at(t0, 66));
    assert!(
        drain(&events)
            .iter()
            .any(|e| matches!(e, TimerEvent::Finished(t) if t.id == id))
    );
    assert!(registry.is_empty());
}

#[test]
fn test_cancel_publishes_snapshot() {
    let t0 = Instant::now();
    let registry = TimerRegistry::new();
    let events = registry.subscribe();
    let id = registry.add_at(30, Some("bread".into()), t0).id;
    drain(&events);

    assert!(registry.cancel(&id));
    assert_eq!(drain(&events), vec![TimerEvent::Updated(Vec::new())]);
    assert!(!registry.cancel(&id));
    assert!(drain(&events).is_empty());
}

#[test]
fn test_dropped_subscriber_is_pruned() {
    let t0 = Instant::now();
    let registry = TimerRegistry::new();
    let kept = registry.subscribe();
    drop(registry.subscribe());

    registry.add_at(5, None, t0);
    registry.tick_at(at(t0, 1));
    assert_eq!(drain(&kept).len(), 2);
}

#[test]
fn test_shutdown_disconnects() {
    let registry = TimerRegistry::new();
    let events = registry.subscribe();
    registry.add(60, None);
    drain(&events);

    registry.shutdown();
    assert!(registry.is_empty());
    assert!(events.recv().is_err());
}
