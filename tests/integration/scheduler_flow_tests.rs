//! Trigger gating around whole cycles.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use course_sentinel::scheduler::{shutdown_monitor, QuietHours, Scheduler, TriggerOutcome};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{harness, offset, snapshot, Harness, COURSE_101};

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

async fn ready_harness() -> Harness {
    let h = harness(&[COURSE_101]).await;
    h.extractor
        .set_snapshot(COURSE_101, snapshot("Algorithms", vec![("Week 1", Vec::new())]));
    h
}

#[tokio::test]
async fn trigger_outside_quiet_hours_runs_a_cycle() {
    let h = ready_harness().await;
    let clock = h.clock.clock();
    let gateway = Arc::clone(&h.gateway);
    let scheduler = Scheduler::new(
        Arc::new(Mutex::new(h.monitor)),
        QuietHours::new(hm(0, 30), hm(7, 30), offset()),
        clock,
    );

    let outcome = scheduler.trigger().await;

    let TriggerOutcome::Completed(report) = outcome else {
        panic!("expected a completed cycle, got {outcome:?}");
    };
    assert_eq!(report.checked, 1);
    assert!(!gateway.messages().is_empty());
}

#[tokio::test]
async fn trigger_inside_quiet_hours_does_nothing() {
    let h = ready_harness().await;
    let gateway = Arc::clone(&h.gateway);
    // 11:30 local falls inside 11:00-12:00.
    let scheduler = Scheduler::new(
        Arc::new(Mutex::new(h.monitor)),
        QuietHours::new(hm(11, 0), hm(12, 0), offset()),
        h.clock.clock(),
    );

    assert_eq!(scheduler.trigger().await, TriggerOutcome::QuietHours);
    assert!(gateway.messages().is_empty());
}

#[tokio::test]
async fn trigger_while_a_cycle_runs_is_suppressed() {
    let h = ready_harness().await;
    let monitor = Arc::new(Mutex::new(h.monitor));
    let scheduler = Scheduler::new(
        Arc::clone(&monitor),
        QuietHours::new(hm(0, 30), hm(7, 30), offset()),
        h.clock.clock(),
    );

    let guard = monitor.lock().await;
    assert_eq!(scheduler.trigger().await, TriggerOutcome::Suppressed);
    drop(guard);

    assert!(matches!(scheduler.trigger().await, TriggerOutcome::Completed(_)));
}

#[tokio::test]
async fn failed_cycle_is_reported_as_failed() {
    let h = ready_harness().await;
    h.browser.expire_session();
    h.browser.reject_submits(10);
    let scheduler = Scheduler::new(
        Arc::new(Mutex::new(h.monitor)),
        QuietHours::new(hm(0, 30), hm(7, 30), offset()),
        h.clock.clock(),
    );

    assert_eq!(scheduler.trigger().await, TriggerOutcome::Failed);
}

#[tokio::test]
async fn spawned_scheduler_fires_immediately_and_stops_on_cancel() {
    let h = ready_harness().await;
    let gateway = Arc::clone(&h.gateway);
    let monitor = Arc::new(Mutex::new(h.monitor));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&monitor),
        QuietHours::new(hm(0, 30), hm(7, 30), offset()),
        h.clock.clock(),
    ));
    let cancel = CancellationToken::new();

    let handle = scheduler.spawn(Duration::from_secs(3600), cancel.clone());
    for _ in 0..100 {
        if !gateway.messages().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    handle.await.expect("scheduler task");

    // Wait for the in-flight cycle to release the monitor.
    let monitor = monitor.lock().await;
    assert_eq!(monitor.state().courses.len(), 1);
    assert!(!gateway.messages().is_empty());
}

#[tokio::test]
async fn shutdown_gives_up_on_a_cycle_that_never_finishes() {
    let h = ready_harness().await;
    let browser = Arc::clone(&h.browser);
    let monitor = Arc::new(Mutex::new(h.monitor));

    let held = monitor.lock().await;
    let closed = shutdown_monitor(&monitor, Duration::from_millis(50)).await;

    assert!(!closed);
    assert!(browser.is_alive(), "context left for kill_on_drop");
    drop(held);
}

#[tokio::test]
async fn shutdown_closes_the_context_when_idle() {
    let h = ready_harness().await;
    let browser = Arc::clone(&h.browser);
    let monitor = Arc::new(Mutex::new(h.monitor));

    assert!(shutdown_monitor(&monitor, Duration::from_secs(1)).await);
    assert!(!browser.is_alive());
}
