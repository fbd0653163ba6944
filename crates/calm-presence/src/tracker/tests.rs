use std::sync::Arc;
use std::time::Duration;

use calm_common::{ManualClock, SessionId};
use chrono::NaiveDate;

use super::*;
use crate::record::{parse_daily_stat, SessionStatus};
use crate::store::{MemoryClient, MemoryStore};

struct Harness {
    store: MemoryStore,
    client: Arc<MemoryClient>,
    clock: Arc<ManualClock>,
    tracker: PresenceTracker,
}

fn harness(start_ms: i64) -> Harness {
    let store = MemoryStore::new();
    let client = Arc::new(store.client());
    let clock = Arc::new(ManualClock::new(
        start_ms,
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    ));
    let tracker = PresenceTracker::new(
        client.clone(),
        clock.clone(),
        PresenceSettings::default(),
    );
    Harness {
        store,
        client,
        clock,
        tracker,
    }
}

fn session() -> SessionId {
    SessionId::parse("1000-testsession").unwrap()
}

fn record(store: &MemoryStore) -> SessionRecord {
    let value = store
        .read("sessions/1000-testsession")
        .unwrap()
        .expect("record present");
    serde_json::from_value(value).unwrap()
}

/// Let spawned tasks run until they block.
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Move the wall clock to `to_ms`, then let `by` of tokio time elapse.
async fn run_until(clock: &ManualClock, to_ms: i64, by: Duration) {
    clock.set_millis(to_ms);
    tokio::time::sleep(by).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn start_marks_online_and_arms_hook() {
    let h = harness(1_000);
    let handle = h.tracker.start(session());
    settle().await;

    assert_eq!(record(&h.store), SessionRecord::online(1_000, 1_000));
    assert_eq!(h.store.armed_hooks(), 1);
    assert_eq!(handle.session_id().as_str(), "1000-testsession");
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_refreshes_last_active() {
    let h = harness(1_000);
    let handle = h.tracker.start(session());
    settle().await;

    run_until(&h.clock, 4_000, Duration::from_millis(3_001)).await;
    let current = record(&h.store);
    assert!(current.is_online());
    assert_eq!(current.last_active, 4_000);
    assert_eq!(current.start_time, 1_000);
    assert_eq!(current.end_time, None);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_while_heartbeat_pending_writes_final_offline() {
    let h = harness(0);
    let handle = h.tracker.start(session());
    settle().await;

    // One heartbeat at 3000; the next is pending at 6000.
    run_until(&h.clock, 4_500, Duration::from_millis(4_500)).await;
    handle.stop().await;

    let stopped = record(&h.store);
    assert_eq!(stopped.status, SessionStatus::Offline);
    assert_eq!(stopped.end_time, Some(4_500));
    assert_eq!(stopped.last_active, 4_500);
    assert_eq!(h.store.armed_hooks(), 0);

    // Nothing lands afterwards: no heartbeat, no reaper, no hook.
    run_until(&h.clock, 30_000, Duration::from_secs(30)).await;
    assert_eq!(record(&h.store), stopped);
    assert_eq!(h.client.disconnect(), 0);
    assert_eq!(record(&h.store), stopped);
}

#[tokio::test(start_paused = true)]
async fn last_active_never_decreases() {
    let h = harness(10_000);
    let handle = h.tracker.start(session());
    settle().await;

    // Wall clock steps backwards.
    run_until(&h.clock, 8_000, Duration::from_millis(3_001)).await;
    assert_eq!(record(&h.store).last_active, 10_000);

    run_until(&h.clock, 15_000, Duration::from_millis(3_000)).await;
    assert_eq!(record(&h.store).last_active, 15_000);

    h.clock.set_millis(9_000);
    handle.stop().await;
    let stopped = record(&h.store);
    assert_eq!(stopped.last_active, 15_000);
    assert_eq!(stopped.end_time, Some(15_000));
}

#[tokio::test(start_paused = true)]
async fn offline_end_time_never_precedes_start() {
    let h = harness(5_000);
    let handle = h.tracker.start(session());
    settle().await;

    h.clock.set_millis(1_000);
    handle.stop().await;
    let stopped = record(&h.store);
    assert_eq!(stopped.status, SessionStatus::Offline);
    assert!(stopped.end_time.unwrap() >= stopped.start_time);
}

#[tokio::test(start_paused = true)]
async fn connection_loss_fires_hook_stamped_at_arm_time() {
    let h = harness(1_000);
    let handle = h.tracker.start(session());
    settle().await;

    h.clock.set_millis(2_000);
    assert_eq!(h.client.disconnect(), 1);

    let offline = record(&h.store);
    assert_eq!(offline.status, SessionStatus::Offline);
    assert_eq!(offline.end_time, Some(1_000));
    assert_eq!(offline.last_active, 1_000);
    assert_eq!(offline.start_time, 1_000);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeats_pause_while_disconnected() {
    let h = harness(1_000);
    let handle = h.tracker.start(session());
    settle().await;

    h.client.disconnect();
    let offline = record(&h.store);
    run_until(&h.clock, 7_000, Duration::from_millis(6_001)).await;
    assert_eq!(record(&h.store), offline);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_marks_online_again_and_rearms() {
    let h = harness(1_000);
    let handle = h.tracker.start(session());
    settle().await;

    h.client.disconnect();
    assert_eq!(h.store.armed_hooks(), 0);

    h.clock.set_millis(5_000);
    h.client.reconnect();
    settle().await;

    assert_eq!(record(&h.store), SessionRecord::online(1_000, 5_000));
    assert_eq!(h.store.armed_hooks(), 1);

    h.clock.set_millis(6_000);
    handle.stop().await;
    assert_eq!(record(&h.store), SessionRecord::offline(1_000, 6_000));
    assert_eq!(h.store.armed_hooks(), 0);
}

#[tokio::test(start_paused = true)]
async fn flips_between_polls_still_count_as_reconnects() {
    let h = harness(1_000);
    let handle = h.tracker.start(session());
    settle().await;

    // Several down/up cycles before the watcher runs collapse to one `true`.
    for at in [2_000, 3_000, 4_000] {
        h.clock.set_millis(at);
        assert_eq!(h.client.disconnect(), usize::from(at == 2_000));
        h.client.reconnect();
    }
    settle().await;

    assert_eq!(record(&h.store), SessionRecord::online(1_000, 4_000));
    assert_eq!(h.store.armed_hooks(), 1);

    h.clock.set_millis(4_500);
    assert_eq!(h.client.disconnect(), 1);
    assert_eq!(record(&h.store), SessionRecord::offline(1_000, 4_000));

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_leaves_hook_to_cover_the_record() {
    let h = harness(1_000);
    let handle = h.tracker.start(session());
    settle().await;

    drop(handle);
    settle().await;
    assert!(record(&h.store).is_online());
    assert_eq!(h.store.armed_hooks(), 1);

    h.client.disconnect();
    assert_eq!(record(&h.store).status, SessionStatus::Offline);
}

#[tokio::test(start_paused = true)]
async fn tracker_runs_reaper_and_aggregator() {
    let h = harness(0);
    h.store
        .write("sessions/ghost", SessionRecord::online(0, 0).to_value())
        .unwrap();

    let handle = h.tracker.start(session());
    settle().await;

    let peak = parse_daily_stat("2024-01-01", h.store.read("dailyStats/2024-01-01").unwrap().as_ref());
    assert_eq!(peak.map(|s| s.max_online), Some(2));

    // Heartbeats keep this session fresh while the ghost goes stale.
    run_until(&h.clock, 10_000, Duration::from_millis(10_001)).await;

    let ghost: SessionRecord =
        serde_json::from_value(h.store.read("sessions/ghost").unwrap().unwrap()).unwrap();
    assert_eq!(ghost.status, SessionStatus::Offline);
    assert_eq!(ghost.end_time, Some(10_000));
    assert!(record(&h.store).is_online());

    // The peak is not lowered by the ghost leaving.
    let peak = parse_daily_stat("2024-01-01", h.store.read("dailyStats/2024-01-01").unwrap().as_ref());
    assert_eq!(peak.map(|s| s.max_online), Some(2));

    handle.stop().await;
}
