//! Integration tests for the focus session lifecycle.
//!
//! Drives the public service API end to end: start, timer fire, completion
//! pipeline, persistence and notifications, plus the concurrency guarantees
//! between start, cancel and the completion timer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ascend_core::integrations::{LogSink, NoopBadgeHook};
use ascend_core::progression::session_xp;
use ascend_core::storage::{SessionLog, UserStore};
use ascend_core::{
    CompletionPipeline, Config, Database, FixedClock, FocusService, MemoryStore, Notification,
    ProgressionRules, SessionRegistry, StartError,
};
use chrono::{TimeZone, Utc};

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

fn memory_service() -> (FocusService, Arc<MemoryStore>, Arc<LogSink>) {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(LogSink::new());
    let pipeline = CompletionPipeline::new(
        store.clone(),
        store.clone(),
        sink.clone(),
        Arc::new(NoopBadgeHook),
    );
    // Fixed wall clock keeps every session on the same local day.
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap(),
    ));
    let service = FocusService::with_clock(Config::default().focus, pipeline, clock);
    (service, store, sink)
}

#[tokio::test(start_paused = true)]
async fn test_completed_session_persists_and_notifies() {
    let db = Arc::new(Database::open_memory().unwrap());
    let sink = Arc::new(LogSink::new());
    let service = FocusService::from_config(
        &Config::default(),
        db.clone(),
        db.clone(),
        sink.clone(),
        Arc::new(NoopBadgeHook),
    );

    let handle = service
        .start_focus_session("42", "guild", "focus-room", 25)
        .unwrap();
    assert_eq!(service.active_session_count(), 1);
    assert_eq!(
        service.get_active_session("42").unwrap().session_id,
        handle.session_id
    );

    tokio::time::sleep(minutes(26)).await;

    assert_eq!(service.active_session_count(), 0);
    let record = db.load("42").await.unwrap().unwrap();
    assert_eq!(record.xp, 45);
    assert_eq!(record.streak_days, 1);
    assert_eq!(record.study_minutes_total, 25);

    let logged = db
        .completed_between(
            "guild",
            handle.started_at - chrono::Duration::days(1),
            handle.started_at + chrono::Duration::days(1),
        )
        .await
        .unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].xp_earned, 45);

    let sent = sink.deliveries();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0].notification,
        Notification::SessionCompleted { user_id, duration_minutes: 25, .. } if user_id == "42"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_session_grants_nothing() {
    let (service, store, sink) = memory_service();

    service.start_focus_session("u1", "g", "c", 30).unwrap();
    tokio::time::sleep(minutes(10)).await;
    assert!(service.cancel_focus_session("u1"));
    assert!(!service.cancel_focus_session("u1"));

    tokio::time::sleep(minutes(60)).await;
    assert!(store.user("u1").is_none());
    assert!(store.sessions().is_empty());
    assert!(sink.deliveries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_expires_after_five_minutes() {
    let (service, _, _) = memory_service();

    service.start_focus_session("u1", "g", "c", 5).unwrap();
    service.cancel_focus_session("u1");

    match service.start_focus_session("u1", "g", "c", 5) {
        Err(StartError::OnCooldown { remaining_ms }) => {
            assert!(remaining_ms > 0 && remaining_ms <= 300_000)
        }
        other => panic!("expected cooldown, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(service.cooldown_remaining("u1"), 0);
    assert!(service.start_focus_session("u1", "g", "c", 5).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_sessions_build_streak_and_level() {
    let (service, store, sink) = memory_service();

    // 25 + 20 = 45 XP, then 25 + 20 + 5 = 50 XP on the same day (streak 1 bonus)
    service.start_focus_session("u1", "g", "c", 25).unwrap();
    tokio::time::sleep(minutes(26)).await;
    service.start_focus_session("u1", "g", "c", 25).unwrap();
    tokio::time::sleep(minutes(26)).await;

    let record = store.user("u1").unwrap();
    assert_eq!(record.xp, 95);
    assert_eq!(record.streak_days, 1);
    assert_eq!(record.study_minutes_total, 50);
    assert_eq!(record.level, 0);

    service.start_focus_session("u1", "g", "c", 5).unwrap();
    tokio::time::sleep(minutes(6)).await;

    let record = store.user("u1").unwrap();
    assert_eq!(record.xp, 125);
    assert_eq!(record.level, 1);
    assert!(sink
        .deliveries()
        .iter()
        .any(|d| matches!(d.notification, Notification::LevelUp { new_level: 1, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_frees_slot_without_xp() {
    let store = Arc::new(MemoryStore::new());
    store.fail_save(true);
    let pipeline = CompletionPipeline::new(
        store.clone(),
        store.clone(),
        Arc::new(LogSink::new()),
        Arc::new(NoopBadgeHook),
    );
    let service = FocusService::new(Default::default(), pipeline);

    service.start_focus_session("u1", "g", "c", 5).unwrap();
    tokio::time::sleep(minutes(6)).await;

    assert_eq!(service.active_session_count(), 0);
    assert_eq!(store.user("u1").unwrap().xp, 0);
    assert!(store.sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_at_fire_instant_is_exclusive() {
    // First-ever session: no streak bonus yet.
    let expected_xp = session_xp(5, 0, &ProgressionRules::default());
    let (mut cancel_wins, mut timer_wins) = (0, 0);

    for offset_ms in [0u64, 1, 2] {
        let (service, store, _) = memory_service();
        service.start_focus_session("u1", "g", "c", 5).unwrap();

        tokio::time::sleep(minutes(5) - Duration::from_millis(1) + Duration::from_millis(offset_ms))
            .await;
        let cancelled = service.cancel_focus_session("u1");
        tokio::time::sleep(minutes(1)).await;

        let xp = store.user("u1").map(|u| u.xp).unwrap_or(0);
        if cancelled {
            cancel_wins += 1;
            assert_eq!(xp, 0, "cancel won but XP was granted");
        } else {
            timer_wins += 1;
            assert_eq!(xp, expected_xp, "timer won but completion did not run once");
        }
        assert_eq!(service.active_session_count(), 0);
    }

    assert!(cancel_wins >= 1, "cancel before the deadline must win");
    assert!(timer_wins >= 1, "cancel after the deadline must lose");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_same_user_single_winner() {
    let (service, _, _) = memory_service();
    let service = Arc::new(service);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            service.start_focus_session("u1", "g", "c", 25).is_ok()
        }));
    }

    let mut wins = 0;
    for task in tasks {
        if task.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(service.active_session_count(), 1);
    assert_eq!(service.shutdown(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_distinct_users_all_admitted() {
    let (service, _, _) = memory_service();
    let service = Arc::new(service);

    let mut tasks = Vec::new();
    for i in 0..32 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            service
                .start_focus_session(&format!("user-{i}"), "g", "c", 25)
                .is_ok()
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert_eq!(service.active_session_count(), 32);
    assert_eq!(service.active_users().len(), 32);
    assert_eq!(service.shutdown(), 32);
    assert_eq!(service.active_session_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_cancel_race_leaves_consistent_state() {
    for _ in 0..50 {
        let registry = Arc::new(SessionRegistry::default());
        let fired = Arc::new(AtomicUsize::new(0));

        let starter = {
            let registry = registry.clone();
            let fired = fired.clone();
            tokio::spawn(async move {
                registry
                    .start("u1", "g", "c", 5, move |_| async move {
                        fired.fetch_add(1, Ordering::SeqCst);
                    })
                    .is_ok()
            })
        };
        let canceller = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.cancel("u1") })
        };

        let started = starter.await.unwrap();
        let cancelled = canceller.await.unwrap();
        assert!(started);
        if cancelled {
            assert_eq!(registry.count(), 0);
        } else {
            assert_eq!(registry.count(), 1);
        }
        registry.cancel_all();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
