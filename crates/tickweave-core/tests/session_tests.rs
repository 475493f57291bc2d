//! Session lifecycle, supervision and failure boundary tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickweave_core::test_support::{init_test_logging, wait_until, SimThread, SimulatedHost};
use tickweave_core::{
    DispatchTarget, OwnerId, SchedulerConfig, SchedulingError, Session, SessionRegistry,
    ShutdownStrategy, StartMode, TaskCancelled, TaskPanicked, TaskState,
};

fn setup() -> (Arc<SimulatedHost>, SessionRegistry, Arc<Session>) {
    init_test_logging();
    let host = SimulatedHost::new();
    let registry = SessionRegistry::new(host.clone(), SchedulerConfig::default());
    let session = registry.get_or_create(&OwnerId::new("economy")).unwrap();
    (host, registry, session)
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_get_or_create_returns_same_session() {
    let (_host, registry, session) = setup();
    let again = registry.get_or_create(session.owner()).unwrap();
    assert!(Arc::ptr_eq(&session, &again));
    assert_eq!(registry.owners(), vec![OwnerId::new("economy")]);
}

#[test]
fn test_session_on_disabled_owner_is_rejected() {
    let (host, registry, _session) = setup();
    let owner = OwnerId::new("disabled-plugin");
    host.disable_owner(&owner);

    let err = registry.get_or_create(&owner).unwrap_err();
    assert_eq!(err, SchedulingError::SessionOnDisabledOwner { owner });
}

#[test]
fn test_existing_session_survives_owner_disable_until_disposed() {
    let (host, registry, session) = setup();
    host.disable_owner(session.owner());

    let same = registry.get_or_create(session.owner()).unwrap();
    assert!(Arc::ptr_eq(&session, &same));

    registry.dispose(session.owner());
    assert!(registry.get_or_create(session.owner()).is_err());
}

#[test]
fn test_dispose_then_recreate_yields_fresh_session() {
    let (_host, registry, session) = setup();
    registry.dispose(session.owner());
    assert!(session.is_disposed());
    assert!(registry.get(session.owner()).is_none());

    let fresh = registry.get_or_create(session.owner()).unwrap();
    assert!(!Arc::ptr_eq(&session, &fresh));
    assert!(!fresh.is_disposed());
}

#[test]
fn test_dispose_is_idempotent_and_launch_after_is_cancelled() {
    let (_host, registry, session) = setup();

    registry.dispose(session.owner());
    registry.dispose(session.owner());
    session.dispose();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let handle = session.launch(DispatchTarget::Unconfined, StartMode::Default, async move {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    assert!(handle.is_cancelled());
    assert_eq!(handle.join_blocking(), TaskState::Cancelled);
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn test_dispose_cancels_outstanding_tasks() {
    let (_host, _registry, session) = setup();

    let sleeper = session.clone();
    let long = session.launch(DispatchTarget::Unconfined, StartMode::Default, async move {
        sleeper.delay(Duration::from_secs(30)).await;
        Ok(())
    });
    let lazy = session.launch(DispatchTarget::Unconfined, StartMode::Lazy, async { Ok(()) });
    assert_eq!(session.outstanding_tasks(), 2);

    session.dispose();

    assert_eq!(long.join_blocking(), TaskState::Cancelled);
    assert_eq!(lazy.state(), TaskState::Cancelled);
    assert_eq!(session.outstanding_tasks(), 0);
}

#[test]
fn test_dispose_all_cancels_every_session() {
    let (_host, registry, economy) = setup();
    let shops = registry.get_or_create(&OwnerId::new("shops")).unwrap();

    let handles: Vec<_> = [&economy, &shops]
        .into_iter()
        .map(|session| {
            let sleeper = session.clone();
            session.launch(DispatchTarget::Unconfined, StartMode::Default, async move {
                sleeper.delay(Duration::from_secs(30)).await;
                Ok(())
            })
        })
        .collect();

    registry.dispose_all();

    for handle in &handles {
        assert_eq!(handle.join_blocking(), TaskState::Cancelled);
    }
    assert!(economy.is_disposed());
    assert!(shops.is_disposed());
    assert!(registry.owners().is_empty());
    assert!(registry.get(&OwnerId::new("economy")).is_none());
}

#[test]
fn test_shutdown_strategy_decides_disposal_on_owner_disable() {
    let (_host, registry, scheduled) = setup();
    let manual = registry.get_or_create(&OwnerId::new("manual")).unwrap();
    manual.set_shutdown_strategy(ShutdownStrategy::Manual);
    assert_eq!(scheduled.shutdown_strategy(), ShutdownStrategy::Scheduler);

    registry.on_owner_disabled(scheduled.owner());
    registry.on_owner_disabled(manual.owner());

    assert!(scheduled.is_disposed());
    assert!(!manual.is_disposed());

    manual.dispose();
    assert!(manual.is_disposed());
}

#[test]
fn test_config_strategy_applies_to_new_sessions() {
    let host = SimulatedHost::new();
    let config = SchedulerConfig::from_toml_str("shutdown_strategy = \"manual\"").unwrap();
    let registry = SessionRegistry::new(host, config);
    let session = registry.get_or_create(&OwnerId::new("a")).unwrap();

    assert_eq!(session.shutdown_strategy(), ShutdownStrategy::Manual);
    registry.on_owner_disabled(session.owner());
    assert!(!session.is_disposed());
}

#[test]
fn test_registry_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tickweave.toml");
    std::fs::write(
        &path,
        "shutdown_strategy = \"manual\"\n\n[timing]\ntick_millis = 25\n\n[logging]\ncancellation_level = \"trace\"\n",
    )
    .unwrap();

    let config = SchedulerConfig::load_from_file(&path).unwrap();
    let registry = SessionRegistry::new(SimulatedHost::new(), config);
    let session = registry.get_or_create(&OwnerId::new("a")).unwrap();

    assert_eq!(session.shutdown_strategy(), ShutdownStrategy::Manual);
    assert_eq!(session.ticks(4), Duration::from_millis(100));
}

// ============================================================================
// Start modes and handles
// ============================================================================

#[test]
fn test_lazy_task_waits_for_start() {
    let (_host, _registry, session) = setup();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();

    let handle = session.launch(DispatchTarget::Unconfined, StartMode::Lazy, async move {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(handle.state(), TaskState::New);
    assert!(!ran.load(Ordering::SeqCst));

    handle.start();
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(handle.state(), TaskState::Completed);
}

#[tokio::test]
async fn test_join_starts_lazy_task() {
    let (_host, _registry, session) = setup();
    let handle = session.launch(DispatchTarget::WorkerPool, StartMode::Lazy, async { Ok(()) });
    assert_eq!(handle.join().await, TaskState::Completed);
}

#[test]
fn test_cancel_single_task_leaves_sibling_running() {
    let (_host, _registry, session) = setup();

    let s = session.clone();
    let victim = session.launch(DispatchTarget::Unconfined, StartMode::Default, async move {
        s.delay(Duration::from_secs(30)).await;
        Ok(())
    });
    let s = session.clone();
    let sibling = session.launch(DispatchTarget::Unconfined, StartMode::Default, async move {
        s.delay(Duration::from_millis(30)).await;
        Ok(())
    });

    victim.cancel();
    assert_eq!(victim.join_blocking(), TaskState::Cancelled);
    assert_eq!(sibling.join_blocking(), TaskState::Completed);
    assert!(!session.is_disposed());
}

#[test]
fn test_body_returning_cancellation_ends_cancelled_without_notification() {
    let (host, _registry, session) = setup();

    let handle = session.launch(DispatchTarget::Unconfined, StartMode::Default, async {
        Err(anyhow::Error::new(TaskCancelled))
    });

    assert_eq!(handle.join_blocking(), TaskState::Cancelled);
    host.flush_main();
    assert!(host.exceptions().is_empty());
}

// ============================================================================
// Failure boundary
// ============================================================================

#[test]
fn test_failing_sibling_does_not_affect_others() {
    let (host, _registry, session) = setup();

    let failing = session.launch(DispatchTarget::Unconfined, StartMode::Default, async {
        Err(anyhow::anyhow!("database unreachable"))
    });
    let panicking = session.launch(DispatchTarget::Unconfined, StartMode::Default, async {
        if session_should_panic() {
            panic!("inventory corrupted");
        }
        Ok(())
    });
    let healthy = session.launch(DispatchTarget::WorkerPool, StartMode::Default, async { Ok(()) });

    assert_eq!(failing.join_blocking(), TaskState::Failed);
    assert_eq!(panicking.join_blocking(), TaskState::Failed);
    assert_eq!(healthy.join_blocking(), TaskState::Completed);

    // The session stays usable.
    let after = session.launch(DispatchTarget::MainThread, StartMode::Default, async { Ok(()) });
    assert_eq!(after.join_blocking(), TaskState::Completed);

    assert!(wait_until(Duration::from_secs(5), || host.exceptions().len() == 2));
    let messages: Vec<String> = host.exceptions().into_iter().map(|e| e.message).collect();
    assert!(messages.iter().any(|m| m.contains("database unreachable")));
    assert!(messages.iter().any(|m| m.contains("inventory corrupted")));
    assert!(host.exceptions().iter().all(|e| e.owner.as_str() == "economy"));
}

fn session_should_panic() -> bool {
    true
}

#[test]
fn test_exception_event_can_be_vetoed() {
    let (host, _registry, session) = setup();
    host.set_veto_exceptions(true);

    let handle = session.launch(DispatchTarget::Unconfined, StartMode::Default, async {
        Err(anyhow::anyhow!("quiet failure"))
    });
    assert_eq!(handle.join_blocking(), TaskState::Failed);

    assert!(wait_until(Duration::from_secs(5), || !host.exceptions().is_empty()));
    let recorded = host.exceptions();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].vetoed);
}

#[test]
fn test_failure_after_owner_disabled_skips_host_notification() {
    let (host, _registry, session) = setup();
    host.disable_owner(session.owner());

    let handle = session.launch(DispatchTarget::Unconfined, StartMode::Default, async {
        Err(anyhow::anyhow!("late failure"))
    });
    assert_eq!(handle.join_blocking(), TaskState::Failed);

    host.flush_main();
    assert!(host.exceptions().is_empty());
}

// ============================================================================
// Context switching and delays
// ============================================================================

#[test]
fn test_with_context_hops_and_returns_to_main() {
    let (host, _registry, session) = setup();
    let trail = Arc::new(Mutex::new(Vec::new()));

    let s = session.clone();
    let spy = host.clone();
    let record = trail.clone();
    let handle = session.launch(DispatchTarget::MainThread, StartMode::Default, async move {
        record.lock().push(spy.current_thread());

        let worker_spy = spy.clone();
        let answer = s
            .with_context(DispatchTarget::WorkerPool, async move {
                Ok((worker_spy.current_thread(), 42))
            })
            .await?;

        record.lock().push(answer.0);
        record.lock().push(spy.current_thread());
        assert_eq!(answer.1, 42);
        Ok(())
    });

    assert_eq!(handle.join_blocking(), TaskState::Completed);
    assert_eq!(
        *trail.lock(),
        vec![SimThread::Main, SimThread::Worker, SimThread::Main]
    );
}

#[tokio::test]
async fn test_with_context_surfaces_panic_and_error() {
    let (_host, _registry, session) = setup();

    let err = session
        .with_context(DispatchTarget::WorkerPool, async {
            if session_should_panic() {
                panic!("worker exploded");
            }
            Ok(0u32)
        })
        .await
        .unwrap_err();
    let panicked = err.downcast_ref::<TaskPanicked>().unwrap();
    assert!(panicked.message.contains("worker exploded"));

    let err = session
        .with_context(DispatchTarget::WorkerPool, async {
            Err::<u32, _>(anyhow::anyhow!("no such player"))
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no such player");
}

#[test]
fn test_cancelling_caller_cancels_context_child() {
    let (_host, _registry, session) = setup();

    let s = session.clone();
    let parent = session.launch(DispatchTarget::Unconfined, StartMode::Default, async move {
        let inner = s.clone();
        s.with_context(DispatchTarget::Unconfined, async move {
            inner.delay(Duration::from_secs(30)).await;
            Ok(())
        })
        .await
    });
    assert_eq!(session.outstanding_tasks(), 2);

    parent.cancel();
    assert_eq!(parent.join_blocking(), TaskState::Cancelled);
    assert!(wait_until(Duration::from_secs(5), || session.outstanding_tasks() == 0));
}

#[test]
fn test_delay_ticks_use_configured_tick_length() {
    let host = SimulatedHost::new();
    let config = SchedulerConfig::from_toml_str("[timing]\ntick_millis = 10").unwrap();
    let registry = SessionRegistry::new(host, config);
    let session = registry.get_or_create(&OwnerId::new("a")).unwrap();

    assert_eq!(session.ticks(3), Duration::from_millis(30));

    let s = session.clone();
    let started = std::time::Instant::now();
    let handle = session.launch(DispatchTarget::WorkerPool, StartMode::Default, async move {
        s.delay_ticks(2).await;
        Ok(())
    });
    assert_eq!(handle.join_blocking(), TaskState::Completed);
    assert!(started.elapsed() >= Duration::from_millis(20));
}
