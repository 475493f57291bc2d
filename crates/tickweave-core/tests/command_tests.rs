use std::sync::Arc;
use std::time::Duration;
use tickweave_core::test_support::{wait_until, SimulatedHost};
use tickweave_core::{CommandBridge, CommandInvocation, OwnerId, SchedulerConfig, Session, SessionRegistry};

fn bridge() -> (Arc<SimulatedHost>, Arc<Session>, CommandBridge) {
    let host = SimulatedHost::new();
    let registry = SessionRegistry::new(host.clone(), SchedulerConfig::default());
    let session = registry.get_or_create(&OwnerId::new("warps")).unwrap();
    let bridge = CommandBridge::new(session.clone());
    (host, session, bridge)
}

fn invocation(args: &[&str]) -> CommandInvocation {
    CommandInvocation::new("Steve", "warp", args.iter().map(|a| a.to_string()).collect())
}

#[test]
fn test_command_answer_on_main_thread_is_real_result() {
    let (host, _session, bridge) = bridge();
    let callback = bridge.wrap_command(|invocation: CommandInvocation| async move {
        anyhow::Ok(!invocation.args.is_empty())
    });

    let answered = host.run_on_main(move || callback(invocation(&[])));

    assert!(!answered);
}

#[test]
fn test_suspending_command_answers_optimistically() {
    let (host, session, bridge) = bridge();
    let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let callback = {
        let (session, finished) = (session.clone(), finished.clone());
        bridge.wrap_command(move |_invocation: CommandInvocation| {
            let (session, finished) = (session.clone(), finished.clone());
            async move {
                session.delay(Duration::from_millis(10)).await;
                finished.store(true, std::sync::atomic::Ordering::SeqCst);
                anyhow::Ok(false)
            }
        })
    };

    let answered = host.run_on_main(move || callback(invocation(&["spawn"])));

    assert!(answered);
    assert!(wait_until(Duration::from_secs(5), || {
        finished.load(std::sync::atomic::Ordering::SeqCst)
    }));
}

#[test]
fn test_command_off_main_thread_answers_optimistically() {
    let (_host, session, bridge) = bridge();
    let callback = bridge.wrap_command(|_invocation: CommandInvocation| async { anyhow::Ok(false) });

    assert!(callback(invocation(&[])));
    assert!(wait_until(Duration::from_secs(5), || session.outstanding_tasks() == 0));
}

#[test]
fn test_failing_command_keeps_default_and_reports() {
    let (host, _session, bridge) = bridge();
    let callback = bridge.wrap_command(|_invocation: CommandInvocation| async {
        Err::<bool, _>(anyhow::anyhow!("unknown warp"))
    });

    let answered = host.run_on_main(move || callback(invocation(&["nowhere"])));

    assert!(answered);
    assert!(wait_until(Duration::from_secs(5), || host.exceptions().len() == 1));
    assert!(host.exceptions()[0].message.contains("unknown warp"));
}

#[test]
fn test_tab_completer_inline_and_suspended() {
    let (host, session, bridge) = bridge();
    let inline = bridge.wrap_tab_completer(|invocation: CommandInvocation| async move {
        let prefix = invocation.args.first().cloned().unwrap_or_default();
        anyhow::Ok(["spawn", "shop", "arena"]
            .iter()
            .filter(|warp| warp.starts_with(&prefix))
            .map(|warp| warp.to_string())
            .collect::<Vec<_>>())
    });
    let suspended = bridge.wrap_tab_completer(move |_invocation: CommandInvocation| {
        let session = session.clone();
        async move {
            session.delay(Duration::from_millis(5)).await;
            anyhow::Ok(vec!["late".to_string()])
        }
    });

    let (completed, late) = host.run_on_main(move || {
        (inline(invocation(&["s"])), suspended(invocation(&[])))
    });

    assert_eq!(completed, vec!["spawn".to_string(), "shop".to_string()]);
    assert!(late.is_empty());
}
