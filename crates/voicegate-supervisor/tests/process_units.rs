#![cfg(unix)]

use std::time::Duration;
use tokio::time::Instant;
use voicegate_supervisor::{
    GroupOutcome, Launch, ProcessSpec, Supervisor, Unit, UnitExit, UnitFailure, UnitState,
};

fn boxed(specs: Vec<ProcessSpec>) -> Vec<Box<dyn Launch>> {
    specs
        .into_iter()
        .map(|spec| Box::new(spec) as Box<dyn Launch>)
        .collect()
}

fn sh(name: &str, script: &str) -> ProcessSpec {
    ProcessSpec::new(name, "sh").args(["-c", script])
}

fn sleeper(name: &str) -> ProcessSpec {
    ProcessSpec::new(name, "sleep").args(["30"])
}

async fn run_with_timeout(
    supervisor: Supervisor,
    specs: Vec<ProcessSpec>,
    shutdown_after: Option<Duration>,
) -> GroupOutcome {
    let shutdown = async move {
        match shutdown_after {
            Some(delay) => tokio::time::sleep(delay).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::time::timeout(
        Duration::from_secs(10),
        supervisor.run(boxed(specs), shutdown),
    )
    .await
    .expect("supervisor must return")
}

#[tokio::test]
async fn sigterm_stops_processes_cleanly() {
    let outcome = run_with_timeout(
        Supervisor::new(Duration::from_secs(5)),
        vec![sleeper("session"), sleeper("tokens")],
        Some(Duration::from_millis(100)),
    )
    .await;

    assert!(outcome.is_success(), "unexpected failure: {:?}", outcome.failure);
    for report in &outcome.units {
        assert_eq!(report.state, UnitState::Stopped);
        assert!(report.pid.is_some());
        assert_eq!(report.exit, Some(UnitExit::from_signal(libc::SIGTERM)));
    }
}

#[tokio::test]
async fn exiting_process_brings_down_the_group() {
    let outcome = run_with_timeout(
        Supervisor::new(Duration::from_secs(5)),
        vec![sleeper("session"), sh("tokens", "sleep 0.1; exit 3")],
        None,
    )
    .await;

    assert_eq!(
        outcome.failure,
        Some(UnitFailure::UnexpectedExit {
            unit: "tokens".to_string(),
            exit: Some(UnitExit::from_code(3)),
        })
    );
    assert_eq!(outcome.unit("session").unwrap().state, UnitState::Stopped);
}

#[tokio::test]
async fn process_ignoring_sigterm_is_killed() {
    let grace = Duration::from_millis(500);
    let started = Instant::now();

    let outcome = run_with_timeout(
        Supervisor::new(grace),
        vec![
            sh("stubborn", "trap '' TERM; while true; do sleep 0.1; done"),
            sleeper("tokens"),
        ],
        Some(Duration::from_millis(300)),
    )
    .await;

    assert!(started.elapsed() >= grace);
    assert_eq!(
        outcome.failure,
        Some(UnitFailure::GraceExceeded {
            unit: "stubborn".to_string()
        })
    );
    let stubborn = outcome.unit("stubborn").unwrap();
    assert_eq!(stubborn.state, UnitState::Killed);
    assert_eq!(stubborn.exit, Some(UnitExit::from_signal(libc::SIGKILL)));
    assert_eq!(outcome.unit("tokens").unwrap().state, UnitState::Stopped);
}

#[tokio::test]
async fn missing_program_is_a_launch_failure() {
    let outcome = run_with_timeout(
        Supervisor::new(Duration::from_secs(5)),
        vec![
            sleeper("session"),
            ProcessSpec::new("tokens", "/nonexistent/voicegate-server"),
        ],
        None,
    )
    .await;

    assert!(matches!(
        outcome.failure,
        Some(UnitFailure::LaunchFailed { ref unit, .. }) if unit == "tokens"
    ));
    assert_eq!(outcome.unit("session").unwrap().state, UnitState::Stopped);
}

#[tokio::test]
async fn environment_reaches_the_process() {
    let outcome = run_with_timeout(
        Supervisor::new(Duration::from_secs(5)),
        vec![sh("check", "test \"$VOICEGATE_UNIT\" = session && exit 7")
            .env("VOICEGATE_UNIT", "session")],
        None,
    )
    .await;

    assert_eq!(
        outcome.unit("check").unwrap().exit,
        Some(UnitExit::from_code(7))
    );
}

#[tokio::test]
async fn processes_get_their_own_process_group() {
    let unit = sleeper("session").launch().unwrap();
    let pid = unit.id().unwrap() as libc::pid_t;

    // SAFETY: getpgid/getpgrp only read process attributes.
    let (child_group, own_group) = unsafe { (libc::getpgid(pid), libc::getpgrp()) };
    assert_eq!(child_group, pid);
    assert_ne!(child_group, own_group);

    // Dropping the unit kills the child.
    drop(unit);
}
