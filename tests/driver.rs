//! Process driver tests. A shell script stands in for Maven and prints canned
//! Cucumber output, so these only run on unix.
#![cfg(unix)]

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use common::*;
use cukestream::config::CukeSettings;
use cukestream::run::{self, HostEvent, RecordingHost};
use cukestream::tree::RunTarget;
use cukestream::Error;

fn fake_maven(root: &Path, script: &str) -> String {
    let path = root.join("fake-mvn.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}", script)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}

fn settings_for(program: String) -> CukeSettings {
    CukeSettings {
        maven_command: Some(program),
        debug_attach_timeout_ms: 1000,
        ..CukeSettings::default()
    }
}

#[tokio::test]
async fn test_step_results_on_stderr_with_zero_exit() {
    let project = checkout_project();
    let features = cukestream::discovery::discover(project.path()).unwrap();
    let script = "\
echo 'Scenario: Pay by card' >&2
echo '  ✔ Given a cart with 2 items' >&2
echo '  ✘ When the user pays by card' >&2
echo '      java.lang.AssertionError: declined' >&2
echo '' >&2
exit 0
";
    let settings = settings_for(fake_maven(project.path(), script));
    let target = RunTarget::parse(&format!("{}:7", CHECKOUT_PATH)).unwrap();
    let mut host = RecordingHost::new();

    let outcome = run::run_target(&mut host, project.path(), &features, &target, &settings, false)
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, Some(0));
    assert!(outcome.failed());
    assert_eq!(host.final_state(&checkout(8)), Some("passed"));
    assert_eq!(host.final_state(&checkout(9)), Some("failed"));
    assert_eq!(host.final_state(&checkout(7)), Some("failed"));
    assert_eq!(
        outcome.steps[1].result.error_message.as_deref(),
        Some("java.lang.AssertionError: declined")
    );
}

#[tokio::test]
async fn test_maven_arguments_and_env_reach_process() {
    let project = checkout_project();
    let features = cukestream::discovery::discover(project.path()).unwrap();
    let script = "\
echo \"args: $*\"
echo \"profile: $SPRING_PROFILES_ACTIVE\"
exit 3
";
    let mut settings = settings_for(fake_maven(project.path(), script));
    settings.env.insert("SPRING_PROFILES_ACTIVE".to_string(), "ci".to_string());
    let target = RunTarget::parse(CHECKOUT_PATH).unwrap();
    let mut host = RecordingHost::new();

    let outcome = run::run_target(&mut host, project.path(), &features, &target, &settings, false)
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, Some(3));
    assert!(!outcome.failed());
    assert!(host.output[0].contains(&format!("-Dcucumber.features={}", CHECKOUT_PATH)));
    assert!(host.output[0].contains("-Dcucumber.plugin=pretty"));
    assert_eq!(host.output[1], "profile: ci");
}

#[tokio::test]
async fn test_debug_listener_reported() {
    let project = checkout_project();
    let features = cukestream::discovery::discover(project.path()).unwrap();
    let script = "\
echo 'Listening for transport dt_socket at address: 5005'
echo 'Scenario: Create order'
echo '  ✔ Given the service is up'
";
    let settings = settings_for(fake_maven(project.path(), script));
    let target = RunTarget::parse(API_PATH).unwrap();
    let mut host = RecordingHost::new();

    let outcome = run::run_target(&mut host, project.path(), &features, &target, &settings, true)
        .await
        .unwrap();

    assert!(host.events.contains(&HostEvent::DebuggerReady { port: 5005 }));
    assert_eq!(outcome.steps.len(), 1);
}

#[tokio::test]
async fn test_debug_timeout_falls_back_to_plain_run() {
    let project = checkout_project();
    let features = cukestream::discovery::discover(project.path()).unwrap();
    // Only the debug invocation hangs; the fallback run has no jdwp argument.
    let script = "\
case \"$*\" in
  *jdwp*) exec sleep 30 ;;
esac
echo 'Scenario: Create order'
echo '  ✔ Given the service is up'
";
    let settings = settings_for(fake_maven(project.path(), script));
    let target = RunTarget::parse(API_PATH).unwrap();

    let mut host = RecordingHost::new();
    let direct = run::run_target(&mut host, project.path(), &features, &target, &settings, true).await;
    assert!(matches!(direct, Err(Error::DebugAttachTimeout(1000))));

    let mut host = RecordingHost::new();
    let cancel = AtomicBool::new(false);
    let outcomes = run::run_items(
        &mut host,
        project.path(),
        &features,
        &[target],
        &settings,
        true,
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].1.steps.len(), 1);
    assert!(!host.events.iter().any(|e| matches!(e, HostEvent::DebuggerReady { .. })));

    // The abandoned debug attempt printed nothing, so only the fallback starts the scenario.
    let scenario = id(&format!("{}:3", API_PATH));
    let starts = host
        .events_for(&scenario)
        .into_iter()
        .filter(|e| matches!(e, HostEvent::Started { .. }))
        .count();
    assert_eq!(starts, 1);
    assert_eq!(host.final_state(&scenario), Some("passed"));
}

#[tokio::test]
async fn test_missing_program_is_spawn_error() {
    let project = checkout_project();
    let features = cukestream::discovery::discover(project.path()).unwrap();
    let settings = settings_for("/nonexistent/mvn".to_string());
    let target = RunTarget::parse(API_PATH).unwrap();
    let mut host = RecordingHost::new();

    let result = run::run_target(&mut host, project.path(), &features, &target, &settings, false).await;
    assert!(matches!(result, Err(Error::SpawnFailed { .. })));
}
