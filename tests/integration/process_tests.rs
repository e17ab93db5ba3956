//! Integration tests for building, spawning, and terminating real
//! processes. Fake servers are `/bin/sh` scripts.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use chat_conformance::models::{DiscoveryMode, LanguageTarget, LifecycleState};
use chat_conformance::orchestrator::builder::build_server;
use chat_conformance::orchestrator::spawner::spawn_server;
use chat_conformance::orchestrator::{Launcher, ProcessLauncher, ServerHandle};
use chat_conformance::AppError;
use nix::sys::signal::kill;
use nix::unistd::Pid;

fn write_server(dir: &Path, body: &str) {
    let path = dir.join("chat_server");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
}

/// Script prologue that records the shell's pid; `exec` keeps it.
const RECORD_PID: &str = "echo $$ > server.pid";

fn recorded_pid(dir: &Path) -> Pid {
    let raw = std::fs::read_to_string(dir.join("server.pid")).expect("pid file");
    Pid::from_raw(raw.trim().parse().expect("numeric pid"))
}

fn assert_process_gone(pid: Pid) {
    assert!(
        kill(pid, None).is_err(),
        "server process {pid} must be stopped and reaped"
    );
}

fn dynamic_target(dir: &Path, startup_timeout: Duration) -> LanguageTarget {
    LanguageTarget {
        name: "sh".into(),
        working_directory: dir.to_path_buf(),
        discovery: DiscoveryMode::Dynamic { startup_timeout },
        build_command: vec!["sh".into(), "-c".into(), "exit 0".into()],
        server_binary: "./chat_server".into(),
    }
}

#[tokio::test]
async fn build_success() {
    let temp = tempfile::tempdir().expect("tempdir");
    let target = dynamic_target(temp.path(), Duration::from_secs(1));
    build_server(&target).await.expect("build passes");
}

#[tokio::test]
async fn build_runs_in_working_directory() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut target = dynamic_target(temp.path(), Duration::from_secs(1));
    target.build_command = vec!["sh".into(), "-c".into(), "touch built.marker".into()];

    build_server(&target).await.expect("build passes");
    assert!(temp.path().join("built.marker").exists());
}

#[tokio::test]
async fn build_failure_captures_stderr() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut target = dynamic_target(temp.path(), Duration::from_secs(1));
    target.build_command = vec![
        "sh".into(),
        "-c".into(),
        "echo noise; echo 'server.c:3: error' >&2; exit 2".into(),
    ];

    let err = build_server(&target).await.expect_err("build fails");
    match err {
        AppError::Build(stderr) => assert_eq!(stderr, "server.c:3: error"),
        other => panic!("expected build error, got {other}"),
    }
}

#[tokio::test]
async fn build_failure_without_stderr_reports_status() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut target = dynamic_target(temp.path(), Duration::from_secs(1));
    target.build_command = vec!["sh".into(), "-c".into(), "exit 7".into()];

    let err = build_server(&target).await.expect_err("build fails");
    assert!(err.to_string().contains("exited with code 7"), "{err}");
}

#[tokio::test]
async fn missing_build_tool_is_a_build_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut target = dynamic_target(temp.path(), Duration::from_secs(1));
    target.build_command = vec!["definitely-not-a-build-tool-3f9a".into()];

    let err = build_server(&target).await.expect_err("no such tool");
    assert!(matches!(err, AppError::Build(_)));
}

#[tokio::test]
async fn dynamic_discovery_reads_first_stdout_line() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_server(temp.path(), "echo '[::]:4321'\necho 'later output'\nexec sleep 30");
    let target = dynamic_target(temp.path(), Duration::from_secs(5));

    let mut server = spawn_server(&target).await.expect("spawned");
    assert_eq!(server.address().port, 4321);
    assert_eq!(server.address().host, "[::]");
    assert_eq!(server.state(), LifecycleState::Spawned);

    server.terminate().await;
    assert_eq!(server.state(), LifecycleState::Terminated);
    assert!(server.pid().is_none(), "process must be reaped");

    server.terminate().await;
    assert_eq!(server.state(), LifecycleState::Terminated);
}

#[tokio::test]
async fn dynamic_server_receives_port_zero() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_server(temp.path(), "echo \"127.0.0.1:1$1\"\nexec sleep 30");
    let target = dynamic_target(temp.path(), Duration::from_secs(5));

    let mut server = spawn_server(&target).await.expect("spawned");
    assert_eq!(server.address().port, 10);
    server.terminate().await;
}

#[tokio::test]
async fn early_exit_is_a_discovery_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_server(temp.path(), &format!("{RECORD_PID}\nexit 0"));
    let target = dynamic_target(temp.path(), Duration::from_secs(5));

    let err = spawn_server(&target).await.expect_err("no address");
    assert!(matches!(err, AppError::AddressDiscovery(_)), "{err}");
    assert!(err.to_string().contains("failed to read server address"));
    assert_process_gone(recorded_pid(temp.path()));
}

#[tokio::test]
async fn silent_server_times_out_and_is_stopped() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_server(temp.path(), &format!("{RECORD_PID}\nexec sleep 30"));
    let target = dynamic_target(temp.path(), Duration::from_millis(200));

    let started = Instant::now();
    let err = spawn_server(&target).await.expect_err("timeout");
    assert!(err.to_string().contains("did not announce"), "{err}");
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "discovery timeout must not wait for the server"
    );
    assert_process_gone(recorded_pid(temp.path()));
}

#[tokio::test]
async fn garbage_address_line_is_a_discovery_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_server(
        temp.path(),
        &format!("{RECORD_PID}\necho 'listening soon'\nexec sleep 30"),
    );
    let target = dynamic_target(temp.path(), Duration::from_secs(5));

    let err = spawn_server(&target).await.expect_err("bad line");
    assert!(matches!(err, AppError::AddressDiscovery(_)), "{err}");
    assert_process_gone(recorded_pid(temp.path()));
}

#[tokio::test]
async fn server_survives_binary_stdout_after_address() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_server(
        temp.path(),
        &format!(
            "{RECORD_PID}\necho 127.0.0.1:5100\nprintf '\\377\\n'\nsleep 0.5\n\
             i=0; while [ $i -lt 2000 ]; do echo filler; i=$((i+1)); done\n\
             touch alive\nexec sleep 30"
        ),
    );
    let target = dynamic_target(temp.path(), Duration::from_secs(5));

    let mut server = spawn_server(&target).await.expect("spawned");
    let marker = temp.path().join("alive");
    let deadline = Instant::now() + Duration::from_secs(5);
    while !marker.exists() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert!(marker.exists(), "server died writing to stdout");
    let pid = recorded_pid(temp.path());
    assert!(kill(pid, None).is_ok(), "server must still be running");

    server.terminate().await;
    assert_process_gone(pid);
}

#[tokio::test]
async fn missing_server_binary_is_a_spawn_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let target = dynamic_target(temp.path(), Duration::from_secs(1));

    let err = spawn_server(&target).await.expect_err("no binary");
    assert!(matches!(err, AppError::Spawn(_)), "{err}");
}

#[tokio::test]
async fn fixed_discovery_assumes_requested_port() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_server(temp.path(), "exec sleep 30");
    let mut target = dynamic_target(temp.path(), Duration::from_secs(1));
    target.discovery = DiscoveryMode::Fixed {
        port: 8123,
        startup_delay: Duration::from_millis(50),
    };

    let mut server = spawn_server(&target).await.expect("spawned");
    assert_eq!(server.address().port, 8123);
    assert_eq!(server.address().dial_target(), ("localhost", 8123));
    server.terminate().await;
}

#[tokio::test]
async fn fixed_server_exiting_during_delay_is_a_spawn_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_server(temp.path(), "exit 1");
    let mut target = dynamic_target(temp.path(), Duration::from_secs(1));
    target.discovery = DiscoveryMode::Fixed {
        port: 8124,
        startup_delay: Duration::from_millis(300),
    };

    let err = spawn_server(&target).await.expect_err("exited");
    assert!(err.to_string().contains("exited during startup"), "{err}");
}

#[tokio::test]
async fn server_ignoring_sigterm_is_killed_after_grace() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_server(
        temp.path(),
        "trap '' TERM\necho 127.0.0.1:5000\nwhile :; do sleep 1; done",
    );
    let target = dynamic_target(temp.path(), Duration::from_secs(5));

    let mut server = spawn_server(&target).await.expect("spawned");
    server.terminate().await;
    assert_eq!(server.state(), LifecycleState::Terminated);
    assert!(server.pid().is_none());
}

#[tokio::test]
async fn process_launcher_drives_build_and_spawn() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut target = dynamic_target(temp.path(), Duration::from_secs(5));
    target.build_command = vec![
        "sh".into(),
        "-c".into(),
        "printf '#!/bin/sh\\necho 127.0.0.1:6553\\nexec sleep 30\\n' > chat_server && chmod +x chat_server"
            .into(),
    ];

    let launcher = ProcessLauncher;
    launcher.build(&target).await.expect("build");
    let mut server = launcher.spawn(&target).await.expect("spawn");
    assert_eq!(ServerHandle::address(&server).port, 6553);
    ServerHandle::terminate(&mut server).await;
    assert_eq!(ServerHandle::state(&server), LifecycleState::Terminated);
}
