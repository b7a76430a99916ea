//! Integration tests for the graceful-shutdown sequence.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tmux_supervisor::lifecycle::{graceful_shutdown, ServerScope};
use tmux_supervisor::process;
use tmux_supervisor::tmux::TmuxCli;
use tokio::process::Command;

use super::test_helpers::FakeMux;

#[tokio::test]
async fn missing_session_runs_every_step_without_error() {
    let mux = FakeMux::new();

    graceful_shutdown(mux.as_ref(), "sup-ghost", "sup-ghost", Duration::from_millis(100), ServerScope::Dedicated).await;

    assert_eq!(
        mux.calls(),
        vec![
            "pane-pid sup-ghost sup-ghost",
            "send-keys sup-ghost sup-ghost key C-c",
            "kill-session sup-ghost sup-ghost",
            "kill-server sup-ghost",
        ]
    );
}

#[tokio::test]
async fn repeated_shutdown_is_idempotent() {
    let mux = FakeMux::new();
    mux.add_session("sup-a1", "sup-a1");

    graceful_shutdown(mux.as_ref(), "sup-a1", "sup-a1", Duration::from_millis(50), ServerScope::Dedicated).await;
    graceful_shutdown(mux.as_ref(), "sup-a1", "sup-a1", Duration::from_millis(50), ServerScope::Dedicated).await;

    assert!(!mux.exists("sup-a1", "sup-a1"));
    assert_eq!(mux.count("kill-session"), 2);
}

#[tokio::test]
async fn shared_socket_keeps_its_server_and_other_sessions() {
    let mux = FakeMux::new();
    mux.add_session("sup", "target");
    mux.add_session("sup", "bystander");

    graceful_shutdown(mux.as_ref(), "sup", "target", Duration::from_millis(50), ServerScope::Shared)
        .await;

    assert!(!mux.exists("sup", "target"));
    assert!(mux.exists("sup", "bystander"));
    assert_eq!(mux.count("kill-server"), 0);
}

#[tokio::test]
async fn unreachable_multiplexer_is_tolerated() {
    let mux = TmuxCli::new("/nonexistent/tmux-binary", Duration::from_secs(1));

    let started = Instant::now();
    graceful_shutdown(&mux, "sup-a1", "sup-a1", Duration::from_millis(100), ServerScope::Dedicated).await;

    assert!(started.elapsed() < Duration::from_secs(5));
}

#[cfg(unix)]
#[tokio::test]
async fn surviving_root_process_is_force_killed() {
    let mut child = Command::new("sleep")
        .arg("30")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("spawn sleep");
    let pid = i32::try_from(child.id().expect("pid")).expect("pid fits");

    let mux = FakeMux::new();
    mux.add_session("sup-a1", "sup-a1");
    mux.set_pane_pid(Some(pid));

    let started = Instant::now();
    graceful_shutdown(mux.as_ref(), "sup-a1", "sup-a1", Duration::from_millis(200), ServerScope::Dedicated).await;

    assert!(started.elapsed() >= Duration::from_millis(200), "grace period skipped");
    let status = tokio::time::timeout(Duration::from_secs(2), child.wait())
        .await
        .expect("child reaped")
        .expect("wait");
    assert!(!status.success());
    assert!(!process::is_alive(pid));
}
