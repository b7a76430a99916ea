//! Integration tests for process-tree discovery and teardown using real
//! `sh` and `sleep` processes.

#![cfg(unix)]

use std::process::Stdio;
use std::time::Duration;

use serial_test::serial;
use tmux_supervisor::process;
use tokio::process::{Child, Command};

/// Spawn `sh -c script`. Stdin stays an open pipe, so a `read` in the
/// script blocks until the child is dropped.
fn spawn(script: &str) -> (Child, i32) {
    let child = Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .expect("spawn sh");
    let pid = i32::try_from(child.id().expect("pid")).expect("pid fits");
    (child, pid)
}

/// Poll until `pid` has at least `n` children.
async fn wait_for_children(pid: i32, n: usize) -> Vec<i32> {
    for _ in 0..100 {
        let kids = process::children(pid).await;
        if kids.len() >= n {
            return kids;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("process {pid} never had {n} children");
}

#[tokio::test]
#[serial]
async fn kill_tree_kills_children_before_parent() {
    let (mut child, root) = spawn("sleep 30 & sleep 30 & read x");
    let kids = wait_for_children(root, 2).await;

    let order = process::kill_tree(root).await;

    assert_eq!(order.len(), 3, "order: {order:?}");
    assert_eq!(order.last(), Some(&root), "parent must be killed last");
    for kid in &kids {
        assert!(order.contains(kid));
    }

    let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
    for pid in order {
        assert!(
            process::wait_for_exit(pid, Duration::from_secs(2)).await,
            "{pid} still alive"
        );
    }
}

#[tokio::test]
#[serial]
async fn snapshot_order_lists_parents_first() {
    let (mut child, root) = spawn("exec 3<&0; sh -c 'sleep 30 & read x <&3' & read x");
    let mid = wait_for_children(root, 1).await[0];
    let leaf = wait_for_children(mid, 1).await[0];

    let found = process::descendants(root).await;
    assert_eq!(found, vec![mid, leaf]);

    let order = process::kill_tree(root).await;
    assert_eq!(order, vec![leaf, mid, root]);
    let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
}

#[tokio::test]
#[serial]
async fn kill_tree_is_idempotent() {
    let (mut child, root) = spawn("sleep 30");

    assert!(process::kill_tree(root).await.contains(&root));
    let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;

    assert!(process::kill_tree(root).await.is_empty());
}

#[tokio::test]
async fn invalid_pids_are_treated_as_gone() {
    assert!(process::kill_tree(0).await.is_empty());
    assert!(process::kill_tree(-1).await.is_empty());
    assert!(process::wait_for_exit(0, Duration::from_millis(10)).await);
    assert!(!process::is_alive(0));
}

#[tokio::test]
async fn wait_for_exit_observes_exit() {
    let (mut child, pid) = spawn("exit 0");
    child.wait().await.expect("wait");

    assert!(process::wait_for_exit(pid, Duration::from_millis(500)).await);
}

#[tokio::test]
async fn wait_for_exit_times_out_on_live_process() {
    let (_child, pid) = spawn("sleep 30");

    let started = std::time::Instant::now();
    assert!(!process::wait_for_exit(pid, Duration::from_millis(150)).await);
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(process::is_alive(pid));
}

#[tokio::test]
#[serial]
async fn ensure_killed_skips_dead_pids() {
    let (mut live, live_pid) = spawn("sleep 30");
    let (mut dead, dead_pid) = spawn("exit 0");
    dead.wait().await.expect("wait");

    let killed = process::ensure_killed(&[dead_pid, live_pid]);
    assert_eq!(killed, vec![live_pid]);

    let _ = tokio::time::timeout(Duration::from_secs(2), live.wait()).await;
    assert!(process::ensure_killed(&[dead_pid, live_pid]).is_empty());
}
