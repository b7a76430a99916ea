//! Unit tests for the instance model and its lifecycle hooks.

use std::path::PathBuf;

use chrono::Utc;
use tmux_supervisor::models::instance::{
    AgentInstance, Instance, InstanceState, LifecycleEvent, SessionSize,
};
use tokio::sync::mpsc;

#[test]
fn names_derive_from_prefix_and_id() {
    let instance = AgentInstance::new("a1", "sup", PathBuf::from("/w"), "task".into());
    assert_eq!(instance.id(), "a1");
    assert_eq!(instance.session_name(), "sup-a1");
    assert_eq!(instance.socket_name(), "sup-a1");
    assert_eq!(instance.task(), "task");
    assert!(!instance.is_running());
    assert!(instance.started_at().is_none());
}

#[test]
fn running_flag_and_start_time_are_recorded() {
    let instance = AgentInstance::new("a1", "sup", PathBuf::from("/w"), String::new());
    let now = Utc::now();
    instance.set_running(true);
    instance.set_started_at(now);
    assert!(instance.is_running());
    assert_eq!(
        instance.started_at().map(|t| t.timestamp_millis()),
        Some(now.timestamp_millis())
    );
}

#[test]
fn size_defaults_fill_unset_fields() {
    let defaults = SessionSize {
        width: 200,
        height: 30,
        history_limit: 50_000,
    };
    let partial = SessionSize {
        width: 100,
        height: 0,
        history_limit: 0,
    };
    assert_eq!(
        partial.or_defaults(defaults),
        SessionSize {
            width: 100,
            height: 30,
            history_limit: 50_000,
        }
    );
}

#[test]
fn active_states() {
    assert!(!InstanceState::Stopped.is_active());
    assert!(InstanceState::Starting.is_active());
    assert!(InstanceState::Running.is_active());
    assert!(InstanceState::Ready.is_active());
    assert!(!InstanceState::Stopping.is_active());
    assert_eq!(InstanceState::default(), InstanceState::Stopped);
    assert_eq!(InstanceState::Ready.to_string(), "ready");
}

#[tokio::test]
async fn hooks_emit_lifecycle_events() {
    let (tx, mut rx) = mpsc::channel(4);
    let instance =
        AgentInstance::new("a1", "sup", PathBuf::from("/w"), String::new()).with_events(tx);

    instance.on_started();
    instance.on_stopped();

    assert_eq!(
        rx.recv().await,
        Some(LifecycleEvent::Started {
            instance_id: "a1".into()
        })
    );
    assert_eq!(
        rx.recv().await,
        Some(LifecycleEvent::Stopped {
            instance_id: "a1".into()
        })
    );
}

#[test]
fn hooks_without_receiver_are_noops() {
    let instance = AgentInstance::new("a1", "sup", PathBuf::from("/w"), String::new());
    instance.on_started();
    instance.on_stopped();
}
