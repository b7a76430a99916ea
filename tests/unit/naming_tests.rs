//! Unit tests for socket and session naming plus command argument builders.

use std::path::PathBuf;

use tmux_supervisor::models::instance::SessionSize;
use tmux_supervisor::tmux::{
    encode_name, global_socket, instance_socket, session_name, NewSession, OptionScope,
};

#[test]
fn instance_socket_appends_id_to_prefix() {
    assert_eq!(instance_socket("sup", "a1"), "sup-a1");
}

#[test]
fn global_socket_is_the_bare_prefix() {
    assert_eq!(global_socket("sup"), "sup");
    assert_ne!(global_socket("sup"), instance_socket("sup", "a1"));
}

#[test]
fn distinct_instances_get_distinct_sockets() {
    assert_ne!(instance_socket("sup", "a"), instance_socket("sup", "b"));
}

#[test]
fn target_separators_are_escaped() {
    assert_eq!(session_name("sup", "feat.x:1"), "sup-feat_2ex_3a1");
    assert_eq!(instance_socket("sup", "a/b c"), "sup-a_2fb_20c");
}

#[test]
fn lookalike_ids_get_distinct_names() {
    for (a, b) in [("a.b", "a-b"), ("a_b", "a-b"), ("a.b", "a_2eb"), ("x y", "x_y")] {
        assert_ne!(instance_socket("sup", a), instance_socket("sup", b), "{a} vs {b}");
        assert_ne!(session_name("sup", a), session_name("sup", b), "{a} vs {b}");
    }
}

#[test]
fn prefix_is_escaped_on_every_socket() {
    assert_eq!(global_socket("my.sup"), "my_2esup");
    assert_eq!(instance_socket("my.sup", "a1"), "my_2esup-a1");
    assert_eq!(encode_name("plain-Name9"), "plain-Name9");
}

#[test]
fn option_scope_flags() {
    assert_eq!(OptionScope::Global.args(), vec!["-g"]);
    assert_eq!(OptionScope::Session("s".into()).args(), vec!["-t", "s"]);
    assert_eq!(OptionScope::Window("s".into()).args(), vec!["-w", "-t", "s"]);
}

#[test]
fn new_session_args_include_size_and_dir() {
    let spec = NewSession {
        name: "sup-a1".into(),
        size: SessionSize {
            width: 200,
            height: 30,
            history_limit: 50_000,
        },
        work_dir: Some(PathBuf::from("/work")),
    };
    assert_eq!(
        spec.args(),
        vec![
            "set-option",
            "-g",
            "history-limit",
            "50000",
            ";",
            "new-session",
            "-d",
            "-s",
            "sup-a1",
            "-x",
            "200",
            "-y",
            "30",
            "-c",
            "/work"
        ]
    );
}

#[test]
fn new_session_args_without_dir() {
    let spec = NewSession {
        name: "s".into(),
        size: SessionSize {
            width: 80,
            height: 24,
            history_limit: 0,
        },
        work_dir: None,
    };
    assert!(!spec.args().contains(&"-c".to_owned()));
}
