//! Unit tests for control-mode handshake parsing.

use tmux_supervisor::control::connection::{read_handshake, Handshake};
use tmux_supervisor::AppError;

#[tokio::test]
async fn session_changed_means_attached() {
    let mut input: &[u8] = b"%begin 1 2 0\n%end 1 2 0\n%session-changed $0 agent\n";
    let outcome = read_handshake(&mut input).await.expect("handshake");
    assert_eq!(outcome, Handshake::Attached);
}

#[tokio::test]
async fn error_marker_is_rejected_with_line() {
    let mut input: &[u8] = b"%error can't find session: ghost\n";
    let outcome = read_handshake(&mut input).await.expect("handshake");
    assert_eq!(
        outcome,
        Handshake::Rejected("%error can't find session: ghost".into())
    );
}

#[tokio::test]
async fn exit_marker_is_rejected() {
    let mut input: &[u8] = b"%exit\n";
    let outcome = read_handshake(&mut input).await.expect("handshake");
    assert!(matches!(outcome, Handshake::Rejected(line) if line == "%exit"));
}

#[tokio::test]
async fn no_marker_within_five_lines_is_unconfirmed() {
    let mut input: &[u8] = b"a\nb\nc\nd\ne\n%session-changed $0 late\n";
    let outcome = read_handshake(&mut input).await.expect("handshake");
    assert_eq!(outcome, Handshake::Unconfirmed);
}

#[tokio::test]
async fn early_eof_is_protocol_error() {
    let mut input: &[u8] = b"%begin 1 2 0\n";
    let err = read_handshake(&mut input).await.expect_err("eof");
    assert!(matches!(err, AppError::Protocol(_)), "got {err}");
}

#[tokio::test]
async fn empty_stream_is_protocol_error() {
    let mut input: &[u8] = b"";
    let err = read_handshake(&mut input).await.expect_err("eof");
    assert!(err.to_string().starts_with("protocol:"));
}
