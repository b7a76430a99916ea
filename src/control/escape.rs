//! Quoting of payloads embedded in control-mode command lines.

/// Characters that force single-quote wrapping.
const QUOTE_TRIGGERS: &[char] = &[' ', '\t', '\n', '\r', '\'', '"', '\\'];

/// Quote `payload` for a control-mode command line.
///
/// Payloads containing whitespace, quotes, or backslashes are wrapped in
/// single quotes with every `'` written as `'\''`; anything else is
/// returned unchanged.
#[must_use]
pub fn escape_for_control_mode(payload: &str) -> String {
    if !payload.contains(QUOTE_TRIGGERS) {
        return payload.to_owned();
    }
    format!("'{}'", payload.replace('\'', r"'\''"))
}

/// Build the `send-keys` command line written to the control connection.
///
/// Literal payloads follow `--` so a leading `-` is not read as a flag.
#[must_use]
pub fn send_keys_command(session: &str, keys: &str, literal: bool) -> String {
    let target = escape_for_control_mode(session);
    let payload = escape_for_control_mode(keys);
    if literal {
        format!("send-keys -t {target} -l -- {payload}\n")
    } else {
        format!("send-keys -t {target} {payload}\n")
    }
}
