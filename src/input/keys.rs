//! Character classification for classified text input.
//!
//! Regular characters travel as literal runs; every special character
//! becomes one symbolic key understood by `send-keys`.

/// Start marker of a bracketed paste.
pub const PASTE_START: &str = "\x1b[200~";
/// End marker of a bracketed paste.
pub const PASTE_END: &str = "\x1b[201~";

/// One delivery unit produced by [`segments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// A contiguous run of regular characters.
    Literal(&'a str),
    /// A symbolic key name.
    Key(String),
}

/// Symbolic key for `c`, or `None` when `c` is a regular character.
#[must_use]
pub fn special_key(c: char) -> Option<String> {
    let key = match c {
        '\n' | '\r' => "Enter".to_owned(),
        '\t' => "Tab".to_owned(),
        '\x7f' | '\x08' => "BSpace".to_owned(),
        '\x1b' => "Escape".to_owned(),
        ' ' => "Space".to_owned(),
        c if u32::from(c) < 0x20 => {
            // Ctrl+letter: 0x01 -> C-a, 0x02 -> C-b, ...
            let letter = char::from_u32(u32::from(c) + 96)?;
            format!("C-{letter}")
        }
        _ => return None,
    };
    Some(key)
}

/// Character that produces `key`; inverse of [`special_key`].
///
/// `Enter` maps back to `\n` and `BSpace` to DEL.
#[must_use]
pub fn source_char(key: &str) -> Option<char> {
    match key {
        "Enter" => Some('\n'),
        "Tab" => Some('\t'),
        "BSpace" => Some('\x7f'),
        "Escape" => Some('\x1b'),
        "Space" => Some(' '),
        _ => {
            let mut chars = key.strip_prefix("C-")?.chars();
            let letter = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            let code = u32::from(letter).checked_sub(96)?;
            (code < 0x20).then(|| char::from_u32(code)).flatten()
        }
    }
}

/// Split `text` into literal runs and special keys, in input order.
#[must_use]
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut run_start: Option<usize> = None;

    for (idx, c) in text.char_indices() {
        match special_key(c) {
            Some(key) => {
                if let Some(start) = run_start.take() {
                    out.push(Segment::Literal(&text[start..idx]));
                }
                out.push(Segment::Key(key));
            }
            None => {
                run_start.get_or_insert(idx);
            }
        }
    }

    if let Some(start) = run_start {
        out.push(Segment::Literal(&text[start..]));
    }
    out
}
