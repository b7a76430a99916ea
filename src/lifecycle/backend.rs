//! Agent backend contract: prompt-file naming and start-command building.

use std::path::Path;

/// How the hosted process should be launched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartMode {
    /// A new conversation from the prompt file.
    #[default]
    Fresh,
    /// Continue the backend's previous conversation.
    Resume,
}

/// Supplies the command typed into a new session.
pub trait Backend: Send + Sync {
    /// File name (relative to the working directory) for the task payload.
    fn prompt_file_name(&self) -> &str;

    /// Shell command line that launches the hosted process.
    fn start_command(&self, prompt_path: &Path, mode: StartMode) -> String;
}

/// Placeholder replaced by the quoted prompt-file path in [`CommandBackend`] args.
pub const PROMPT_PLACEHOLDER: &str = "{prompt_file}";

/// [`Backend`] built from a program and argument list.
///
/// Any argument equal to or containing [`PROMPT_PLACEHOLDER`] has the quoted
/// prompt path substituted; without a placeholder the path is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    resume_args: Vec<String>,
    prompt_file_name: String,
}

impl CommandBackend {
    /// Default prompt file written into the working directory.
    pub const DEFAULT_PROMPT_FILE: &'static str = ".supervisor-prompt.md";

    /// Build a backend for `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            resume_args: Vec::new(),
            prompt_file_name: Self::DEFAULT_PROMPT_FILE.to_owned(),
        }
    }

    /// Extra arguments inserted for [`StartMode::Resume`].
    #[must_use]
    pub fn with_resume_args(mut self, args: Vec<String>) -> Self {
        self.resume_args = args;
        self
    }

    /// Override the prompt file name.
    #[must_use]
    pub fn with_prompt_file_name(mut self, name: impl Into<String>) -> Self {
        self.prompt_file_name = name.into();
        self
    }
}

impl Backend for CommandBackend {
    fn prompt_file_name(&self) -> &str {
        &self.prompt_file_name
    }

    fn start_command(&self, prompt_path: &Path, mode: StartMode) -> String {
        let quoted_path = shell_quote(&prompt_path.to_string_lossy());
        let mut words = vec![shell_quote(&self.program)];
        if mode == StartMode::Resume {
            words.extend(self.resume_args.iter().map(|a| shell_quote(a)));
        }

        let mut substituted = false;
        for arg in &self.args {
            if arg.contains(PROMPT_PLACEHOLDER) {
                substituted = true;
                words.push(arg.replace(PROMPT_PLACEHOLDER, &quoted_path));
            } else {
                words.push(shell_quote(arg));
            }
        }
        if !substituted {
            words.push(quoted_path);
        }
        words.join(" ")
    }
}

/// POSIX-shell quoting: safe words pass through, others are single-quoted.
#[must_use]
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,@+%".contains(c));
    if safe {
        word.to_owned()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
