use std::fs;
use std::io::Write;
use std::process::Command;

use dialoguer::{Confirm, Input, Password};
use tracing::debug;

use crate::review::Credentials;

const DEFAULT_EDITOR: &str = "vi";

/// Let the user edit `initial` in `$EDITOR` and return the result with
/// `#` comment lines removed.
pub fn edit_text(initial: &str) -> std::io::Result<String> {
    let editor = std::env::var("EDITOR")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string());

    let mut file = tempfile::Builder::new()
        .prefix("git-cl-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(initial.as_bytes())?;
    file.flush()?;

    // EDITOR may carry flags, e.g. "code --wait".
    let mut parts = editor.split_whitespace();
    let program = parts.next().unwrap_or(DEFAULT_EDITOR);
    debug!(editor = %editor, path = %file.path().display(), "launching editor");
    let status = Command::new(program).args(parts).arg(file.path()).status()?;
    if !status.success() {
        return Err(std::io::Error::other(format!(
            "editor \"{editor}\" exited with {status}"
        )));
    }

    let edited = fs::read_to_string(file.path())?;
    Ok(strip_comments(&edited))
}

/// Drop lines starting with `#` and surrounding whitespace.
pub fn strip_comments(text: &str) -> String {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Ask for a line of text, offering `default` when there is one.
pub fn ask(prompt: &str, default: Option<&str>) -> dialoguer::Result<String> {
    let mut input = Input::<String>::new().with_prompt(prompt).allow_empty(true);
    if let Some(default) = default {
        input = input.default(default.to_string()).show_default(true);
    }
    input.interact_text()
}

/// Yes/no confirmation. Declining is `false`, not an error.
pub fn confirm(prompt: &str) -> dialoguer::Result<bool> {
    Confirm::new().with_prompt(prompt).default(true).interact()
}

/// Collect review-server credentials. The email defaults to `user.email`.
pub fn credentials(default_email: Option<&str>) -> dialoguer::Result<Credentials> {
    let email = ask("Email", default_email)?;
    let password = Password::new().with_prompt("Password").interact()?;
    Ok(Credentials { email, password })
}

/// Where commands get review-server credentials from.
pub trait CredentialsProvider {
    fn credentials(&self, default_email: Option<&str>) -> dialoguer::Result<Credentials>;
}

/// Asks on the terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl CredentialsProvider for TerminalPrompt {
    fn credentials(&self, default_email: Option<&str>) -> dialoguer::Result<Credentials> {
        credentials(default_email)
    }
}
