use std::path::Path;

use tracing::instrument;

use super::CommandError;
use crate::config::{self, SettingsFile, CC_KEY, SERVER_KEY, TREE_STATUS_URL_KEY, UPLOAD_TOOL_KEY};
use crate::context::Context;
use crate::prompt;

const PROPERTIES: [(&str, &str); 4] = [
    ("Review server (host[:port])", SERVER_KEY),
    ("CC list", CC_KEY),
    ("Tree status URL", TREE_STATUS_URL_KEY),
    ("Upload tool", UPLOAD_TOOL_KEY),
];

/// What to do with a property after the user answered its prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum PropertyChange {
    Keep,
    Clear,
    Set(String),
}

/// Empty keeps the current value, `x` clears it, anything else replaces it.
pub fn resolve_answer(initial: Option<&str>, answer: &str) -> PropertyChange {
    let answer = answer.trim();
    match answer {
        "" => PropertyChange::Keep,
        "x" if initial.is_some() => PropertyChange::Clear,
        value if Some(value) == initial => PropertyChange::Keep,
        value => PropertyChange::Set(value.to_string()),
    }
}

#[instrument(skip(ctx))]
pub fn run(ctx: &Context, file: Option<&Path>) -> Result<(), CommandError> {
    let git = ctx.git();

    if let Some(path) = file {
        let settings = SettingsFile::load_from(path)?;
        for key in settings.apply(git)? {
            println!("Set {key}");
        }
        return Ok(());
    }

    for (caption, key) in PROPERTIES {
        let initial = config::get_opt(git, key)?;
        let question = match &initial {
            Some(value) => format!("{caption} (\"x\" to clear) [{value}]"),
            None => caption.to_string(),
        };
        let answer = prompt::ask(&question, None)?;
        match resolve_answer(initial.as_deref(), &answer) {
            PropertyChange::Keep => {}
            PropertyChange::Clear => config::set(git, key, "")?,
            PropertyChange::Set(value) => config::set(git, key, &value)?,
        }
    }
    Ok(())
}
