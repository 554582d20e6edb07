use colored::Colorize;
use tracing::instrument;

use super::CommandError;
use crate::changelist::Changelist;
use crate::context::Context;

/// Optionally set the current branch's issue, then print it.
#[instrument(skip(ctx))]
pub fn run(ctx: &Context, issue: Option<u64>) -> Result<(), CommandError> {
    let mut cl = Changelist::current(ctx)?;
    if let Some(issue) = issue {
        cl.set_issue(ctx, issue)?;
    }

    match cl.issue(ctx)? {
        Some(issue) => {
            let url = cl.issue_url(ctx)?.unwrap_or_default();
            println!("Issue number: {} ({url})", issue.to_string().cyan());
        }
        None => println!("Issue number: None"),
    }
    Ok(())
}
