use colored::Colorize;
use tracing::instrument;

use super::{indent, CommandError};
use crate::changelist::Changelist;
use crate::context::Context;

/// One line of the branch listing.
pub fn format_branch_line(branch: &str, issue: Option<u64>) -> String {
    let issue = issue.map_or_else(|| "None".to_string(), |issue| issue.to_string());
    format!("  {branch:>20}: {issue}")
}

#[instrument(skip(ctx))]
pub async fn run(ctx: &Context) -> Result<(), CommandError> {
    let refs = ctx
        .git()
        .run(&["for-each-ref", "--format=%(refname)", "refs/heads"])?;
    let mut branches: Vec<&str> = refs
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    branches.sort_unstable();

    if !branches.is_empty() {
        println!("Branches associated with reviews:");
        for branchref in branches {
            let mut cl = Changelist::for_branch(ctx, branchref)?;
            let issue = cl.issue(ctx)?;
            println!("{}", format_branch_line(cl.branch(), issue));
        }
        println!();
    }

    let mut cl = Changelist::current(ctx)?;
    println!("Current branch: {}", cl.branch().bold());
    if let Some(issue) = cl.issue(ctx)? {
        let url = cl.issue_url(ctx)?.unwrap_or_default();
        println!("Issue number: {} ({url})", issue.to_string().cyan());
        println!("Issue description:");
        if let Some(description) = cl.description(ctx).await? {
            println!("{}", indent(&description));
        }
    }
    Ok(())
}
