use colored::Colorize;
use tracing::{debug, info, instrument};

use super::{cd_to_top, ensure_clean_tree, indent, tree, CommandError};
use crate::changelist::Changelist;
use crate::config;
use crate::context::Context;
use crate::git::GitError;
use crate::prompt;
use crate::review::TreeStatus;

/// Throwaway branch the change is squashed onto before committing upstream.
pub const MERGE_BRANCH: &str = "git-cl-commit";

#[derive(Debug, Default)]
pub struct DcommitOptions {
    pub message: Option<String>,
    pub contributor: Option<String>,
    pub force: bool,
    pub branch: Option<String>,
}

/// Final commit message: the description plus review and contributor
/// trailers.
pub fn commit_message(
    description: &str,
    issue_url: Option<&str>,
    contributor: Option<&str>,
) -> String {
    let mut message = description.trim().to_string();
    if let Some(url) = issue_url {
        message.push_str(&format!("\n\nReview URL: {url}"));
    }
    if let Some(contributor) = contributor {
        message.push_str(&format!("\nPatch from {contributor}."));
    }
    message
}

/// Split a remote-tracking ref into the remote and the branch to push to.
/// `origin/master` and `refs/remotes/origin/master` both give
/// `("origin", "master")`.
pub fn push_target(base: &str) -> Option<(&str, &str)> {
    let short = base.strip_prefix("refs/remotes/").unwrap_or(base);
    if short.starts_with("refs/") {
        return None;
    }
    let (remote, branch) = short.split_once('/')?;
    (!remote.is_empty() && !branch.is_empty()).then_some((remote, branch))
}

/// Squash the current branch onto `base` and commit it upstream.
///
/// Runs as one straight sequence. If a step fails halfway, the throwaway
/// branch and any partial state are left for the user to clean up.
#[instrument(skip(ctx))]
pub async fn run(ctx: &Context, options: DcommitOptions) -> Result<(), CommandError> {
    let git = ctx.git();
    let mut cl = Changelist::current(ctx)?;
    let base = match options.branch {
        Some(branch) => branch,
        None => cl.upstream_branch(ctx)?,
    };

    ensure_clean_tree(ctx, "dcommit")?;

    // Commits reachable from base but not from our branch.
    let upstream_commits = git.run(&["rev-list", &format!("^{}", cl.branchref()), &base])?;
    let count = upstream_commits.lines().filter(|l| !l.trim().is_empty()).count();
    if count > 0 {
        return Err(CommandError::BaseBranchAhead { base, count });
    }

    if !options.force {
        match tree::tree_status(ctx).await? {
            TreeStatus::Closed => return Err(CommandError::TreeClosed),
            TreeStatus::Unknown => println!(
                "{}",
                "Unable to determine tree status. Please verify manually and use \
                 \"git cl dcommit -f\" to commit on a closed tree."
                    .yellow()
            ),
            TreeStatus::Open | TreeStatus::Unset => {}
        }
    }

    let issue = cl.issue(ctx)?;
    let description = match options.message {
        Some(message) => message,
        None => cl.description(ctx).await?.unwrap_or_default(),
    };
    if description.trim().is_empty() {
        if let Some(url) = cl.issue_url(ctx)? {
            println!("Visit {url}/edit to set it.");
        }
        return Err(CommandError::MissingDescription);
    }
    let issue_url = cl.issue_url(ctx)?;
    let message = commit_message(
        &description,
        issue_url.as_deref(),
        options.contributor.as_deref(),
    );
    println!("Description:\n{}", indent(&message));

    if !options.force {
        let (_, stat) = git.run_with_code(&["diff", "--stat", &base, cl.branchref()])?;
        print!("{stat}");
        if !prompt::confirm("About to commit; continue?")? {
            return Err(CommandError::Aborted);
        }
    }

    let (code, _) =
        git.run_with_code(&["show-ref", "--quiet", "--verify", &format!("refs/heads/{MERGE_BRANCH}")])?;
    if code == 0 {
        git.run(&["branch", "-D", MERGE_BRANCH])?;
    }

    cd_to_top(ctx)?;

    git.run(&["checkout", "-q", "-b", MERGE_BRANCH, &base])?;
    git.run(&["merge", "--squash", cl.branchref()])?;
    git.run(&["commit", "-m", &message])?;

    let committed = if ctx.settings.is_git_svn(git)? {
        // git-svn may ask for svn credentials.
        let args = ["svn", "dcommit", "--no-rebase"];
        let (code, output) = git.run_interactive(&args)?;
        if code != 0 {
            return Err(GitError::Failed {
                command: format!("git {}", args.join(" ")),
                code,
                output,
            }
            .into());
        }
        output.contains("Committed r")
    } else {
        let (remote, branch) =
            push_target(&base).ok_or_else(|| CommandError::UnknownPushTarget(base.clone()))?;
        let output = git.run(&["push", remote, &format!("HEAD:refs/heads/{branch}")])?;
        print!("{output}");
        true
    };
    debug!(committed, "upstream commit finished");

    git.run(&["checkout", "-q", cl.branch()])?;
    git.run(&["branch", "-D", MERGE_BRANCH])?;

    if committed && issue.is_some() {
        println!("Closing issue (you may be prompted for your review server password)...");
        let email = config::get_opt(git, "user.email")?;
        let credentials = ctx.credentials().credentials(email.as_deref())?;
        cl.close_issue(ctx, &credentials).await?;
        cl.clear_issue(ctx)?;
        info!(branch = %cl.branch(), "cleared issue after commit");
    }
    Ok(())
}
