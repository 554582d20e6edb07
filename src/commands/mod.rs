pub mod config;
pub mod dcommit;
pub mod issue;
pub mod patch;
pub mod status;
pub mod svnbranch;
pub mod tree;
pub mod upload;

use thiserror::Error;
use tracing::debug;

use crate::changelist::ChangelistError;
use crate::cli::Commands;
use crate::config::ConfigError;
use crate::context::Context;
use crate::git::GitError;
use crate::review::{ReviewError, TreeStatus};

/// Everything that can end a command. Each variant is fatal to the current
/// invocation; `main` prints it and exits with status 1.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Changelist(#[from] ChangelistError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to edit the description: {0}")]
    Editor(#[source] std::io::Error),

    #[error("Cannot {0} with a dirty tree. You must commit locally first.")]
    DirtyTree(&'static str),

    #[error(
        "Base branch \"{base}\" has {count} commits not in this branch.\n\
         Run \"git merge {base}\" before attempting to dcommit."
    )]
    BaseBranchAhead { base: String, count: usize },

    #[error(
        "The tree is closed. Please wait for it to reopen. \
         Use \"git cl dcommit -f\" to commit on a closed tree."
    )]
    TreeClosed,

    #[error("No description set.")]
    MissingDescription,

    #[error("Must specify reviewers to send email.")]
    MissingReviewers,

    #[error("The tree is not open (status: {0})")]
    TreeNotOpen(TreeStatus),

    #[error("You must configure your tree status URL by running \"git cl config\".")]
    TreeStatusUnset,

    #[error("Failed to apply the patch")]
    PatchFailed,

    #[error("{tool} exited with status {code}")]
    UploadFailed { tool: String, code: i32 },

    #[error("Don't know where to push {0}; pass a <remote>/<branch> to commit against")]
    UnknownPushTarget(String),

    #[error("Aborted.")]
    Aborted,
}

/// Dispatch a parsed subcommand.
pub async fn run(ctx: &Context, command: Commands) -> Result<(), CommandError> {
    debug!(command = ?command, "dispatching");
    match command {
        Commands::Config { file } => config::run(ctx, file.as_deref()),
        Commands::Status => status::run(ctx).await,
        Commands::Issue { issue } => issue::run(ctx, issue),
        Commands::Upload {
            message,
            reviewers,
            cc,
            send_mail,
            diff_args,
        } => {
            let options = upload::UploadOptions {
                message,
                reviewers,
                cc,
                send_mail,
                diff_args,
            };
            upload::run(ctx, options).await
        }
        Commands::Dcommit {
            message,
            contributor,
            force,
            branch,
        } => {
            let options = dcommit::DcommitOptions {
                message,
                contributor,
                force,
                branch,
            };
            dcommit::run(ctx, options).await
        }
        Commands::Patch {
            new_branch,
            force,
            no_commit,
            issue,
        } => {
            let options = patch::PatchOptions {
                new_branch,
                force,
                no_commit,
                input: issue,
            };
            patch::run(ctx, options).await
        }
        Commands::Tree => tree::run(ctx).await,
        Commands::Svnbranch => svnbranch::run(ctx),
    }
}

/// Refuse to continue when the working tree has uncommitted changes.
pub(crate) fn ensure_clean_tree(ctx: &Context, action: &'static str) -> Result<(), CommandError> {
    let changes = ctx.git().run(&["diff-index", "HEAD"])?;
    if !changes.trim().is_empty() {
        return Err(CommandError::DirtyTree(action));
    }
    Ok(())
}

/// Move to the top of the working tree, as some commands switch branches
/// and the current subdirectory may not exist on the other side.
pub(crate) fn cd_to_top(ctx: &Context) -> Result<(), CommandError> {
    let cdup = ctx.git().run(&["rev-parse", "--show-cdup"])?;
    let cdup = cdup.trim();
    if !cdup.is_empty() {
        debug!(path = cdup, "changing to repository top");
        std::env::set_current_dir(cdup)?;
    }
    Ok(())
}

/// Indent every line by two spaces.
pub(crate) fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
