use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Connects local git branches to issues on a code review server.
#[derive(Parser, Debug)]
#[command(name = "git-cl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Edit the review server, CC list, tree-status URL, and upload tool
    Config {
        /// Import settings from a TOML file instead of prompting
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show branches with their associated issues
    Status,

    /// Show or set the issue for the current branch (0 clears it)
    Issue {
        issue: Option<u64>,
    },

    /// Upload the current branch for review
    Upload {
        /// Description for a new issue, or message for a new patch set
        #[arg(short, long)]
        message: Option<String>,

        /// Comma-separated reviewers
        #[arg(short, long)]
        reviewers: Option<String>,

        /// Extra addresses to CC, added to the configured list
        #[arg(long)]
        cc: Option<String>,

        /// Send notification mail to the reviewers
        #[arg(long)]
        send_mail: bool,

        /// Arguments passed through to git diff (defaults to the merge base)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        diff_args: Vec<String>,
    },

    /// Squash the branch into one commit and commit it upstream
    Dcommit {
        /// Commit message, instead of the issue description
        #[arg(short, long)]
        message: Option<String>,

        /// Credit the change to someone else ("Patch from ...")
        #[arg(short, long)]
        contributor: Option<String>,

        /// Skip the tree-status check and the confirmation prompt
        #[arg(short, long)]
        force: bool,

        /// Branch to commit against (defaults to the upstream branch)
        branch: Option<String>,
    },

    /// Apply a patch from the review server
    Patch {
        /// Create this branch for the patch
        #[arg(short = 'b', long = "branch")]
        new_branch: Option<String>,

        /// With -b, delete an existing branch of the same name first
        #[arg(short, long)]
        force: bool,

        /// Apply to the index without committing
        #[arg(short = 'n', long)]
        no_commit: bool,

        /// Issue number or patch URL
        issue: String,
    },

    /// Show the status of the tree
    Tree,

    /// Print the svn branch this repository tracks
    Svnbranch,
}
