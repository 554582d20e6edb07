use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::{self, ConfigError};
use crate::context::Context;
use crate::git::{short_branch_name, Git, GitError};
use crate::review::{Credentials, ReviewError};

/// Flat `branch issue` file older versions kept in the git directory.
pub const LEGACY_MAPPING_FILE: &str = "cl-mapping";

#[derive(Debug, Error)]
pub enum ChangelistError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("Failed to migrate legacy mapping file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed line in legacy mapping file: {0:?}")]
    InvalidMapping(String),

    #[error("Invalid issue number stored for branch {branch}: {value:?}")]
    InvalidIssue { branch: String, value: String },

    #[error("Not on a branch (HEAD is detached)")]
    DetachedHead,

    #[error(
        "Unable to determine default branch to diff against. Either pass complete \
         git diff args or set branch.{0}.merge"
    )]
    NoUpstream(String),
}

/// Config key holding the issue for a branch.
pub fn issue_key(branch: &str) -> String {
    format!("review.branch.{branch}.issue")
}

/// A local branch and the review issue it is associated with.
///
/// Fields are filled in on first access and cached for the rest of the
/// command.
#[derive(Debug)]
pub struct Changelist {
    branchref: String,
    branch: String,
    upstream: Option<String>,
    issue: Option<Option<u64>>,
    description: Option<String>,
}

impl Changelist {
    /// The changelist for the checked-out branch.
    pub fn current(ctx: &Context) -> Result<Changelist, ChangelistError> {
        ctx.ensure_migrated()?;
        let (code, output) = ctx.git().run_with_code(&["symbolic-ref", "HEAD"])?;
        let branchref = output.trim();
        if code != 0 || branchref.is_empty() {
            return Err(ChangelistError::DetachedHead);
        }
        Ok(Self::from_ref(branchref))
    }

    /// The changelist for an arbitrary `refs/heads/...` ref.
    pub fn for_branch(ctx: &Context, branchref: &str) -> Result<Changelist, ChangelistError> {
        ctx.ensure_migrated()?;
        Ok(Self::from_ref(branchref))
    }

    fn from_ref(branchref: &str) -> Changelist {
        Changelist {
            branchref: branchref.to_string(),
            branch: short_branch_name(branchref).to_string(),
            upstream: None,
            issue: None,
            description: None,
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn branchref(&self) -> &str {
        &self.branchref
    }

    /// The branch this one tracks, as a ref `git rev-list` understands.
    pub fn upstream_branch(&mut self, ctx: &Context) -> Result<String, ChangelistError> {
        if let Some(upstream) = &self.upstream {
            return Ok(upstream.clone());
        }
        let git = ctx.git();
        let merge = config::get_opt(git, &format!("branch.{}.merge", self.branch))?;
        let upstream = match merge {
            Some(merge) => {
                let remote = config::get_opt(git, &format!("branch.{}.remote", self.branch))?;
                match remote.as_deref() {
                    None | Some(".") => merge,
                    Some(remote) => {
                        format!("refs/remotes/{remote}/{}", short_branch_name(&merge))
                    }
                }
            }
            None => {
                if !ctx.settings.is_git_svn(git)? {
                    return Err(ChangelistError::NoUpstream(self.branch.clone()));
                }
                ctx.settings.svn_branch(git)?
            }
        };
        debug!(branch = %self.branch, upstream = %upstream, "resolved upstream");
        self.upstream = Some(upstream.clone());
        Ok(upstream)
    }

    pub fn issue(&mut self, ctx: &Context) -> Result<Option<u64>, ChangelistError> {
        if let Some(issue) = self.issue {
            return Ok(issue);
        }
        let issue = match config::get_opt(ctx.git(), &issue_key(&self.branch))? {
            None => None,
            Some(value) => {
                let parsed = value
                    .parse::<u64>()
                    .map_err(|_| ChangelistError::InvalidIssue {
                        branch: self.branch.clone(),
                        value: value.clone(),
                    })?;
                (parsed != 0).then_some(parsed)
            }
        };
        self.issue = Some(issue);
        Ok(issue)
    }

    /// Associate `issue` with this branch. Zero clears the association.
    #[instrument(skip(self, ctx), fields(branch = %self.branch))]
    pub fn set_issue(&mut self, ctx: &Context, issue: u64) -> Result<(), ChangelistError> {
        let key = issue_key(&self.branch);
        if issue == 0 {
            config::set(ctx.git(), &key, "")?;
            self.issue = Some(None);
        } else {
            config::set(ctx.git(), &key, &issue.to_string())?;
            self.issue = Some(Some(issue));
        }
        self.description = None;
        Ok(())
    }

    pub fn clear_issue(&mut self, ctx: &Context) -> Result<(), ChangelistError> {
        self.set_issue(ctx, 0)
    }

    pub fn issue_url(&mut self, ctx: &Context) -> Result<Option<String>, ChangelistError> {
        match self.issue(ctx)? {
            None => Ok(None),
            Some(issue) => Ok(Some(format!("{}/{issue}", ctx.server()?))),
        }
    }

    /// The issue description from the review server, or `None` when no
    /// issue is associated.
    pub async fn description(&mut self, ctx: &Context) -> Result<Option<String>, ChangelistError> {
        let Some(issue) = self.issue(ctx)? else {
            return Ok(None);
        };
        if let Some(description) = &self.description {
            return Ok(Some(description.clone()));
        }
        let server = ctx.server()?;
        let description = ctx.review().fetch_description(&server, issue).await?;
        self.description = Some(description.clone());
        Ok(Some(description))
    }

    /// Close the associated issue on the review server.
    pub async fn close_issue(
        &mut self,
        ctx: &Context,
        credentials: &Credentials,
    ) -> Result<(), ChangelistError> {
        if let Some(issue) = self.issue(ctx)? {
            let server = ctx.server()?;
            ctx.review().close_issue(&server, issue, credentials).await?;
            info!(issue, "closed issue");
        }
        Ok(())
    }
}

/// Convert `<git-dir>/cl-mapping` into per-branch config keys and delete it.
///
/// Returns the number of entries migrated. The file is only removed once
/// every line has been parsed and stored.
pub fn migrate_legacy_mapping(git: &dyn Git) -> Result<usize, ChangelistError> {
    let git_dir = git.run(&["rev-parse", "--git-dir"])?;
    let path = PathBuf::from(git_dir.trim()).join(LEGACY_MAPPING_FILE);
    if !path.is_file() {
        return Ok(0);
    }

    println!(
        "old-style git-cl mapping file ({}) found; migrating.",
        path.display()
    );
    let contents = fs::read_to_string(&path)?;

    let mut entries = Vec::new();
    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(branch), Some(issue), None) if issue.parse::<u64>().is_ok() => {
                entries.push((short_branch_name(branch), issue));
            }
            _ => return Err(ChangelistError::InvalidMapping(line.to_string())),
        }
    }

    for (branch, issue) in &entries {
        config::set(git, &issue_key(branch), issue)?;
    }
    fs::remove_file(&path)?;
    info!(entries = entries.len(), "migrated legacy mapping file");
    Ok(entries.len())
}
