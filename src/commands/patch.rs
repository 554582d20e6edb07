use tracing::{debug, instrument};

use super::{cd_to_top, CommandError};
use crate::changelist::Changelist;
use crate::context::Context;
use crate::review::patch::{find_patch_link, parse_patch_url, strip_git_prefixes};
use crate::review::{PatchSource, ReviewError};

#[derive(Debug, Default)]
pub struct PatchOptions {
    pub new_branch: Option<String>,
    pub force: bool,
    pub no_commit: bool,
    /// Issue number or patch URL.
    pub input: String,
}

/// Turn an issue number or patch URL into a download location. For an
/// issue number the issue page is scraped for its first patch set.
pub async fn resolve_patch_source(ctx: &Context, input: &str) -> Result<PatchSource, CommandError> {
    let Ok(issue) = input.trim().parse::<u64>() else {
        return Ok(parse_patch_url(input)?);
    };
    let server = ctx.server()?;
    let page = ctx.review().fetch_page(&format!("{server}/{issue}")).await?;
    let link = find_patch_link(&page, issue).ok_or(ReviewError::PatchNotFound(issue))?;
    Ok(PatchSource {
        issue,
        url: format!("{server}{link}"),
    })
}

#[instrument(skip(ctx))]
pub async fn run(ctx: &Context, options: PatchOptions) -> Result<(), CommandError> {
    let git = ctx.git();
    let source = resolve_patch_source(ctx, &options.input).await?;
    debug!(issue = source.issue, url = %source.url, "resolved patch");

    if let Some(branch) = &options.new_branch {
        if options.force {
            // The branch may not exist yet.
            git.run_with_code(&["branch", "-D", branch])?;
        }
        git.run(&["checkout", "-b", branch])?;
    }

    cd_to_top(ctx)?;

    let patch = ctx.review().fetch_page(&source.url).await?;
    let patch = strip_git_prefixes(&patch);
    let (code, output) = git.run_with_input(&["apply", "-p0", "--index"], patch.as_bytes())?;
    if code != 0 {
        eprint!("{output}");
        return Err(CommandError::PatchFailed);
    }

    if options.no_commit {
        println!("Patch applied to index.");
        return Ok(());
    }

    git.run(&["commit", "-m", &format!("patch from issue {}", source.issue)])?;
    let mut cl = Changelist::current(ctx)?;
    cl.set_issue(ctx, source.issue)?;
    println!("Committed patch.");
    Ok(())
}
