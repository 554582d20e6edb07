use tracing::instrument;

use super::CommandError;
use crate::context::Context;

#[instrument(skip(ctx))]
pub fn run(ctx: &Context) -> Result<(), CommandError> {
    println!("{}", ctx.settings.svn_branch(ctx.git())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::context::tests::test_context;
    use crate::git::tests::FakeGit;
    use crate::review::tests::FakeReview;

    #[test]
    fn test_svnbranch_outside_git_svn() {
        let ctx = test_context(FakeGit::new(), FakeReview::new());
        assert!(matches!(
            run(&ctx),
            Err(CommandError::Config(ConfigError::NotGitSvn))
        ));
    }

    #[test]
    fn test_svnbranch_configured() {
        let git = FakeGit::new().with_config("review.svn-branch", "refs/remotes/trunk");
        let ctx = test_context(git, FakeReview::new());
        assert!(run(&ctx).is_ok());
    }
}
