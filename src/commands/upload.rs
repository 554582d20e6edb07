use tracing::{debug, info, instrument};

use super::{ensure_clean_tree, CommandError};
use crate::changelist::Changelist;
use crate::context::Context;
use crate::git::run_external;
use crate::prompt;

const DESCRIPTION_TEMPLATE: &str = "\
# Enter a description of the change.
# This will be displayed on the review site.
# The first line will also be used as the subject of the review.
";

#[derive(Debug, Default)]
pub struct UploadOptions {
    pub message: Option<String>,
    pub reviewers: Option<String>,
    pub cc: Option<String>,
    pub send_mail: bool,
    pub diff_args: Vec<String>,
}

/// What the upload tool should do: add a patch set to an existing issue or
/// create a new one.
#[derive(Debug, PartialEq, Eq)]
pub enum UploadTarget {
    Existing { issue: u64, message: String },
    New { description: String },
}

/// Command line for the upload tool.
pub fn build_upload_args(
    server: &str,
    target: &UploadTarget,
    reviewers: Option<&str>,
    send_mail: bool,
    cc: &str,
    diff_args: &[String],
) -> Vec<String> {
    let mut args: Vec<String> = vec!["--assume_yes".into(), "--server".into(), server.into()];
    match target {
        UploadTarget::Existing { issue, message } => {
            args.extend(["--issue".into(), issue.to_string()]);
            args.extend(["--message".into(), message.clone()]);
        }
        UploadTarget::New { description } => {
            let subject = description.lines().next().unwrap_or_default().trim();
            args.extend(["--message".into(), subject.to_string()]);
            args.extend(["--description".into(), description.clone()]);
        }
    }
    if let Some(reviewers) = reviewers {
        args.extend(["--reviewers".into(), reviewers.to_string()]);
    }
    if send_mail {
        args.push("--send_mail".into());
    }
    if !cc.is_empty() {
        args.extend(["--cc".into(), cc.to_string()]);
    }
    args.push("--".into());
    args.extend(diff_args.iter().cloned());
    args
}

/// Join the configured CC list with extra addresses from the command line.
pub fn merge_cc(configured: &str, extra: Option<&str>) -> String {
    [Some(configured), extra]
        .into_iter()
        .flatten()
        .flat_map(|list| list.split(','))
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Issue id from the upload tool's `... URL: <server>/<issue>` line.
pub fn parse_issue_from_output(output: &str) -> Option<u64> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("URL: ")?;
        let url = rest.split_whitespace().next()?;
        url.trim_end_matches('/').rsplit('/').next()?.parse::<u64>().ok()
    })
}

/// The `git log` range whose messages seed a new description.
fn log_range(diff_args: &[String]) -> String {
    match diff_args.iter().find(|arg| !arg.starts_with('-')) {
        Some(arg) if arg.contains("..") => arg.clone(),
        Some(arg) => format!("{arg}..HEAD"),
        None => "HEAD^..HEAD".to_string(),
    }
}

#[instrument(skip(ctx))]
pub async fn run(ctx: &Context, options: UploadOptions) -> Result<(), CommandError> {
    if options.send_mail && options.reviewers.is_none() {
        return Err(CommandError::MissingReviewers);
    }
    ensure_clean_tree(ctx, "upload")?;

    let git = ctx.git();
    let mut cl = Changelist::current(ctx)?;

    let diff_args = if options.diff_args.is_empty() {
        let upstream = cl.upstream_branch(ctx)?;
        let base = git.run(&["merge-base", &upstream, "HEAD"])?;
        vec![base.trim().to_string()]
    } else {
        options.diff_args
    };
    debug!(diff_args = ?diff_args, "diffing against");

    let server = ctx.server()?;
    let existing = cl.issue(ctx)?;
    let target = match existing {
        Some(issue) => {
            let message = match options.message {
                Some(message) => message,
                None => prompt::ask("Message describing this patch set", None)?,
            };
            UploadTarget::Existing { issue, message }
        }
        None => {
            let description = match options.message {
                Some(message) => message.trim().to_string(),
                None => {
                    let log = git.run(&["log", "--pretty=format:%s%n%n%b", &log_range(&diff_args)])?;
                    let initial = format!("{DESCRIPTION_TEMPLATE}{log}");
                    prompt::edit_text(&initial).map_err(CommandError::Editor)?
                }
            };
            if description.is_empty() {
                return Err(CommandError::MissingDescription);
            }
            UploadTarget::New { description }
        }
    };

    let cc = merge_cc(&ctx.settings.cc_list(git)?, options.cc.as_deref());
    let args = build_upload_args(
        &server,
        &target,
        options.reviewers.as_deref(),
        options.send_mail,
        &cc,
        &diff_args,
    );

    let tool = ctx.settings.upload_tool(git)?;
    let (code, output) = run_external(&tool, &args)?;
    if code != 0 {
        return Err(CommandError::UploadFailed { tool, code });
    }

    if existing.is_none() {
        if let Some(issue) = parse_issue_from_output(&output) {
            cl.set_issue(ctx, issue)?;
            info!(issue, branch = %cl.branch(), "associated new issue");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use crate::git::tests::FakeGit;
    use crate::review::tests::FakeReview;

    const SERVER: &str = "http://codereview.example.com";

    fn on_feature() -> FakeGit {
        FakeGit::new()
            .with_config("review.server", SERVER)
            .respond("symbolic-ref HEAD", 0, "refs/heads/feature\n")
    }

    #[test]
    fn test_build_args_for_new_issue() {
        let target = UploadTarget::New {
            description: "Fix the frobnicator\n\nBUG=1".to_string(),
        };
        let args = build_upload_args(SERVER, &target, Some("bob@example.com"), true, "", &["abc123".to_string()]);
        assert_eq!(
            args,
            vec![
                "--assume_yes",
                "--server",
                SERVER,
                "--message",
                "Fix the frobnicator",
                "--description",
                "Fix the frobnicator\n\nBUG=1",
                "--reviewers",
                "bob@example.com",
                "--send_mail",
                "--",
                "abc123",
            ]
        );
    }

    #[test]
    fn test_build_args_for_existing_issue() {
        let target = UploadTarget::Existing {
            issue: 42,
            message: "Address comments".to_string(),
        };
        let args = build_upload_args(SERVER, &target, None, false, "team@example.com", &[]);
        assert_eq!(
            args,
            vec![
                "--assume_yes",
                "--server",
                SERVER,
                "--issue",
                "42",
                "--message",
                "Address comments",
                "--cc",
                "team@example.com",
                "--",
            ]
        );
    }

    #[test]
    fn test_merge_cc() {
        assert_eq!(merge_cc("", None), "");
        assert_eq!(merge_cc("a@example.com", None), "a@example.com");
        assert_eq!(
            merge_cc("a@example.com, b@example.com", Some("c@example.com")),
            "a@example.com,b@example.com,c@example.com"
        );
        assert_eq!(merge_cc("", Some("c@example.com")), "c@example.com");
    }

    #[test]
    fn test_parse_issue_from_output() {
        let output = "Upload server: codereview.example.com\nIssue created. URL: http://codereview.example.com/1234\nUploading base file for src/main.rs\n";
        assert_eq!(parse_issue_from_output(output), Some(1234));
        assert_eq!(parse_issue_from_output("Issue updated. URL: http://codereview.example.com/99/"), Some(99));
        assert_eq!(parse_issue_from_output("nothing here"), None);
    }

    #[test]
    fn test_log_range() {
        assert_eq!(log_range(&["abc123".to_string()]), "abc123..HEAD");
        assert_eq!(log_range(&["a..b".to_string()]), "a..b");
        assert_eq!(log_range(&["-M".to_string(), "abc".to_string()]), "abc..HEAD");
        assert_eq!(log_range(&[]), "HEAD^..HEAD");
    }

    #[tokio::test]
    async fn test_send_mail_requires_reviewers() {
        let git = on_feature();
        let ctx = test_context(git.clone(), FakeReview::new());
        let options = UploadOptions {
            message: Some("Fix it".to_string()),
            send_mail: true,
            ..Default::default()
        };
        assert!(matches!(run(&ctx, options).await, Err(CommandError::MissingReviewers)));
        assert!(git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upload_refuses_dirty_tree() {
        let git = on_feature().respond("diff-index HEAD", 0, ":100644 100644 a b M\tfile\n");
        let ctx = test_context(git, FakeReview::new());
        let options = UploadOptions {
            message: Some("Fix it".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            run(&ctx, options).await,
            Err(CommandError::DirtyTree("upload"))
        ));
    }

    #[tokio::test]
    async fn test_upload_blank_message_is_missing_description() {
        let git = on_feature();
        let ctx = test_context(git, FakeReview::new());
        let options = UploadOptions {
            message: Some("   ".to_string()),
            diff_args: vec!["abc123".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            run(&ctx, options).await,
            Err(CommandError::MissingDescription)
        ));
    }

    #[tokio::test]
    async fn test_upload_records_new_issue() {
        // `echo` stands in for the upload tool: it prints its arguments,
        // which include the message carrying the URL line.
        let git = on_feature()
            .with_config("review.upload-tool", "echo")
            .with_config("branch.feature.merge", "refs/heads/master")
            .with_config("branch.feature.remote", ".")
            .respond("merge-base refs/heads/master HEAD", 0, "abc123\n");
        let ctx = test_context(git.clone(), FakeReview::new());
        let options = UploadOptions {
            message: Some(format!("Issue created. URL: {SERVER}/555")),
            ..Default::default()
        };
        run(&ctx, options).await.unwrap();
        assert!(git.was_called("merge-base refs/heads/master HEAD"));
        assert_eq!(git.config_value("review.branch.feature.issue").as_deref(), Some("555"));
    }

    #[tokio::test]
    async fn test_upload_reports_tool_failure() {
        let git = on_feature().with_config("review.upload-tool", "false");
        let ctx = test_context(git, FakeReview::new());
        let options = UploadOptions {
            message: Some("Fix it".to_string()),
            diff_args: vec!["abc123".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            run(&ctx, options).await,
            Err(CommandError::UploadFailed { code: 1, .. })
        ));
    }
}
