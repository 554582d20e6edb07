use super::types::PatchSource;
use super::ReviewError;

/// Parse a patch download URL of the form
/// `<server>/download/issue<issue>_<patchset>.diff`.
pub fn parse_patch_url(url: &str) -> Result<PatchSource, ReviewError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| ReviewError::InvalidPatchSource(url.to_string()))?;

    let file = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .ok_or_else(|| ReviewError::InvalidPatchSource(url.to_string()))?;

    let issue = issue_from_diff_name(file)
        .ok_or_else(|| ReviewError::InvalidPatchSource(url.to_string()))?;

    Ok(PatchSource {
        issue,
        url: url.to_string(),
    })
}

/// `issue123_4.diff` -> 123
fn issue_from_diff_name(name: &str) -> Option<u64> {
    let (issue, patchset) = name
        .strip_prefix("issue")?
        .strip_suffix(".diff")?
        .split_once('_')?;
    patchset.parse::<u64>().ok()?;
    issue.parse::<u64>().ok()
}

/// Find the first patch download link for `issue` on its HTML page and
/// return the server-relative path.
pub fn find_patch_link(page: &str, issue: u64) -> Option<String> {
    let prefix = format!("/download/issue{issue}_");
    let mut rest = page;
    while let Some(start) = rest.find(&prefix) {
        let candidate = &rest[start..];
        if let Some(end) = candidate.find(".diff") {
            let link = &candidate[..end + ".diff".len()];
            let patchset = &link[prefix.len()..link.len() - ".diff".len()];
            if !patchset.is_empty() && patchset.bytes().all(|b| b.is_ascii_digit()) {
                return Some(link.to_string());
            }
        }
        rest = &rest[start + prefix.len()..];
    }
    None
}

/// Drop the `a/` and `b/` path prefixes git puts on file headers so git and
/// svn patches can both be applied with `-p0`.
pub fn strip_git_prefixes(patch: &str) -> String {
    let mut out = String::with_capacity(patch.len());
    for line in patch.split_inclusive('\n') {
        if let Some(rest) = line.strip_prefix("--- a/") {
            out.push_str("--- ");
            out.push_str(rest);
        } else if let Some(rest) = line.strip_prefix("+++ b/") {
            out.push_str("+++ ");
            out.push_str(rest);
        } else {
            out.push_str(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIT_PATCH: &str = r#"diff --git a/src/main.rs b/src/main.rs
index abc1234..def5678 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,3 @@
 fn main() {
-    println!("old");
+    println!("new");
 }
"#;

    #[test]
    fn test_parse_valid_patch_url() {
        let source =
            parse_patch_url("http://codereview.example.com/download/issue1234_5.diff").unwrap();
        assert_eq!(source.issue, 1234);
        assert_eq!(source.url, "http://codereview.example.com/download/issue1234_5.diff");
    }

    #[test]
    fn test_parse_invalid_patch_url() {
        assert!(parse_patch_url("not-a-url").is_err());
        assert!(parse_patch_url("http://codereview.example.com/1234").is_err());
        assert!(parse_patch_url("http://codereview.example.com/download/issue1234.diff").is_err());
        assert!(parse_patch_url("http://codereview.example.com/download/issueX_1.diff").is_err());
    }

    #[test]
    fn test_find_patch_link() {
        let page = r#"<a href="/1234/show">show</a>
<a href="/download/issue1234_.diff">broken</a>
<a href="/download/issue1234_2001.diff">Download raw patch set</a>
<a href="/download/issue1234_3001.diff">Download raw patch set</a>"#;
        assert_eq!(
            find_patch_link(page, 1234).as_deref(),
            Some("/download/issue1234_2001.diff")
        );
        assert_eq!(find_patch_link(page, 99), None);
        assert_eq!(find_patch_link("", 1234), None);
    }

    #[test]
    fn test_strip_git_prefixes() {
        let stripped = strip_git_prefixes(GIT_PATCH);
        assert!(stripped.contains("\n--- src/main.rs\n"));
        assert!(stripped.contains("\n+++ src/main.rs\n"));
        // Header and body lines are untouched.
        assert!(stripped.starts_with("diff --git a/src/main.rs b/src/main.rs\n"));
        assert!(stripped.contains("-    println!(\"old\");\n"));
        assert!(stripped.ends_with(" }\n"));
    }

    #[test]
    fn test_strip_leaves_svn_patch_alone() {
        let svn = "Index: foo.c\n===\n--- foo.c\t(revision 10)\n+++ foo.c\t(working copy)\n";
        assert_eq!(strip_git_prefixes(svn), svn);
    }
}
