use serde::Deserialize;
use std::cell::OnceCell;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::git::{Git, GitError};

pub const SERVER_KEY: &str = "review.server";
pub const CC_KEY: &str = "review.cc";
pub const TREE_STATUS_URL_KEY: &str = "review.tree-status-url";
pub const UPLOAD_TOOL_KEY: &str = "review.upload-tool";
pub const SVN_BRANCH_KEY: &str = "review.svn-branch";

const DEFAULT_UPLOAD_TOOL: &str = "upload.py";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("You must configure your review setup by running \"git cl config\" ({key} is not set)")]
    Missing { key: String },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("Failed to read settings file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Repo doesn't appear to be a git-svn repo")]
    NotGitSvn,

    #[error("Can't guess svn branch -- set review.svn-branch or pass a branch on the command line")]
    UnknownSvnBranch,
}

/// Read a key, failing when it is unset.
pub fn get(git: &dyn Git, key: &str) -> Result<String, ConfigError> {
    get_opt(git, key)?.ok_or_else(|| ConfigError::Missing {
        key: key.to_string(),
    })
}

/// Read a key, returning `None` when it is unset or empty.
pub fn get_opt(git: &dyn Git, key: &str) -> Result<Option<String>, ConfigError> {
    let (code, output) = git.run_with_code(&["config", key])?;
    // git config exits 1 for a missing key; anything else is a real failure.
    match code {
        0 => {
            let value = output.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
        1 => Ok(None),
        _ => Err(GitError::Failed {
            command: format!("git config {key}"),
            code,
            output,
        }
        .into()),
    }
}

pub fn get_or(git: &dyn Git, key: &str, default: &str) -> Result<String, ConfigError> {
    Ok(get_opt(git, key)?.unwrap_or_else(|| default.to_string()))
}

/// Store a key. An empty value removes it instead.
pub fn set(git: &dyn Git, key: &str, value: &str) -> Result<(), ConfigError> {
    debug!(key, value, "setting config");
    if value.is_empty() {
        // Exit code 5 means the key was not set, which is fine here.
        let (code, output) = git.run_with_code(&["config", "--unset-all", key])?;
        if code != 0 && code != 5 {
            return Err(GitError::Failed {
                command: format!("git config --unset-all {key}"),
                code,
                output,
            }
            .into());
        }
        return Ok(());
    }
    git.run(&["config", key, value])?;
    Ok(())
}

/// All `(key, value)` pairs whose key matches `pattern`.
pub fn get_regexp(git: &dyn Git, pattern: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let (code, output) = git.run_with_code(&["config", "--get-regexp", pattern])?;
    if code != 0 {
        return Ok(Vec::new());
    }
    Ok(output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(' ').unwrap_or((line, ""));
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect())
}

/// Settings that can be imported in bulk with `git cl config --file`.
///
/// All fields are optional; absent ones leave the store untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFile {
    pub server: Option<String>,
    pub cc: Option<String>,
    pub tree_status_url: Option<String>,
    pub upload_tool: Option<String>,
}

impl SettingsFile {
    pub fn load_from(path: &Path) -> Result<SettingsFile, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let settings = toml::from_str(&contents)?;
        Ok(settings)
    }

    /// Write every present field to the store, returning the keys written.
    pub fn apply(&self, git: &dyn Git) -> Result<Vec<&'static str>, ConfigError> {
        let fields = [
            (SERVER_KEY, &self.server),
            (CC_KEY, &self.cc),
            (TREE_STATUS_URL_KEY, &self.tree_status_url),
            (UPLOAD_TOOL_KEY, &self.upload_tool),
        ];
        let mut written = Vec::new();
        for (key, value) in fields {
            if let Some(value) = value {
                set(git, key, value)?;
                written.push(key);
            }
        }
        Ok(written)
    }
}

/// Process-lifetime settings cache.
///
/// Each value is read from the store on first use. Once a read succeeds the
/// value is kept for the rest of the run, even if the store changes.
#[derive(Debug, Default)]
pub struct Settings {
    server: OnceCell<String>,
    cc: OnceCell<String>,
    tree_status_url: OnceCell<Option<String>>,
    upload_tool: OnceCell<String>,
    is_git_svn: OnceCell<bool>,
    svn_branch: OnceCell<String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Review server URL. A bare host gets an `http://` scheme.
    pub fn server(&self, git: &dyn Git) -> Result<String, ConfigError> {
        cached(&self.server, || {
            let server = get(git, SERVER_KEY)?;
            Ok(normalize_server(&server))
        })
    }

    pub fn cc_list(&self, git: &dyn Git) -> Result<String, ConfigError> {
        cached(&self.cc, || get_or(git, CC_KEY, ""))
    }

    pub fn tree_status_url(&self, git: &dyn Git) -> Result<Option<String>, ConfigError> {
        cached(&self.tree_status_url, || get_opt(git, TREE_STATUS_URL_KEY))
    }

    pub fn upload_tool(&self, git: &dyn Git) -> Result<String, ConfigError> {
        cached(&self.upload_tool, || {
            get_or(git, UPLOAD_TOOL_KEY, DEFAULT_UPLOAD_TOOL)
        })
    }

    pub fn is_git_svn(&self, git: &dyn Git) -> Result<bool, ConfigError> {
        cached(&self.is_git_svn, || {
            Ok(!get_regexp(git, "^svn-remote\\.")?.is_empty())
        })
    }

    /// The remote ref tracking the svn branch this repo is based on.
    pub fn svn_branch(&self, git: &dyn Git) -> Result<String, ConfigError> {
        cached(&self.svn_branch, || {
            if let Some(branch) = get_opt(git, SVN_BRANCH_KEY)? {
                return Ok(branch);
            }
            if !self.is_git_svn(git)? {
                return Err(ConfigError::NotGitSvn);
            }
            guess_svn_branch(git)
        })
    }
}

fn cached<T: Clone>(
    cell: &OnceCell<T>,
    load: impl FnOnce() -> Result<T, ConfigError>,
) -> Result<T, ConfigError> {
    if let Some(value) = cell.get() {
        return Ok(value.clone());
    }
    let value = load()?;
    Ok(cell.get_or_init(|| value).clone())
}

fn normalize_server(server: &str) -> String {
    let server = server.trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        server.to_string()
    } else {
        format!("http://{server}")
    }
}

/// Extract the svn url from a `git-svn-id: <url>@<rev> <uuid>` line.
fn git_svn_url(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("git-svn-id: ")?;
    let (url, _) = rest.split_once('@')?;
    (!url.is_empty()).then_some(url)
}

/// Find the svn branch by matching `git-svn-id` urls of remote refs against
/// recent history.
fn guess_svn_branch(git: &dyn Git) -> Result<String, ConfigError> {
    let remotes = git.run(&["for-each-ref", "--format=%(refname)", "refs/remotes"])?;

    let mut candidates: Vec<(String, String)> = Vec::new();
    for remote in remotes.lines().map(str::trim).filter(|r| !r.is_empty()) {
        let object = git.run(&["cat-file", "-p", remote])?;
        if let Some(url) = object.lines().find_map(git_svn_url) {
            if !candidates.iter().any(|(known, _)| known == url) {
                candidates.push((url.to_string(), remote.to_string()));
            }
        }
    }
    debug!(candidates = candidates.len(), "svn branch candidates");

    match candidates.len() {
        0 => Err(ConfigError::UnknownSvnBranch),
        1 => Ok(candidates.remove(0).1),
        _ => {
            // Only look at recent history so this terminates quickly.
            let log = git.run(&["log", "-100", "--pretty=medium"])?;
            log.lines()
                .filter_map(git_svn_url)
                .find_map(|url| {
                    candidates
                        .iter()
                        .find(|(known, _)| known == url)
                        .map(|(_, remote)| remote.clone())
                })
                .ok_or(ConfigError::UnknownSvnBranch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::tests::FakeGit;

    #[test]
    fn test_get_missing_key_errors() {
        let git = FakeGit::new();
        let err = get(&git, SERVER_KEY).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref key } if key == SERVER_KEY));
        assert!(err.to_string().contains("git cl config"));
    }

    #[test]
    fn test_get_or_default() {
        let git = FakeGit::new();
        assert_eq!(get_or(&git, CC_KEY, "nobody").unwrap(), "nobody");
        let git = git.with_config(CC_KEY, "team@example.com");
        assert_eq!(get_or(&git, CC_KEY, "nobody").unwrap(), "team@example.com");
    }

    #[test]
    fn test_set_empty_removes_key() {
        let git = FakeGit::new().with_config(CC_KEY, "team@example.com");
        set(&git, CC_KEY, "").unwrap();
        assert_eq!(git.config_value(CC_KEY), None);
        // Removing an absent key is not an error.
        set(&git, CC_KEY, "").unwrap();
    }

    #[test]
    fn test_get_regexp_parses_pairs() {
        let git = FakeGit::new()
            .with_config("review.branch.a.issue", "12")
            .with_config("review.branch.b.issue", "34");
        let pairs = get_regexp(&git, "^review\\.branch\\..*\\.issue$").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("review.branch.a.issue".to_string(), "12".to_string()),
                ("review.branch.b.issue".to_string(), "34".to_string()),
            ]
        );
    }

    #[test]
    fn test_server_is_normalized_and_cached() {
        let git = FakeGit::new().with_config(SERVER_KEY, "codereview.example.com/");
        let settings = Settings::new();
        assert_eq!(settings.server(&git).unwrap(), "http://codereview.example.com");

        set(&git, SERVER_KEY, "https://other.example.com").unwrap();
        assert_eq!(settings.server(&git).unwrap(), "http://codereview.example.com");
    }

    #[test]
    fn test_failed_load_is_retried() {
        let git = FakeGit::new();
        let settings = Settings::new();
        assert!(settings.server(&git).is_err());
        set(&git, SERVER_KEY, "https://codereview.example.com").unwrap();
        assert_eq!(settings.server(&git).unwrap(), "https://codereview.example.com");
    }

    #[test]
    fn test_defaults() {
        let git = FakeGit::new();
        let settings = Settings::new();
        assert_eq!(settings.cc_list(&git).unwrap(), "");
        assert_eq!(settings.tree_status_url(&git).unwrap(), None);
        assert_eq!(settings.upload_tool(&git).unwrap(), "upload.py");
        assert!(!settings.is_git_svn(&git).unwrap());
        assert!(matches!(settings.svn_branch(&git), Err(ConfigError::NotGitSvn)));
    }

    #[test]
    fn test_svn_branch_single_candidate() {
        let git = FakeGit::new()
            .with_config("svn-remote.svn.url", "svn://svn.example.com/repo")
            .respond(
                "for-each-ref --format=%(refname) refs/remotes",
                0,
                "refs/remotes/trunk\nrefs/remotes/origin/master\n",
            )
            .respond(
                "cat-file -p refs/remotes/trunk",
                0,
                "tree abc\n\nFix things\n\ngit-svn-id: svn://svn.example.com/repo/trunk@1234 uuid\n",
            )
            .respond("cat-file -p refs/remotes/origin/master", 0, "tree def\n\nPlain commit\n");
        let settings = Settings::new();
        assert!(settings.is_git_svn(&git).unwrap());
        assert_eq!(settings.svn_branch(&git).unwrap(), "refs/remotes/trunk");
    }

    #[test]
    fn test_svn_branch_picks_from_history() {
        let git = FakeGit::new()
            .with_config("svn-remote.svn.url", "svn://svn.example.com/repo")
            .respond(
                "for-each-ref --format=%(refname) refs/remotes",
                0,
                "refs/remotes/trunk\nrefs/remotes/branch-1\n",
            )
            .respond(
                "cat-file -p refs/remotes/trunk",
                0,
                "git-svn-id: svn://svn.example.com/repo/trunk@1234 uuid\n",
            )
            .respond(
                "cat-file -p refs/remotes/branch-1",
                0,
                "git-svn-id: svn://svn.example.com/repo/branches/1@1200 uuid\n",
            )
            .respond(
                "log -100 --pretty=medium",
                0,
                "commit 1\n\n    Local work\n\ncommit 2\n\n    Merged\n    \n    git-svn-id: svn://svn.example.com/repo/branches/1@1200 uuid\n",
            );
        let settings = Settings::new();
        assert_eq!(settings.svn_branch(&git).unwrap(), "refs/remotes/branch-1");
    }

    #[test]
    fn test_svn_branch_override() {
        let git = FakeGit::new().with_config(SVN_BRANCH_KEY, "refs/remotes/custom");
        let settings = Settings::new();
        assert_eq!(settings.svn_branch(&git).unwrap(), "refs/remotes/custom");
    }

    #[test]
    fn test_parse_settings_toml() {
        let toml_str = r#"
server = "codereview.example.com"
tree_status_url = "http://status.example.com/current"
"#;
        let settings: SettingsFile = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.server.as_deref(), Some("codereview.example.com"));
        assert!(settings.cc.is_none());

        let git = FakeGit::new();
        let written = settings.apply(&git).unwrap();
        assert_eq!(written, vec![SERVER_KEY, TREE_STATUS_URL_KEY]);
        assert_eq!(
            git.config_value(TREE_STATUS_URL_KEY).as_deref(),
            Some("http://status.example.com/current")
        );
    }

    #[test]
    fn test_load_settings_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codereview.toml");
        fs::write(&path, "cc = \"team@example.com\"\nupload_tool = \"/opt/upload.py\"\n").unwrap();
        let settings = SettingsFile::load_from(&path).unwrap();
        assert_eq!(settings.cc.as_deref(), Some("team@example.com"));
        assert_eq!(settings.upload_tool.as_deref(), Some("/opt/upload.py"));

        assert!(SettingsFile::load_from(&dir.path().join("missing.toml")).is_err());
    }
}
