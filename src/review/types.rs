/// Published open/closed state of the shared integration branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeStatus {
    Open,
    Closed,
    /// The status page mentions neither state.
    Unknown,
    /// No tree-status URL is configured.
    Unset,
}

impl TreeStatus {
    /// Interpret a fetched status page. "closed" wins over "open" when a page
    /// mentions both.
    pub fn from_page(page: &str) -> TreeStatus {
        let page = page.to_lowercase();
        if page.contains("closed") {
            TreeStatus::Closed
        } else if page.contains("open") {
            TreeStatus::Open
        } else {
            TreeStatus::Unknown
        }
    }
}

impl std::fmt::Display for TreeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeStatus::Open => write!(f, "open"),
            TreeStatus::Closed => write!(f, "closed"),
            TreeStatus::Unknown => write!(f, "unknown"),
            TreeStatus::Unset => write!(f, "unset"),
        }
    }
}

/// Credentials for authenticated requests, collected interactively.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where to download a patch from, and which issue it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSource {
    pub issue: u64,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_status_closed() {
        assert_eq!(TreeStatus::from_page("Tree is CLOSED for maintenance"), TreeStatus::Closed);
    }

    #[test]
    fn test_tree_status_open() {
        assert_eq!(TreeStatus::from_page("The tree is open"), TreeStatus::Open);
    }

    #[test]
    fn test_tree_status_closed_wins_over_open() {
        assert_eq!(
            TreeStatus::from_page("was open, now closed"),
            TreeStatus::Closed
        );
    }

    #[test]
    fn test_tree_status_unknown() {
        assert_eq!(TreeStatus::from_page("throttled"), TreeStatus::Unknown);
        assert_eq!(TreeStatus::from_page(""), TreeStatus::Unknown);
    }

    #[test]
    fn test_tree_status_display() {
        assert_eq!(TreeStatus::Open.to_string(), "open");
        assert_eq!(TreeStatus::Closed.to_string(), "closed");
        assert_eq!(TreeStatus::Unknown.to_string(), "unknown");
        assert_eq!(TreeStatus::Unset.to_string(), "unset");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            email: "alice@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("alice@example.com"));
        assert!(!debug.contains("hunter2"));
    }
}
