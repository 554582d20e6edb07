pub mod patch;
pub mod types;

pub use types::{Credentials, PatchSource, TreeStatus};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

const USER_AGENT: &str = concat!("git-cl/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Review server request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Expected an issue number or a patch URL, got: {0}")]
    InvalidPatchSource(String),

    #[error("No patch found for issue {0}")]
    PatchNotFound(u64),
}

/// The HTTP surface of the code review service.
///
/// Every call is a single attempt; failures go straight back to the caller.
#[async_trait]
pub trait ReviewService: Send + Sync {
    /// GET `<server>/<issue>/description`.
    async fn fetch_description(&self, server: &str, issue: u64) -> Result<String, ReviewError>;

    /// GET any page as text: tree status, issue pages, raw patches.
    async fn fetch_page(&self, url: &str) -> Result<String, ReviewError>;

    /// POST `<server>/<issue>/close` with the given credentials.
    async fn close_issue(
        &self,
        server: &str,
        issue: u64,
        credentials: &Credentials,
    ) -> Result<(), ReviewError>;
}

/// `ReviewService` backed by reqwest.
pub struct ReviewClient {
    client: reqwest::Client,
}

impl ReviewClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReviewService for ReviewClient {
    #[instrument(skip(self))]
    async fn fetch_description(&self, server: &str, issue: u64) -> Result<String, ReviewError> {
        let url = format!("{server}/{issue}/description");
        let description = self.fetch_page(&url).await?;
        Ok(description.trim().to_string())
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, url: &str) -> Result<String, ReviewError> {
        let text = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(bytes = text.len(), "received page");
        Ok(text)
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn close_issue(
        &self,
        server: &str,
        issue: u64,
        credentials: &Credentials,
    ) -> Result<(), ReviewError> {
        let url = format!("{server}/{issue}/close");
        self.client
            .post(&url)
            .header("User-Agent", USER_AGENT)
            .basic_auth(&credentials.email, Some(&credentials.password))
            .send()
            .await?
            .error_for_status()?;
        debug!("issue closed");
        Ok(())
    }
}

/// Fetch and interpret the tree status page, or `Unset` without a URL.
pub async fn tree_status(
    service: &dyn ReviewService,
    url: Option<&str>,
) -> Result<TreeStatus, ReviewError> {
    match url {
        None => Ok(TreeStatus::Unset),
        Some(url) => {
            let page = service.fetch_page(url).await?;
            Ok(TreeStatus::from_page(&page))
        }
    }
}
